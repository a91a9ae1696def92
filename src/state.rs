//! Shared application state handed to every HTTP handler.

use std::sync::Arc;

use crate::history::HistoryStore;
use crate::poller::Poller;
use crate::projector::Projector;

#[derive(Clone)]
pub struct AppState {
    pub poller: Arc<Poller>,
    pub projector: Arc<Projector>,
    pub history: Arc<HistoryStore>,
}
