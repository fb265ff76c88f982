use std::sync::Arc;

use crabgate_gateway::Manager;

use crate::session::SessionAuth;
use crate::tickets::TicketStore;

/// Shared application state accessible from all route handlers. The ticket
/// store and rate-limit counters live here rather than in globals so tests
/// can build isolated instances.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub tickets: Arc<TicketStore>,
    pub auth: Arc<SessionAuth>,
}

impl AppState {
    pub fn new(manager: Manager, control_token: Option<String>) -> Self {
        Self {
            manager: Arc::new(manager),
            tickets: Arc::new(TicketStore::new()),
            auth: Arc::new(SessionAuth::new(control_token)),
        }
    }
}
