use crate::database::ConnectionHandle;

/// Shared state handed to every resource handler.
#[derive(Clone)]
pub struct AppState {
    pub db: ConnectionHandle,
}

impl AppState {
    pub fn new(db: ConnectionHandle) -> Self {
        Self { db }
    }
}
