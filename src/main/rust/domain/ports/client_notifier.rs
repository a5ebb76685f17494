use crate::domain::value_objects::ServerEvent;

/// Port for notifications back to the connected client
pub trait ClientNotifier: Send + Sync {
    fn notify(&self, event: ServerEvent);
}
