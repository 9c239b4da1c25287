/// Hooks the client adapter fires for failures, independent of which
/// operation triggered them.
///
/// A front end implements this to show a transient notification for
/// `on_error` and to send the person back to the login screen on
/// `on_unauthorized`. The session has already been cleared by the time
/// `on_unauthorized` runs.
pub trait ClientEvents: Send + Sync {
    /// A request failed; `message` is short and human-readable
    fn on_error(&self, _message: &str) {}

    /// The server rejected the bearer token
    fn on_unauthorized(&self) {}
}

/// Default hooks: everything goes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl ClientEvents for LogEvents {
    fn on_error(&self, message: &str) {
        log::warn!("Request failed: {}", message);
    }

    fn on_unauthorized(&self) {
        log::warn!("Session rejected by server, login required");
    }
}
