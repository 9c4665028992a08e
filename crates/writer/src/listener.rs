use super::Error;

/// Observer of writer terminal events. Callbacks run synchronously on
/// whichever thread drives the writer.
pub trait Listener {
    /// The payload completed; called exactly once.
    fn on_completed(&mut self) {}

    /// The writer entered the error state; called exactly once, before the
    /// error propagates to the caller.
    fn on_exception(&mut self, _error: &Error) {}
}
