//! Shared constants.

/// Default debounce window for change-notification bursts, in milliseconds.
///
/// A batch of admin edits can fire many notifications for the same table in
/// quick succession; the subscription router collapses everything inside this
/// window into a single refresh cycle.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// File name of the persisted session slot inside the session directory.
pub const SESSION_FILE: &str = "session.json";
