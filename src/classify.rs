//! Load-outcome classification.
//!
//! The engine's load-finished signal is ambiguous on its own: it arrives
//! with `ok = false` both when the page genuinely failed to load and when a
//! server-side redirect interrupted the load before the engine's structured
//! error path could report anything. The only reliable discriminant is
//! whether a structured error was recorded by the time the signal arrives.

use crate::error::LoadError;

/// What one load-finished signal means for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The page loaded; begin the settle wait.
    Success,
    /// A redirect is assumed to have started another load; keep waiting.
    ///
    /// If the assumption is wrong no further event ever arrives and the
    /// session waits until the caller's outer deadline fires. Known
    /// limitation of the heuristic, not detected here.
    RedirectPending,
    /// The engine reported a structured failure.
    Failure(LoadError),
}

/// Map a load-finished signal and the recorded structured error, if any,
/// to its meaning.
pub fn classify(ok: bool, error_info: Option<LoadError>) -> LoadOutcome {
    match (ok, error_info) {
        (_, Some(error)) => LoadOutcome::Failure(error),
        (true, None) => LoadOutcome::Success,
        (false, None) => LoadOutcome::RedirectPending,
    }
}
