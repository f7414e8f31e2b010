pub mod orchestrator;
pub mod schedule;
pub mod timer;

pub use orchestrator::{CommandReply, Orchestrator, PollSettings};
pub use timer::{SystemClock, TokioTimer};

/// Inbound requests handled by [`Orchestrator::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run one full poll cycle now
    PollNow,
    /// Recompute the badge from the stored snapshot
    UpdateBadge,
    /// Re-arm the timer from current preferences without polling
    Reschedule,
    /// The poll timer elapsed
    TimerFired,
}
