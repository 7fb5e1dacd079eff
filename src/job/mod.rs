mod backoff;
mod job;
mod state;

pub use backoff::{BackoffPolicy, phase_label};
pub use job::{DelaySource, Job, JobId, JobState, PollAttempt};
pub use state::{InvalidTransition, SessionMachine, SessionState};
