//! Client-side tracking of clinical transcription jobs.
//!
//! [`poller::StatusPoller`] drives a submitted job to a terminal outcome with
//! adaptive backoff and a fixed deadline; [`workflow::WorkflowStepResolver`]
//! reports which workflow steps a visit currently permits. Both talk to the
//! backend through [`api::ApiClient`].

pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod poller;
pub mod status;
pub mod transcript;
pub mod workflow;
