//! Status polling sessions.
//!
//! One session per [`JobId`]. A session owns its attempt counter, start
//! instant and fixed deadline, and runs as a spawned task. Starting a new
//! session for the same job cancels the previous one before the new task is
//! spawned. Cancellation drops the session's event sender under a lock, so a
//! cancelled session cannot emit anything afterwards; a network call that is
//! already in flight finishes and its result is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::api::{JobBackend, TranscriptPayload};
use crate::error::PollError;
use crate::job::{
    BackoffPolicy, Job, JobId, JobState, PollAttempt, SessionMachine, SessionState, phase_label,
};
use crate::status::ResultReport;
use crate::transcript::{TranscriptArtifact, build_artifact};

/// Whole-session ceiling: worst-case generation latency plus buffer.
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(1_500_000);

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded(TranscriptArtifact),
    Failed(PollError),
    TimedOut { elapsed_ms: u64, deadline_ms: u64 },
}

impl PollOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            PollOutcome::Succeeded(_) => SessionState::Succeeded,
            PollOutcome::Failed(_) => SessionState::Failed,
            PollOutcome::TimedOut { .. } => SessionState::TimedOut,
        }
    }

    pub fn into_result(self) -> Result<TranscriptArtifact, PollError> {
        match self {
            PollOutcome::Succeeded(artifact) => Ok(artifact),
            PollOutcome::Failed(err) => Err(err),
            PollOutcome::TimedOut {
                elapsed_ms,
                deadline_ms,
            } => Err(PollError::Timeout {
                elapsed_ms,
                deadline_ms,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A non-terminal observation and the wait scheduled after it.
    Attempt {
        attempt: PollAttempt,
        job_state: JobState,
        phase: &'static str,
    },
    Finished(PollOutcome),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancellation handle shared by a session task, its [`PollHandle`] and the
/// poller registry. Also holds the session's state machine so the caller can
/// read it while the task runs.
#[derive(Debug)]
struct SessionControl {
    outbox: Mutex<Option<mpsc::UnboundedSender<PollEvent>>>,
    wake: Notify,
    machine: Mutex<SessionMachine>,
}

impl SessionControl {
    fn new(tx: mpsc::UnboundedSender<PollEvent>) -> Self {
        Self {
            outbox: Mutex::new(Some(tx)),
            wake: Notify::new(),
            machine: Mutex::new(SessionMachine::new()),
        }
    }

    fn is_cancelled(&self) -> bool {
        lock(&self.outbox).is_none()
    }

    fn cancel(&self) {
        lock(&self.outbox).take();
        self.wake.notify_waiters();
    }

    /// Sends unless cancelled. A dropped receiver counts as cancellation.
    fn emit(&self, event: PollEvent) -> bool {
        let mut outbox = lock(&self.outbox);
        let delivered = outbox.as_ref().is_some_and(|tx| tx.send(event).is_ok());
        if !delivered {
            outbox.take();
        }
        delivered
    }

    /// Sleeps for `wait`; returns false if cancelled first.
    async fn sleep(&self, wait: Duration) -> bool {
        let notified = self.wake.notified();
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => !self.is_cancelled(),
            _ = notified => false,
        }
    }
}

/// The state a running session carries from attempt to attempt.
#[derive(Debug)]
pub struct PollSession {
    pub session_id: Uuid,
    pub job: Job,
    attempt_index: u32,
    started: Instant,
    deadline: Duration,
    last_elapsed_ms: u64,
    control: Arc<SessionControl>,
}

impl PollSession {
    fn new(job: Job, deadline: Duration, control: Arc<SessionControl>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            job,
            attempt_index: 0,
            started: Instant::now(),
            deadline,
            last_elapsed_ms: 0,
            control,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn deadline_ms(&self) -> u64 {
        u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX)
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_sub(self.elapsed())
    }

    fn deadline_reached(&self) -> bool {
        self.elapsed() >= self.deadline
    }

    /// Records a non-terminal observation and advances the attempt index.
    /// `elapsed_ms` strictly increases across attempts; two observations in
    /// the same millisecond are spread one millisecond apart.
    fn record_attempt(&mut self, backoff: &BackoffPolicy, hint: Option<Duration>) -> PollAttempt {
        let (delay_ms, delay_source) = backoff.next_delay(self.attempt_index, hint);
        let floor = if self.attempt_index == 0 {
            0
        } else {
            self.last_elapsed_ms.saturating_add(1)
        };
        let elapsed_ms = self.elapsed_ms().max(floor);
        let attempt = PollAttempt {
            attempt_index: self.attempt_index,
            elapsed_ms,
            delay_ms,
            delay_source,
        };
        self.last_elapsed_ms = elapsed_ms;
        self.attempt_index += 1;
        attempt
    }

    fn transition(&self, to: SessionState) {
        if let Err(err) = lock(&self.control.machine).advance(to) {
            tracing::error!(session = %self.session_id, error = %err, "rejected session transition");
        }
    }
}

/// Caller side of a session: receives events and can cancel it.
#[derive(Debug)]
pub struct PollHandle {
    pub session_id: Uuid,
    pub job_id: JobId,
    control: Arc<SessionControl>,
    events: mpsc::UnboundedReceiver<PollEvent>,
}

impl PollHandle {
    /// Next event, or `None` once the session is finished or cancelled.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    /// Stops scheduling attempts. Anything still in flight is discarded.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Current session state. Stays `POLLING` for a cancelled session.
    pub fn state(&self) -> SessionState {
        lock(&self.control.machine).state()
    }

    /// States the session has left behind, oldest first.
    pub fn history(&self) -> Vec<SessionState> {
        lock(&self.control.machine).history().to_vec()
    }

    /// Drains events until the terminal one. `None` if the session was
    /// cancelled before finishing.
    pub async fn outcome(mut self) -> Option<PollOutcome> {
        while let Some(event) = self.next_event().await {
            if let PollEvent::Finished(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }
}

#[derive(Debug)]
struct LiveSession {
    session_id: Uuid,
    control: Arc<SessionControl>,
}

type Registry = Arc<Mutex<HashMap<JobId, LiveSession>>>;

/// Drops the session's registry entry when its task ends, on every exit path.
/// An entry that already belongs to a newer session is left alone.
struct Deregister {
    registry: Registry,
    job_id: JobId,
    session_id: Uuid,
}

impl Deregister {
    fn release(&self) {
        let mut sessions = lock(&self.registry);
        if sessions
            .get(&self.job_id)
            .is_some_and(|live| live.session_id == self.session_id)
        {
            sessions.remove(&self.job_id);
        }
    }
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.release();
    }
}

/// Drives status queries for submitted jobs to a terminal outcome.
pub struct StatusPoller<B> {
    backend: Arc<B>,
    backoff: BackoffPolicy,
    sessions: Registry,
}

impl<B> Clone for StatusPoller<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            backoff: self.backoff.clone(),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<B: JobBackend + 'static> StatusPoller<B> {
    pub fn new(backend: Arc<B>, backoff: BackoffPolicy) -> Self {
        Self {
            backend,
            backoff,
            sessions: Arc::default(),
        }
    }

    /// Starts polling `job` with a fixed `deadline`. Any live session for the
    /// same job is cancelled before the new one issues its first request.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, job: Job, deadline: Duration) -> PollHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(SessionControl::new(tx));
        let session = PollSession::new(job, deadline, Arc::clone(&control));
        let session_id = session.session_id;
        let job_id = session.job.id.clone();

        {
            let mut sessions = lock(&self.sessions);
            if let Some(previous) = sessions.remove(&job_id) {
                previous.control.cancel();
                tracing::info!(
                    job = %job_id,
                    superseded = %previous.session_id,
                    session = %session_id,
                    "cancelled previous poll session"
                );
            }
            sessions.insert(
                job_id.clone(),
                LiveSession {
                    session_id,
                    control: Arc::clone(&control),
                },
            );
        }

        tracing::info!(job = %job_id, session = %session_id, deadline_ms = session.deadline_ms(), "poll session started");
        tokio::spawn(run_session(
            Arc::clone(&self.backend),
            self.backoff.clone(),
            session,
            Arc::clone(&self.sessions),
        ));

        PollHandle {
            session_id,
            job_id,
            control,
            events: rx,
        }
    }

    /// Cancels the live session for `id`, if any.
    pub fn cancel(&self, id: &JobId) -> bool {
        match lock(&self.sessions).remove(id) {
            Some(live) => {
                live.control.cancel();
                tracing::info!(job = %id, session = %live.session_id, "poll session cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: &JobId) -> bool {
        lock(&self.sessions)
            .get(id)
            .is_some_and(|live| !live.control.is_cancelled())
    }

    /// Number of sessions still registered.
    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }
}

enum Collected {
    Artifact(TranscriptArtifact),
    StillProcessing(Option<Duration>),
}

/// Terminal success hand-off: use the inlined artifact or fetch it, then
/// enrich when needed.
async fn collect<B: JobBackend>(
    backend: &B,
    id: &JobId,
    inline: Option<TranscriptPayload>,
) -> Result<Collected, PollError> {
    let payload = match inline {
        Some(payload) => payload,
        None => match backend.fetch_result(id).await? {
            ResultReport::Ready(payload) => payload,
            ResultReport::Pending { retry_hint } => {
                tracing::debug!(job = %id, "transcript not ready yet despite complete status");
                return Ok(Collected::StillProcessing(retry_hint));
            }
        },
    };
    Ok(Collected::Artifact(build_artifact(backend, id, &payload).await))
}

fn finish(session: &mut PollSession, registration: &Deregister, outcome: PollOutcome) {
    registration.release();
    if session.control.is_cancelled() {
        return;
    }
    session.transition(outcome.state());
    match &outcome {
        PollOutcome::Succeeded(artifact) => tracing::info!(
            job = %session.job.id,
            session = %session.session_id,
            chars = artifact.text.len(),
            enriched = artifact.enriched,
            "transcription complete"
        ),
        PollOutcome::Failed(err) => tracing::warn!(
            job = %session.job.id,
            session = %session.session_id,
            error = %err,
            "transcription failed"
        ),
        PollOutcome::TimedOut { elapsed_ms, .. } => tracing::warn!(
            job = %session.job.id,
            session = %session.session_id,
            elapsed_ms,
            "transcription timed out"
        ),
    }
    session.control.emit(PollEvent::Finished(outcome));
}

async fn run_session<B: JobBackend>(
    backend: Arc<B>,
    backoff: BackoffPolicy,
    mut session: PollSession,
    registry: Registry,
) {
    let registration = Deregister {
        registry,
        job_id: session.job.id.clone(),
        session_id: session.session_id,
    };
    loop {
        if session.control.is_cancelled() {
            return;
        }
        session.transition(SessionState::Polling);

        // The first check at or past the deadline is the authoritative one.
        let final_check = session.deadline_reached();
        let result = backend.job_status(&session.job.id).await;
        if session.control.is_cancelled() {
            tracing::debug!(session = %session.session_id, "discarding status for cancelled session");
            return;
        }

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                let err = PollError::from(err);
                session.job.observe(JobState::Failed, Some(err.to_string()));
                return finish(&mut session, &registration, PollOutcome::Failed(err));
            }
        };
        tracing::debug!(
            job = %session.job.id,
            state = %report.state,
            attempt = session.attempt_index,
            elapsed_ms = session.elapsed_ms(),
            "status observed"
        );

        let (job_state, hint) = match report.state {
            JobState::Failed => {
                let message = report
                    .message
                    .clone()
                    .unwrap_or_else(|| "transcription failed".to_string());
                session.job.observe(JobState::Failed, Some(message.clone()));
                return finish(
                    &mut session,
                    &registration,
                    PollOutcome::Failed(PollError::State(message)),
                );
            }
            JobState::Complete => {
                let collected = collect(&*backend, &session.job.id, report.artifact).await;
                if session.control.is_cancelled() {
                    return;
                }
                match collected {
                    Ok(Collected::Artifact(artifact)) => {
                        session.job.observe(JobState::Complete, None);
                        return finish(&mut session, &registration, PollOutcome::Succeeded(artifact));
                    }
                    Ok(Collected::StillProcessing(hint)) => (JobState::Processing, hint),
                    Err(err) => {
                        session.job.observe(JobState::Failed, Some(err.to_string()));
                        return finish(&mut session, &registration, PollOutcome::Failed(err));
                    }
                }
            }
            state @ (JobState::Pending | JobState::Processing) => (state, report.retry_hint),
        };
        session.job.observe(job_state, report.message);

        if final_check {
            let outcome = PollOutcome::TimedOut {
                elapsed_ms: session.elapsed_ms(),
                deadline_ms: session.deadline_ms(),
            };
            return finish(&mut session, &registration, outcome);
        }
        if session.deadline_reached() {
            // The call itself ran past the deadline; go straight to the final check.
            continue;
        }

        let attempt = session.record_attempt(&backoff, hint);
        let wait = attempt.delay().min(session.remaining());
        let phase = phase_label(attempt.attempt_index);
        tracing::debug!(
            job = %session.job.id,
            attempt = attempt.attempt_index,
            delay_ms = attempt.delay_ms,
            source = ?attempt.delay_source,
            phase,
            "next status check scheduled"
        );
        if !session.control.emit(PollEvent::Attempt {
            attempt,
            job_state,
            phase,
        }) {
            return;
        }
        if !session.control.sleep(wait).await {
            return;
        }
    }
}
