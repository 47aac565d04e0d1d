use std::sync::Arc;

use shared::{
    domain::{Difficulty, ProblemId},
    protocol::Problem,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod transport;
pub use transport::{ApiClientError, BackendApi, ProblemBackend};

pub const NO_PROBLEM_MESSAGE: &str = "No problem loaded. Fetching a new one…";
pub const EXPIRED_RECOVERY_MESSAGE: &str = "That question expired. Fetching a fresh one…";
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Check the backend.";
pub const CORRECT_FALLBACK_FEEDBACK: &str = "Correct!";
pub const INCORRECT_FALLBACK_FEEDBACK: &str = "Incorrect";

const EMPTY_PROMPT_FALLBACK: &str = "No prompt.";
const EXPIRED_FEEDBACK_MARKER: &str = "expired";

/// True when a verdict's feedback text signals that the submitted problem id
/// is no longer valid server-side. Expiry is communicated only through this
/// free-text marker.
pub fn is_expired_feedback(feedback: &str) -> bool {
    feedback
        .to_ascii_lowercase()
        .contains(EXPIRED_FEEDBACK_MARKER)
}

fn unreachable_server_message(endpoint: &str) -> String {
    format!("Unable to reach the server at {endpoint}.")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Submitting,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoadStarted,
    ProblemLoaded { problem: Problem },
    LoadFailed { message: String },
    SubmitStarted,
    AnswerCorrect { feedback: String },
    AnswerIncorrect { feedback: String },
    ProblemExpired { message: String },
    NoLiveProblem { message: String },
    SubmitFailed { message: String },
}

/// Outcome of a [`ProblemSession::submit_answer`] call, for callers that
/// need to distinguish a real round-trip from the guard paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDisposition {
    /// The answer reached the server and its verdict or failure was handled.
    Handled,
    /// Nothing live to answer; a recovery fetch was started instead.
    NoLiveProblem,
    /// Another fetch or submission was already in flight; nothing was sent.
    Busy,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub problem_id: Option<ProblemId>,
    pub prompt: String,
    pub feedback: Option<String>,
    pub difficulty: Difficulty,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    problem_id: Option<ProblemId>,
    prompt: String,
    feedback: Option<String>,
    difficulty: Difficulty,
    load_seq: u64,
    started: bool,
}

/// Client-side controller for one problem-solving session. Holds the live
/// problem, fetches replacements, submits answers, and reconciles
/// out-of-order responses. All outcomes are surfaced as [`SessionEvent`]s
/// and state updates; no failure propagates to the caller.
pub struct ProblemSession {
    backend: Arc<dyn ProblemBackend>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ProblemSession {
    pub fn new(backend: Arc<dyn ProblemBackend>) -> Arc<Self> {
        Self::with_difficulty(backend, Difficulty::default())
    }

    pub fn with_difficulty(backend: Arc<dyn ProblemBackend>, difficulty: Difficulty) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            backend,
            inner: Mutex::new(SessionState {
                difficulty,
                ..SessionState::default()
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock().await;
        SessionSnapshot {
            phase: state.phase,
            problem_id: state.problem_id.clone(),
            prompt: state.prompt.clone(),
            feedback: state.feedback.clone(),
            difficulty: state.difficulty,
        }
    }

    /// Triggers the initial problem load. Later calls are no-ops for the
    /// lifetime of this session, however often the owning shell
    /// re-initializes.
    pub async fn ensure_started(&self) {
        {
            let mut state = self.inner.lock().await;
            if state.started {
                info!("session: already started, initial load skipped");
                return;
            }
            state.started = true;
        }
        self.load_problem().await;
    }

    /// Fetches a new problem at the given difficulty, which becomes the
    /// session's current difficulty for automatic follow-up fetches.
    pub async fn fetch_new_problem(&self, difficulty: Difficulty) {
        {
            let mut state = self.inner.lock().await;
            state.difficulty = difficulty;
        }
        self.load_problem().await;
    }

    /// Fetches a new problem at the current difficulty. The response only
    /// mutates state if no newer fetch has been issued in the meantime;
    /// stale responses are discarded on arrival.
    pub async fn load_problem(&self) {
        let (seq, difficulty) = {
            let mut state = self.inner.lock().await;
            state.load_seq += 1;
            state.phase = SessionPhase::Loading;
            state.feedback = None;
            (state.load_seq, state.difficulty)
        };
        self.emit(SessionEvent::LoadStarted);
        info!(seq, difficulty = %difficulty, "problem: fetch issued");

        let result = self.backend.new_problem(difficulty).await;

        let mut state = self.inner.lock().await;
        if state.load_seq != seq {
            info!(
                seq,
                current = state.load_seq,
                "problem: stale fetch response discarded"
            );
            return;
        }
        match result {
            Ok(problem) => {
                info!(seq, problem_id = %problem.problem_id, "problem: loaded");
                state.prompt = if problem.prompt.is_empty() {
                    EMPTY_PROMPT_FALLBACK.to_string()
                } else {
                    problem.prompt.clone()
                };
                state.problem_id = Some(problem.problem_id.clone());
                state.phase = SessionPhase::Ready;
                drop(state);
                self.emit(SessionEvent::ProblemLoaded { problem });
            }
            Err(err) => {
                warn!(seq, error = %err, "problem: fetch failed");
                let message = unreachable_server_message(&self.backend.endpoint());
                state.prompt = message.clone();
                state.phase = if state.problem_id.is_some() {
                    SessionPhase::Ready
                } else {
                    SessionPhase::Idle
                };
                drop(state);
                self.emit(SessionEvent::LoadFailed { message });
            }
        }
    }

    /// Submits the given answer for the live problem. A correct verdict
    /// advances to a fresh problem; an expired verdict recovers by fetching
    /// a replacement; a plain incorrect verdict keeps the problem live for
    /// another try.
    pub async fn submit_answer(&self, answer_text: &str) -> SubmitDisposition {
        let submitted_id = {
            let mut state = self.inner.lock().await;
            if matches!(
                state.phase,
                SessionPhase::Loading | SessionPhase::Submitting
            ) {
                info!("answer: submission ignored while a request is in flight");
                return SubmitDisposition::Busy;
            }
            match state.problem_id.clone() {
                Some(id) => {
                    state.phase = SessionPhase::Submitting;
                    id
                }
                None => {
                    state.feedback = Some(NO_PROBLEM_MESSAGE.to_string());
                    drop(state);
                    self.emit(SessionEvent::NoLiveProblem {
                        message: NO_PROBLEM_MESSAGE.to_string(),
                    });
                    self.load_problem().await;
                    return SubmitDisposition::NoLiveProblem;
                }
            }
        };
        self.emit(SessionEvent::SubmitStarted);
        info!(problem_id = %submitted_id, "answer: submitting");

        let result = self.backend.submit_answer(&submitted_id, answer_text).await;

        match result {
            Ok(outcome) => {
                let message = match outcome.feedback.as_deref() {
                    Some(text) if !text.is_empty() => text.to_string(),
                    _ if outcome.ok => CORRECT_FALLBACK_FEEDBACK.to_string(),
                    _ => INCORRECT_FALLBACK_FEEDBACK.to_string(),
                };

                let mut state = self.inner.lock().await;
                if state.problem_id.as_ref() != Some(&submitted_id) {
                    // A fetch issued mid-submission replaced the problem;
                    // the verdict no longer refers to the live one.
                    info!(
                        problem_id = %submitted_id,
                        "answer: verdict for a replaced problem discarded"
                    );
                    return SubmitDisposition::Handled;
                }

                if !outcome.ok && is_expired_feedback(&message) {
                    info!(problem_id = %submitted_id, "answer: problem expired, recovering");
                    state.problem_id = None;
                    state.feedback = Some(EXPIRED_RECOVERY_MESSAGE.to_string());
                    drop(state);
                    self.emit(SessionEvent::ProblemExpired {
                        message: EXPIRED_RECOVERY_MESSAGE.to_string(),
                    });
                    self.load_problem().await;
                } else if outcome.ok {
                    info!(problem_id = %submitted_id, "answer: correct");
                    state.feedback = Some(message.clone());
                    drop(state);
                    self.emit(SessionEvent::AnswerCorrect { feedback: message });
                    self.load_problem().await;
                } else {
                    info!(problem_id = %submitted_id, "answer: incorrect");
                    state.feedback = Some(message.clone());
                    state.phase = SessionPhase::Ready;
                    drop(state);
                    self.emit(SessionEvent::AnswerIncorrect { feedback: message });
                }
            }
            Err(err) => {
                warn!(problem_id = %submitted_id, error = %err, "answer: submission failed");
                let mut state = self.inner.lock().await;
                if state.phase == SessionPhase::Submitting {
                    state.phase = if state.problem_id.is_some() {
                        SessionPhase::Ready
                    } else {
                        SessionPhase::Idle
                    };
                }
                drop(state);
                self.emit(SessionEvent::SubmitFailed {
                    message: NETWORK_ERROR_MESSAGE.to_string(),
                });
            }
        }
        SubmitDisposition::Handled
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
