use crate::errors::{AppError, AppResult};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Duration;

pub type AssistFuture = Pin<Box<dyn Future<Output = AppResult<String>> + Send>>;

/// Opaque prompt-in, text-out collaborator.
pub trait Assistant: Send + Sync {
    fn invoke(&self, prompt: String) -> AssistFuture;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub last_reply: Option<String>,
}

/// One UI surface talking to an [`Assistant`].
///
/// At most one call is in flight; a second `submit` while loading fails with
/// `ASSISTANT_BUSY`. `cancel` abandons the current call: its future is
/// dropped, `submit` returns `ASSISTANT_CANCELED` and a reply that races the
/// cancel is discarded instead of being recorded. Dropping the `submit`
/// future has the same effect, so a surface never outlives its callers'
/// interest in a reply.
pub struct AssistSurface {
    assistant: Arc<dyn Assistant>,
    state: Mutex<AssistStatus>,
    epoch: watch::Sender<u64>,
}

impl AssistSurface {
    pub fn new(assistant: Arc<dyn Assistant>) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            assistant,
            state: Mutex::new(AssistStatus::default()),
            epoch,
        }
    }

    pub fn status(&self) -> AssistStatus {
        self.state().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn dismiss_error(&self) {
        self.state().error = None;
    }

    pub async fn submit(&self, prompt: &str) -> AppResult<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::Validation("prompt must not be empty".to_string()));
        }

        let (started_epoch, mut canceled) = {
            let mut state = self.state();
            if state.loading {
                return Err(AppError::Busy("a request is already in flight".to_string()));
            }
            state.loading = true;
            state.error = None;
            let started_epoch = *self.epoch.borrow();
            (started_epoch, self.epoch.subscribe())
        };

        let call = self.assistant.invoke(prompt.to_string());
        let mut guard = InFlight {
            surface: self,
            epoch: started_epoch,
            armed: true,
        };

        let outcome = tokio::select! {
            result = call => Some(result),
            _ = canceled.changed() => None,
        };
        guard.armed = false;

        let mut state = self.state();
        let current_epoch = *self.epoch.borrow();
        if current_epoch != started_epoch {
            tracing::debug!(epoch = started_epoch, "discarding reply of canceled request");
            return Err(AppError::Canceled("request was canceled".to_string()));
        }
        state.loading = false;

        match outcome {
            Some(Ok(reply)) => {
                state.last_reply = Some(reply.clone());
                Ok(reply)
            }
            Some(Err(error)) => {
                tracing::warn!(error = %error, "assistant request failed");
                state.error = Some(error.to_string());
                Err(error)
            }
            None => Err(AppError::Canceled("request was canceled".to_string())),
        }
    }

    /// Abandons the in-flight call. Returns `false` when nothing was loading.
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        if !state.loading {
            return false;
        }
        state.loading = false;
        self.epoch.send_modify(|epoch| *epoch += 1);
        tracing::info!("assistant request canceled");
        true
    }

    fn state(&self) -> MutexGuard<'_, AssistStatus> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the loading flag when a `submit` future is dropped mid-call.
struct InFlight<'a> {
    surface: &'a AssistSurface,
    epoch: u64,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.surface.state();
        if *self.surface.epoch.borrow() == self.epoch {
            state.loading = false;
            self.surface.epoch.send_modify(|epoch| *epoch += 1);
        }
    }
}

pub const ASSESSMENT_MARKER: &str = "Respond only with JSON";

const FOLLOW_UPS: &[&str] = &[
    "Thanks. What is your total monthly household income in dollars?",
    "Got it. Does anyone in the household receive disability benefits? (yes/no)",
    "Thank you, that's everything I need. Ask for an assessment whenever you're ready.",
];

/// Local stand-in for a hosted model: waits `latency` plus up to `jitter`,
/// then answers from a fixed script.
#[derive(Debug, Clone)]
pub struct CannedAssistant {
    latency: Duration,
    jitter_ms: u64,
}

impl CannedAssistant {
    pub fn new(latency_ms: u64, jitter_ms: u64) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            jitter_ms,
        }
    }

    pub fn instant() -> Self {
        Self::new(0, 0)
    }

    fn delay(&self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % (self.jitter_ms + 1)
        };
        self.latency + Duration::from_millis(jitter)
    }
}

impl Assistant for CannedAssistant {
    fn invoke(&self, prompt: String) -> AssistFuture {
        let delay = self.delay();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(canned_reply(&prompt))
        })
    }
}

fn canned_reply(prompt: &str) -> String {
    let answers: Vec<&str> = prompt
        .lines()
        .filter_map(|line| line.strip_prefix("User:"))
        .map(str::trim)
        .collect();

    if prompt.contains(ASSESSMENT_MARKER) {
        return format!("```json\n{}\n```", canned_assessment(&answers));
    }

    let index = answers.len().saturating_sub(1).min(FOLLOW_UPS.len() - 1);
    FOLLOW_UPS[index].to_string()
}

fn canned_assessment(answers: &[&str]) -> serde_json::Value {
    let household = answers.first().and_then(|answer| first_number(answer));
    let income = answers.get(1).and_then(|answer| first_number(answer));
    let disability = answers
        .get(2)
        .map(|answer| answer.to_ascii_lowercase().starts_with('y'));

    let (Some(household), Some(income)) = (household, income) else {
        return serde_json::json!({
            "verdict": "needs-review",
            "summary": "Not enough information to decide yet.",
            "reasons": ["household size and monthly income are both required"]
        });
    };

    let limit = 1_500 + 550 * household.max(1);
    let mut reasons = vec![format!(
        "monthly income ${} against a limit of ${} for {} people",
        income, limit, household
    )];
    let verdict = if income <= limit {
        "eligible"
    } else if disability == Some(true) {
        reasons.push("income is above the limit but a disability exemption may apply".to_string());
        "needs-review"
    } else {
        "ineligible"
    };

    serde_json::json!({
        "verdict": verdict,
        "summary": format!("Household of {} reporting ${} per month.", household, income),
        "reasons": reasons
    })
}

fn first_number(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit() || *ch == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
