use crate::assist::{AssistStatus, AssistSurface, Assistant, ASSESSMENT_MARKER};
use crate::collection::CollectionController;
use crate::errors::{AppError, AppResult};
use crate::models::{Assessment, AssessmentReply, ChatDraft, ChatMessage, ChatRole};
use crate::record::{new_record_id, Record};
use crate::store::PersistentStore;
use crate::structured::{extract_json, validate_against_schema};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const PROMPT_HISTORY: usize = 12;
const PROMPT_PREAMBLE: &str = "You are a benefits eligibility screener. Ask one short question at a time.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenerSnapshot {
    pub messages: Vec<ChatMessage>,
    pub assessment: Option<Assessment>,
    pub assistant: AssistStatus,
    pub persist_error: Option<String>,
}

/// Chat-driven eligibility screener: a message collection plus one derived
/// assessment record, each under its own key.
pub struct Screener {
    messages: CollectionController<ChatMessage>,
    assessment: Option<Assessment>,
    assessment_key: String,
    store: PersistentStore,
    surface: AssistSurface,
    persist_error: Option<String>,
}

impl Screener {
    pub fn open(
        store: PersistentStore,
        messages_key: &str,
        assessment_key: &str,
        assistant: Arc<dyn Assistant>,
    ) -> Self {
        let messages = CollectionController::open(store.clone(), messages_key);
        let schema = json!({ "anyOf": [{ "type": "null" }, Assessment::schema()] });
        let assessment = store
            .load_value::<Option<Assessment>, _>(assessment_key, Some(&schema), || None)
            .into_inner();

        Self {
            messages,
            assessment,
            assessment_key: assessment_key.to_string(),
            store,
            surface: AssistSurface::new(assistant),
            persist_error: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages.records()
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        self.assessment.as_ref()
    }

    pub fn surface(&self) -> &AssistSurface {
        &self.surface
    }

    /// Last failed write of either the transcript or the assessment.
    pub fn persist_error(&self) -> Option<&str> {
        self.persist_error.as_deref().or_else(|| self.messages.persist_error())
    }

    pub fn dismiss_errors(&mut self) {
        self.persist_error = None;
        self.messages.dismiss_errors();
    }

    pub fn snapshot(&self) -> ScreenerSnapshot {
        ScreenerSnapshot {
            messages: self.messages.records().to_vec(),
            assessment: self.assessment.clone(),
            assistant: self.surface.status(),
            persist_error: self.persist_error().map(str::to_string),
        }
    }

    /// Appends the user's message, asks the assistant and appends its reply.
    /// The user message stays in the transcript when the assistant fails.
    pub async fn send(&mut self, text: &str) -> AppResult<ChatMessage> {
        if self.surface.is_loading() {
            return Err(AppError::Busy("waiting for the previous reply".to_string()));
        }
        self.messages.add(ChatDraft::user(text))?;

        let prompt = self.conversation_prompt(None);
        let reply = self.surface.submit(&prompt).await?;
        let message = self.messages.add(ChatDraft::assistant(reply))?;
        Ok(message)
    }

    /// Asks for a structured verdict over the whole conversation and stores it.
    /// A failed save keeps the verdict in memory and surfaces through
    /// [`Screener::persist_error`].
    pub async fn assess(&mut self) -> AppResult<Assessment> {
        let answered = self.messages.records().iter().any(|message| message.role == ChatRole::User);
        if !answered {
            return Err(AppError::Validation("answer at least one question before assessing".to_string()));
        }

        let prompt = self.conversation_prompt(Some(&assessment_instruction()));
        let raw = self.surface.submit(&prompt).await?;
        let reply = parse_assessment_reply(&raw)?;

        let now = Utc::now();
        let assessment = Assessment {
            id: new_record_id("assess", now),
            verdict: reply.verdict,
            summary: reply.summary,
            reasons: reply.reasons,
            message_count: self.messages.len(),
            created_at: now,
        };
        self.assessment = Some(assessment.clone());
        let saved = self.store.save(&self.assessment_key, &assessment);
        self.record_persist("save", saved);
        tracing::info!(verdict = ?assessment.verdict, messages = assessment.message_count, "screening assessed");
        Ok(assessment)
    }

    /// Drops the transcript and assessment, cancels any pending request and
    /// starts again from the greeting.
    pub fn reset(&mut self) {
        self.surface.cancel();
        self.messages.clear();
        self.messages.add_many(ChatMessage::seed());
        self.assessment = None;
        let removed = self.store.remove(&self.assessment_key);
        self.record_persist("remove", removed.map(|_| ()));
    }

    pub fn cancel(&self) -> bool {
        self.surface.cancel()
    }

    fn record_persist(&mut self, action: &str, result: AppResult<()>) {
        match result {
            Ok(()) => self.persist_error = None,
            Err(error) => {
                tracing::warn!(key = %self.assessment_key, action, error = %error, "failed to persist assessment");
                self.persist_error = Some(error.to_string());
            }
        }
    }

    fn conversation_prompt(&self, instruction: Option<&str>) -> String {
        let records = self.messages.records();
        let start = records.len().saturating_sub(PROMPT_HISTORY);
        let mut prompt = String::from(PROMPT_PREAMBLE);
        prompt.push('\n');
        for message in &records[start..] {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
                ChatRole::System => "System",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        if let Some(instruction) = instruction {
            prompt.push_str(instruction);
        }
        prompt
    }
}

fn assessment_instruction() -> String {
    format!(
        "{} matching this schema: {}",
        ASSESSMENT_MARKER,
        AssessmentReply::schema()
    )
}

fn parse_assessment_reply(raw: &str) -> AppResult<AssessmentReply> {
    let value = extract_json(raw)
        .ok_or_else(|| AppError::Assistant("assessment reply did not contain JSON".to_string()))?;
    validate_against_schema(&value, &AssessmentReply::schema())
        .map_err(|errors| AppError::Assistant(format!("assessment reply invalid: {}", errors.join("; "))))?;
    serde_json::from_value(value).map_err(|error| AppError::Assistant(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{parse_assessment_reply, Screener};
    use crate::assist::{AssistFuture, Assistant, CannedAssistant};
    use crate::errors::AppError;
    use crate::models::{ChatRole, Verdict, SCREENER_GREETING};
    use crate::store::{MemoryStore, PersistentStore};
    use std::sync::Arc;

    fn open(store: &PersistentStore) -> Screener {
        Screener::open(store.clone(), "messages", "assessment", Arc::new(CannedAssistant::instant()))
    }

    struct ProseAssistant;

    impl Assistant for ProseAssistant {
        fn invoke(&self, _prompt: String) -> AssistFuture {
            Box::pin(async { Ok("I think you qualify!".to_string()) })
        }
    }

    #[tokio::test]
    async fn conversation_then_assessment_persists() {
        let store = PersistentStore::in_memory();
        let mut screener = open(&store);
        assert_eq!(screener.messages().len(), 1);
        assert_eq!(screener.messages()[0].content, SCREENER_GREETING);

        screener.send("3").await.expect("first answer");
        screener.send("1800").await.expect("second answer");
        let last = screener.send("no").await.expect("third answer");
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(screener.messages().len(), 7);

        let assessment = screener.assess().await.expect("assessment");
        assert_eq!(assessment.verdict, Verdict::Eligible);
        assert_eq!(assessment.message_count, 7);

        let reopened = open(&store);
        assert_eq!(reopened.messages().len(), 7);
        assert_eq!(reopened.assessment().map(|value| value.verdict), Some(Verdict::Eligible));
    }

    #[tokio::test]
    async fn assess_requires_an_answer_and_reset_reseeds() {
        let store = PersistentStore::in_memory();
        let mut screener = open(&store);
        assert!(matches!(screener.assess().await, Err(AppError::Validation(_))));

        screener.send("2").await.expect("answer");
        screener.assess().await.expect("assessment");
        screener.reset();
        assert_eq!(screener.messages().len(), 1);
        assert!(screener.assessment().is_none());
        assert!(open(&store).assessment().is_none());
    }

    #[tokio::test]
    async fn assessment_survives_a_failed_save() {
        let store = PersistentStore::new(Arc::new(MemoryStore::with_quota(64)));
        let mut screener = open(&store);
        screener.send("2").await.expect("answer");

        let assessment = screener.assess().await.expect("assessment kept despite quota");
        assert_eq!(screener.assessment().map(|value| value.id.as_str()), Some(assessment.id.as_str()));
        let snapshot = screener.snapshot();
        assert_eq!(snapshot.assessment.map(|value| value.id), Some(assessment.id));
        assert!(snapshot.persist_error.unwrap_or_default().contains("STORAGE_QUOTA"));
        assert!(open(&store).assessment().is_none());

        screener.dismiss_errors();
        assert!(screener.persist_error().is_none());
    }

    #[tokio::test]
    async fn unstructured_reply_is_reported_not_stored() {
        let store = PersistentStore::in_memory();
        let mut screener = Screener::open(store, "messages", "assessment", Arc::new(ProseAssistant));
        screener.send("4").await.expect("answer");
        let error = screener.assess().await.expect_err("prose is not an assessment");
        assert!(matches!(error, AppError::Assistant(_)));
        assert!(screener.assessment().is_none());
    }

    #[test]
    fn reply_must_match_schema() {
        assert!(parse_assessment_reply(r#"{"verdict":"eligible","summary":"ok"}"#).is_ok());
        assert!(parse_assessment_reply(r#"{"verdict":"maybe","summary":"ok"}"#).is_err());
        assert!(parse_assessment_reply("no json here").is_err());
    }
}
