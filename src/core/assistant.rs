//! LLM Assistant service.
//!
//! Builds the bounded conversation window sent to a backend, walks the
//! configured backends in priority order, and falls back to a canned
//! offline reply when none of them answers.

use crate::config::Settings;
use crate::core::backends::{
    AnthropicBackend, LlmBackend, OpenAiBackend, TokenUsage, normalize_backend_id,
};
use crate::infrastructure::entities;
use di::{Ref, injectable};
use log::{debug, error, info, warn};
use minijinja::{Environment, context};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

/// How many prior chat messages are sent along with a new one.
pub const HISTORY_WINDOW: usize = 10;

/// Backend label reported when the offline fallback produced the reply.
pub const FALLBACK_LABEL: &str = "fallback";

const EXCERPT_CHARS: usize = 100;

const FILE_CONTEXT_TEMPLATE: &str = "\n\nThe user has attached the following files to this conversation:\n{% for file in files %}- {{ file.name }} ({{ file.mime_type }})\n{% endfor %}";

const FALLBACK_TEMPLATES: &[&str] = &[
    "I'm currently running in offline mode and can't reach an AI service. You said: \"{{ excerpt }}\". Please try again in a few minutes.",
    "Thanks for your message! The AI service is temporarily unavailable.{% if persona %} I'm set up to help as: {{ persona }}.{% endif %} Please try again shortly.",
    "I received your message about \"{{ excerpt }}\", but I can't generate a full response right now because no AI service is reachable. Your message has been saved.",
    "Sorry, I'm having trouble connecting to the AI service right now.{% if persona %} Once I'm back I'll continue helping as: {{ persona }}.{% endif %}",
];

const LAST_RESORT_REPLY: &str =
    "I'm currently offline and can't generate a response. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<entities::Message> for ChatMessage {
    fn from(m: entities::Message) -> Self {
        Self {
            content: m.content,
            role: match m.role {
                entities::MessageRole::User => Role::User,
                entities::MessageRole::Assistant => Role::Assistant,
            },
        }
    }
}

/// What a backend gets to see: the system prompt first, then the chat turns.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Keeps at most [`HISTORY_WINDOW`] of the most recent `history` entries
    /// (expected oldest first) and appends the new user message.
    pub fn build(
        system: String,
        history: Vec<entities::Message>,
        user_message: impl Into<String>,
    ) -> Self {
        let skip = history.len().saturating_sub(HISTORY_WINDOW);
        let mut messages: Vec<ChatMessage> = history
            .into_iter()
            .skip(skip)
            .map(ChatMessage::from)
            .collect();
        messages.push(ChatMessage::new(Role::User, user_message));

        Self { system, messages }
    }

    fn last_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct FileContextEntry<'a> {
    name: &'a str,
    mime_type: &'a str,
}

/// Renders the blurb appended to the system prompt when files are attached.
pub fn file_context(files: &[entities::ProjectFile]) -> Option<String> {
    if files.is_empty() {
        return None;
    }

    let files: Vec<FileContextEntry> = files
        .iter()
        .map(|f| FileContextEntry {
            name: &f.original_name,
            mime_type: &f.mime_type,
        })
        .collect();

    Environment::new()
        .render_str(FILE_CONTEXT_TEMPLATE, context! { files => files })
        .inspect_err(|e| error!("failed to render file context: {e}"))
        .ok()
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

/// Renders one of the canned offline replies.
pub fn fallback_reply(template: usize, user_message: &str, system_prompt: &str) -> String {
    let source = FALLBACK_TEMPLATES[template % FALLBACK_TEMPLATES.len()];
    Environment::new()
        .render_str(
            source,
            context! {
                excerpt => excerpt(user_message),
                persona => excerpt(system_prompt),
            },
        )
        .inspect_err(|e| error!("failed to render fallback reply: {e}"))
        .unwrap_or_else(|_| LAST_RESORT_REPLY.to_owned())
}

/// The configured backends, in registration (= fixed secondary) order.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn LlmBackend>>,
    preferred: Option<String>,
}

impl BackendRegistry {
    pub fn new(preferred: Option<&str>) -> Self {
        Self {
            backends: Vec::new(),
            preferred: preferred.map(|p| {
                normalize_backend_id(p)
                    .map(str::to_owned)
                    .unwrap_or_else(|| p.trim().to_ascii_lowercase())
            }),
        }
    }

    pub fn register(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Registers every backend whose credential is present: Anthropic, then OpenAI.
    pub fn from_settings(settings: &Settings) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new(settings.preferred_backend.as_deref());

        if let Some(api_key) = &settings.anthropic.api_key {
            registry = registry.register(Arc::new(AnthropicBackend::new(
                client.clone(),
                api_key.clone(),
                &settings.anthropic,
                settings.llm_max_tokens,
                settings.llm_timeout,
            )));
        }
        if let Some(api_key) = &settings.openai.api_key {
            registry = registry.register(Arc::new(OpenAiBackend::new(
                client,
                api_key.clone(),
                &settings.openai,
                settings.llm_max_tokens,
                settings.llm_timeout,
            )));
        }

        registry
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.backends.iter().any(|b| b.id() == id)
    }

    /// Attempt order: the preferred backend (if registered), then the rest.
    pub fn ordered(&self) -> Vec<Arc<dyn LlmBackend>> {
        let preferred = self.preferred.as_deref();
        let mut ordered: Vec<Arc<dyn LlmBackend>> = Vec::with_capacity(self.backends.len());

        if let Some(first) = self.backends.iter().find(|b| Some(b.id()) == preferred) {
            ordered.push(first.clone());
        }
        ordered.extend(
            self.backends
                .iter()
                .filter(|b| Some(b.id()) != preferred)
                .cloned(),
        );

        ordered
    }
}

#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub content: String,
    pub backend_label: String,
    pub usage: Option<TokenUsage>,
}

#[injectable]
pub struct Assistant {
    registry: Ref<BackendRegistry>,
}

impl Assistant {
    pub fn new(registry: Ref<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// Never fails: backend errors are logged and the next backend is tried,
    /// and when all of them fail the reply comes from the offline templates.
    pub async fn reply(&self, conversation: &Conversation) -> AssistantReply {
        let backends = self.registry.ordered();
        if backends.is_empty() {
            info!("no LLM backend configured, answering with offline fallback");
        }

        for backend in backends {
            debug!(
                "sending {} messages to {}",
                conversation.messages.len(),
                backend.label()
            );

            match backend.complete(conversation).await {
                Ok(completion) => {
                    if let Some(usage) = &completion.usage {
                        info!(
                            "{} usage: {} input + {} output = {} tokens",
                            backend.label(),
                            usage.input_tokens,
                            usage.output_tokens,
                            usage.total_tokens
                        );
                    }

                    return AssistantReply {
                        content: completion.content,
                        backend_label: backend.label().to_owned(),
                        usage: completion.usage,
                    };
                }
                Err(e) => warn!("{} failed, trying next backend: {e}", backend.label()),
            }
        }

        let template = rand::thread_rng().gen_range(0..FALLBACK_TEMPLATES.len());
        AssistantReply {
            content: fallback_reply(
                template,
                conversation.last_user_message(),
                &conversation.system,
            ),
            backend_label: FALLBACK_LABEL.to_owned(),
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backends::{BackendError, Completion};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Records the order in which backends were called.
    type CallLog = Arc<Mutex<Vec<String>>>;

    struct ScriptedBackend {
        id: &'static str,
        succeed: bool,
        calls: CallLog,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn id(&self) -> &str {
            self.id
        }

        fn label(&self) -> &str {
            self.id
        }

        async fn complete(&self, conversation: &Conversation) -> Result<Completion, BackendError> {
            self.calls.lock().unwrap().push(self.id.to_owned());
            if self.succeed {
                Ok(Completion {
                    content: format!("{} saw {} messages", self.id, conversation.messages.len()),
                    usage: Some(TokenUsage::new(5, 7)),
                })
            } else {
                Err(BackendError::Malformed("scripted failure".to_owned()))
            }
        }
    }

    fn backend(id: &'static str, succeed: bool, calls: &CallLog) -> Arc<dyn LlmBackend> {
        Arc::new(ScriptedBackend {
            id,
            succeed,
            calls: calls.clone(),
        })
    }

    fn message(role: entities::MessageRole, content: &str) -> entities::Message {
        entities::Message {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            role,
            content: content.to_owned(),
            created_at: Utc::now(),
        }
    }

    fn conversation() -> Conversation {
        Conversation::build("Be nice.".to_owned(), Vec::new(), "Hello")
    }

    #[test]
    fn test_chat_message_from_entity() {
        let chat_message: ChatMessage =
            message(entities::MessageRole::Assistant, "Hi there!").into();
        assert_eq!(chat_message.role, Role::Assistant);
        assert_eq!(chat_message.content, "Hi there!");
    }

    #[test]
    fn test_conversation_keeps_ten_most_recent() {
        let history: Vec<_> = (0..15)
            .map(|i| message(entities::MessageRole::User, &format!("m{i}")))
            .collect();

        let conversation = Conversation::build("system".to_owned(), history, "new");

        assert_eq!(conversation.messages.len(), HISTORY_WINDOW + 1);
        assert_eq!(conversation.messages[0].content, "m5");
        assert_eq!(conversation.messages[9].content, "m14");
        assert_eq!(conversation.messages[10].content, "new");
        assert_eq!(conversation.system, "system");
    }

    #[test]
    fn test_preferred_backend_goes_first() {
        let calls = CallLog::default();
        let registry = BackendRegistry::new(Some("OpenAI"))
            .register(backend("anthropic", true, &calls))
            .register(backend("openai", true, &calls));

        let ids: Vec<_> = registry.ordered().iter().map(|b| b.id().to_owned()).collect();
        assert_eq!(ids, ["openai", "anthropic"]);
    }

    #[test]
    fn test_unregistered_preference_keeps_fixed_order() {
        let calls = CallLog::default();
        let registry = BackendRegistry::new(Some("claude")).register(backend("openai", true, &calls));

        let ids: Vec<_> = registry.ordered().iter().map(|b| b.id().to_owned()).collect();
        assert_eq!(ids, ["openai"]);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let calls = CallLog::default();
        let registry = BackendRegistry::new(None)
            .register(backend("anthropic", true, &calls))
            .register(backend("openai", true, &calls));

        let reply = Assistant::new(Ref::new(registry))
            .reply(&conversation())
            .await;

        assert_eq!(reply.backend_label, "anthropic");
        assert_eq!(reply.usage, Some(TokenUsage::new(5, 7)));
        assert_eq!(*calls.lock().unwrap(), ["anthropic"]);
    }

    #[tokio::test]
    async fn test_failure_moves_to_next_backend_once() {
        let calls = CallLog::default();
        let registry = BackendRegistry::new(Some("anthropic"))
            .register(backend("anthropic", false, &calls))
            .register(backend("openai", true, &calls));

        let reply = Assistant::new(Ref::new(registry))
            .reply(&conversation())
            .await;

        assert_eq!(reply.backend_label, "openai");
        assert_eq!(reply.content, "openai saw 1 messages");
        assert_eq!(*calls.lock().unwrap(), ["anthropic", "openai"]);
    }

    #[tokio::test]
    async fn test_all_failures_produce_fallback() {
        let calls = CallLog::default();
        let registry = BackendRegistry::new(None)
            .register(backend("anthropic", false, &calls))
            .register(backend("openai", false, &calls));

        let reply = Assistant::new(Ref::new(registry))
            .reply(&conversation())
            .await;

        assert_eq!(reply.backend_label, FALLBACK_LABEL);
        assert!(!reply.content.trim().is_empty());
        assert!(reply.usage.is_none());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_backends_produce_fallback() {
        let reply = Assistant::new(Ref::new(BackendRegistry::new(None)))
            .reply(&conversation())
            .await;

        assert_eq!(reply.backend_label, FALLBACK_LABEL);
        assert!(!reply.content.is_empty());
    }

    #[test]
    fn test_fallback_templates_render() {
        let long = "x".repeat(300);
        for template in 0..FALLBACK_TEMPLATES.len() {
            let reply = fallback_reply(template, &long, "A pirate assistant");
            assert!(!reply.is_empty());
            assert!(!reply.contains("{{"));
            assert!(!reply.contains(&long));
        }

        let echoed = fallback_reply(0, "What is Rust?", "");
        assert!(echoed.contains("What is Rust?"));
    }

    #[test]
    fn test_file_context_lists_files() {
        let file = entities::ProjectFile {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            stored_name: "abc-notes.md".to_owned(),
            original_name: "notes.md".to_owned(),
            mime_type: "text/markdown".to_owned(),
            size_bytes: 42,
            external_id: Some("file_1".to_owned()),
            status: entities::FileStatus::Processed,
            error_message: None,
            created_at: Utc::now(),
        };

        let blurb = file_context(&[file]).unwrap();
        assert!(blurb.contains("- notes.md (text/markdown)"));
        assert!(file_context(&[]).is_none());
    }
}
