//! Post-task reflection
//!
//! After a session completes naturally, a non-streaming model call distills
//! the task into a [`TaskMemory`] record for the memory store. Malformed
//! structured output gets exactly one corrective retry before the record is
//! abandoned; reflection is best-effort and never fails the session.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tiller_core::types::{ChatRequest, Message};
use tiller_core::{ProviderAdapter, TaskMemory};

use crate::error::{SessionError, SessionResult};

const REFLECTION_PROMPT: &str = "You summarize completed browser-automation tasks. \
Respond with a single JSON object with exactly two string fields: \
\"domain\" (the website domain the task ran against, e.g. \"github.com\") and \
\"task_description\" (one sentence describing what was accomplished). \
Respond with only the JSON object, no other text.";

/// Fields the model is asked to produce; the tool sequence and timestamp
/// are known locally and never round-trip through the model.
#[derive(Debug, Deserialize)]
struct ReflectionReply {
    domain: String,
    task_description: String,
}

pub struct Reflector {
    provider: Arc<dyn ProviderAdapter>,
}

impl Reflector {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }

    /// Distill a finished task into a memory record.
    pub async fn extract(
        &self,
        task: &str,
        tool_sequence: &[String],
    ) -> SessionResult<TaskMemory> {
        let user_turn = format!(
            "Task: {task}\nTools used, in order: {}",
            tool_sequence.join(", ")
        );
        let mut messages = vec![Message::user(&user_turn)];

        let request = ChatRequest::new(REFLECTION_PROMPT, messages.clone());
        let output = self.provider.complete_chat(request).await?;

        let reply = match parse_reply(&output.text) {
            Ok(reply) => reply,
            Err(first_error) => {
                tracing::debug!(error = %first_error, "reflection output malformed, retrying once");
                messages.push(Message::assistant(&output.text));
                messages.push(Message::user(
                    "That was not valid JSON. Respond with only the JSON object.",
                ));
                let retry = self
                    .provider
                    .complete_chat(ChatRequest::new(REFLECTION_PROMPT, messages))
                    .await?;
                parse_reply(&retry.text).map_err(SessionError::Parse)?
            }
        };

        Ok(TaskMemory {
            domain: reply.domain,
            task_description: reply.task_description,
            tool_sequence: tool_sequence.to_vec(),
            recorded_at: Utc::now(),
        })
    }
}

/// Extract the outermost JSON object from possibly chatty model output.
fn parse_reply(text: &str) -> Result<ReflectionReply, String> {
    let start = text.find('{').ok_or("no JSON object in output")?;
    let end = text.rfind('}').ok_or("unterminated JSON object")?;
    if end < start {
        return Err("unterminated JSON object".to_string());
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let reply =
            parse_reply(r#"{"domain":"github.com","task_description":"opened a PR"}"#).unwrap();
        assert_eq!(reply.domain, "github.com");
    }

    #[test]
    fn parses_object_wrapped_in_prose() {
        let reply = parse_reply(
            "Sure! Here it is:\n{\"domain\":\"docs.rs\",\"task_description\":\"searched crates\"}\nDone.",
        )
        .unwrap();
        assert_eq!(reply.domain, "docs.rs");
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_reply(r#"{"domain":"x.com"}"#).is_err());
    }

    #[test]
    fn rejects_no_object_at_all() {
        assert!(parse_reply("I could not summarize that.").is_err());
    }
}
