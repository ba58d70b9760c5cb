//! Vendor adapter implementations

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use tiller_core::types::ToolInvocation;
use tiller_core::ProviderError;

/// Map an HTTP failure status to the provider error taxonomy.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(format!("{status}: {body}")),
        429 => ProviderError::RateLimited(format!("{status}: {body}")),
        _ => ProviderError::InvalidResponse(format!("{status}: {body}")),
    }
}

/// JSON schema advertised for every tool. Tools take a single string input;
/// the model may flag sensitive calls for approval.
pub(crate) fn tool_parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "input": {
                "type": "string",
                "description": "Tool input as a single string"
            },
            "requires_approval": {
                "type": "boolean",
                "description": "Set true when the action is sensitive and needs user approval"
            }
        },
        "required": ["input"]
    })
}

/// Render a vendor-native function call into the shared textual grammar.
///
/// `arguments` is the vendor's JSON argument string. An `input` field becomes
/// the raw input; a boolean `requires_approval` field is hoisted into the
/// grammar tag. Anything else passes through as the raw input verbatim, so a
/// vendor that ignores our schema still produces a parseable block.
pub fn render_native_call(name: &str, arguments: &str) -> String {
    let (raw_input, requires_approval) = match serde_json::from_str::<serde_json::Value>(arguments)
    {
        Ok(args) => {
            let requires_approval = args
                .get("requires_approval")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let raw_input = match args.get("input").and_then(|v| v.as_str()) {
                Some(input) => input.to_string(),
                None => arguments.to_string(),
            };
            (raw_input, requires_approval)
        }
        Err(_) => (arguments.to_string(), false),
    };

    let invocation = ToolInvocation {
        name: name.to_string(),
        raw_input,
        requires_approval,
    };
    invocation.to_grammar()
}
