//! Execution session state machine
//!
//! Drives the model/tool dialogue for one task: stream a model turn, watch
//! it for a tool-call block, gate sensitive calls on approval, run the tool,
//! record the result, and loop under a step ceiling and token budget.
//!
//! Execution is single-threaded cooperative per session. The cancellation
//! token is polled at every suspension point; setting it guarantees no new
//! tool execution starts, though an in-flight call runs to completion with
//! its result discarded. A provider failure on the streaming path falls
//! back to the non-streaming path exactly once for the life of the session;
//! a failure after that is fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tiller_core::types::{ChatRequest, Message, StreamEvent, TokenUsage, ToolInvocation};
use tiller_core::{ApprovalGate, MemoryStore, ProviderAdapter, ProviderError, UsageMeter};
use tiller_tools::ToolRegistry;

use crate::cancel::CancelToken;
use crate::context::SlidingWindowContext;
use crate::error::SessionResult;
use crate::reflection::Reflector;
use crate::scanner::ToolCallScanner;

const DEFAULT_MAX_STEPS: usize = 10;
const DEFAULT_TOKEN_BUDGET: usize = 16_384;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(150);

const STEP_CEILING_NOTICE: &str = "stopped: exceeded maximum steps";
const CANCELLED_NOTICE: &str = "cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Streaming,
    ToolDetected,
    AwaitingApproval,
    ExecutingTool,
    Recording,
    Done,
    Cancelled,
    FallenBack,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub max_steps: usize,
    pub token_budget: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }
}

/// Callbacks surfaced to the host while a session runs.
///
/// `on_segment` delivers forwarded model text as it arrives; a tool-call
/// block itself is never forwarded. When a stream fails mid-turn the turn
/// is replayed on the blocking path, so prose forwarded before the failure
/// can arrive a second time in that turn. Hosts rendering segments should
/// treat each turn's output as replaceable rather than strictly
/// append-only. `on_complete` always fires exactly once per run, with a
/// short human-readable notice.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn on_segment(&self, _text: &str) {}
    async fn on_tool_start(&self, _name: &str, _input: &str) {}
    async fn on_tool_end(&self, _result: &str) {}
    async fn on_complete(&self, _notice: &str) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

#[async_trait]
impl SessionObserver for NullObserver {}

/// What one model turn produced.
struct TurnOutcome {
    text: String,
    invocation: Option<ToolInvocation>,
    cancelled: bool,
}

pub struct ExecutionSession {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    approval: Arc<dyn ApprovalGate>,
    memory: Option<Arc<dyn MemoryStore>>,
    usage: Arc<UsageMeter>,
    config: SessionConfig,
    context: SlidingWindowContext,
    cancel: CancelToken,
    status: SessionStatus,
    step_count: usize,
    tool_sequence: Vec<String>,
    fell_back: bool,
}

impl ExecutionSession {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<ToolRegistry>,
        approval: Arc<dyn ApprovalGate>,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            approval,
            memory: None,
            usage: Arc::new(UsageMeter::new()),
            config,
            context: SlidingWindowContext::new(),
            cancel: CancelToken::new(),
            status: SessionStatus::Idle,
            step_count: 0,
            tool_sequence: Vec::new(),
            fell_back: false,
        }
    }

    /// Attach a memory store; a completed task is reflected into it.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Share a process-wide usage meter across sessions.
    pub fn with_usage_meter(mut self, usage: Arc<UsageMeter>) -> Self {
        self.usage = usage;
        self
    }

    /// Token for cancelling this session from another task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Run one task to completion. Errors never escape: any failure inside
    /// the loop is reported through `on_complete` as a fatal notice.
    pub async fn run(&mut self, prompt: &str, observer: &dyn SessionObserver) {
        match self.run_inner(prompt, observer).await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(error = %e, "session failed");
                self.status = SessionStatus::Fatal;
                observer.on_complete(&format!("fatal: {e}")).await;
            }
        }
    }

    async fn run_inner(
        &mut self,
        prompt: &str,
        observer: &dyn SessionObserver,
    ) -> SessionResult<()> {
        self.context.add_message(Message::user(prompt));
        self.status = SessionStatus::Streaming;

        loop {
            if self.check_cancelled(observer).await {
                return Ok(());
            }

            self.context.trim_to_budget(self.config.token_budget);
            let request = ChatRequest::new(
                self.config.system_prompt.clone(),
                self.context.messages().to_vec(),
            )
            .with_tools(self.tools.specs());

            let turn = if self.fell_back {
                self.blocking_turn(request, observer).await?
            } else {
                match self.stream_turn(request, observer).await {
                    Ok(turn) => turn,
                    Err(e) => {
                        tracing::warn!(error = %e, "streaming path failed, falling back");
                        self.fell_back = true;
                        self.status = SessionStatus::FallenBack;
                        continue;
                    }
                }
            };

            if turn.cancelled {
                self.finish_cancelled(observer).await;
                return Ok(());
            }

            let Some(invocation) = turn.invocation else {
                // No tool call: the turn is the final answer.
                self.context.add_message(Message::assistant(&turn.text));
                self.status = SessionStatus::Done;
                self.reflect(prompt).await;
                observer.on_complete("done").await;
                return Ok(());
            };

            self.status = SessionStatus::ToolDetected;
            tracing::info!(tool = %invocation.name, "tool call detected");

            // The assistant turn is the forwarded prose plus the normalized
            // call block, so the model sees its own action in history.
            let mut assistant_text = turn.text;
            if !assistant_text.is_empty() && !assistant_text.ends_with('\n') {
                assistant_text.push('\n');
            }
            assistant_text.push_str(&invocation.to_grammar());
            self.context.add_message(Message::assistant(assistant_text));

            if !self.tools.contains(&invocation.name) {
                let corrective = format!(
                    "Tool '{}' does not exist. Valid tools: {}",
                    invocation.name,
                    self.tools.names().join(", ")
                );
                tracing::warn!(tool = %invocation.name, "unknown tool requested");
                if self.record_result(corrective, observer).await {
                    return Ok(());
                }
                continue;
            }

            let approved = if invocation.requires_approval {
                self.status = SessionStatus::AwaitingApproval;
                self.approval
                    .request_approval(
                        &invocation.name,
                        &invocation.raw_input,
                        "The model flagged this action as requiring approval",
                    )
                    .await
            } else {
                true
            };

            // No new tool execution after cancellation.
            if self.check_cancelled(observer).await {
                return Ok(());
            }

            let result_text = if approved {
                self.status = SessionStatus::ExecutingTool;
                observer
                    .on_tool_start(&invocation.name, &invocation.raw_input)
                    .await;

                let result = self
                    .tools
                    .invoke(&invocation.name, &invocation.raw_input)
                    .await;

                // An in-flight call completes, but its result is discarded
                // once the session is cancelled.
                if self.cancel.is_cancelled() {
                    self.finish_cancelled(observer).await;
                    return Ok(());
                }

                let text = match result {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(tool = %invocation.name, error = %e, "tool failed");
                        format!("Error: {e}")
                    }
                };
                observer.on_tool_end(&text).await;
                self.tool_sequence.push(invocation.name.clone());
                text
            } else {
                tracing::info!(tool = %invocation.name, "tool execution denied");
                "The user denied this tool execution.".to_string()
            };

            let result_message = format!("Tool result ({}): {}", invocation.name, result_text);
            if self.record_result(result_message, observer).await {
                return Ok(());
            }
        }
    }

    /// Append a result turn and advance the step counter. Returns `true`
    /// when the step ceiling ends the session.
    async fn record_result(&mut self, text: String, observer: &dyn SessionObserver) -> bool {
        self.status = SessionStatus::Recording;
        self.context.add_message(Message::user(text));
        self.step_count += 1;

        if self.step_count >= self.config.max_steps {
            tracing::warn!(steps = self.step_count, "step ceiling reached");
            self.status = SessionStatus::Done;
            observer.on_segment(STEP_CEILING_NOTICE).await;
            observer.on_complete(STEP_CEILING_NOTICE).await;
            return true;
        }

        self.status = SessionStatus::Streaming;
        false
    }

    /// Pull one streamed model turn, scanning for a tool-call block.
    /// A `ProviderError` propagates so the caller can decide on fallback.
    async fn stream_turn(
        &mut self,
        request: ChatRequest,
        observer: &dyn SessionObserver,
    ) -> Result<TurnOutcome, ProviderError> {
        self.status = SessionStatus::Streaming;
        let prompt_chars = request.prompt_chars();
        let mut stream = self.provider.stream_chat(request);
        let mut scanner = ToolCallScanner::new();
        let mut forwarded = String::new();
        let mut invocation = None;
        let mut saw_usage = false;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Text(text) => {
                    let step = scanner.feed(&text);
                    if !step.emit.is_empty() {
                        observer.on_segment(&step.emit).await;
                        forwarded.push_str(&step.emit);
                    }
                    if step.invocation.is_some() {
                        invocation = step.invocation;
                        break;
                    }
                }
                // Reasoning output is surfaced nowhere and never scanned.
                StreamEvent::Reasoning(_) => {}
                StreamEvent::Usage(usage) => {
                    self.usage.record(&usage);
                    saw_usage = true;
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(TurnOutcome {
                    text: forwarded,
                    invocation: None,
                    cancelled: true,
                });
            }
        }

        if invocation.is_none() {
            let tail = scanner.finish();
            if !tail.is_empty() {
                observer.on_segment(&tail).await;
                forwarded.push_str(&tail);
            }
        }

        // A stream abandoned before its usage event still gets counted.
        if !saw_usage {
            self.usage.record(&TokenUsage::estimate_from_chars(
                prompt_chars,
                forwarded.chars().count(),
            ));
        }

        Ok(TurnOutcome {
            text: forwarded,
            invocation,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    /// One non-streaming model turn, polled for cancellation while the
    /// request is in flight.
    async fn blocking_turn(
        &mut self,
        request: ChatRequest,
        observer: &dyn SessionObserver,
    ) -> Result<TurnOutcome, ProviderError> {
        self.status = SessionStatus::Streaming;
        let call = self.provider.complete_chat(request);
        tokio::pin!(call);

        let output = loop {
            tokio::select! {
                output = &mut call => break output?,
                _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => {
                    if self.cancel.is_cancelled() {
                        return Ok(TurnOutcome {
                            text: String::new(),
                            invocation: None,
                            cancelled: true,
                        });
                    }
                }
            }
        };

        self.usage.record(&output.usage);

        // Same machine as the streaming path, fed in one shot.
        let mut scanner = ToolCallScanner::new();
        let step = scanner.feed(&output.text);
        let mut segment = step.emit;
        if step.invocation.is_none() {
            segment.push_str(&scanner.finish());
        }
        if !segment.is_empty() {
            observer.on_segment(&segment).await;
        }

        Ok(TurnOutcome {
            text: segment,
            invocation: step.invocation,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    async fn check_cancelled(&mut self, observer: &dyn SessionObserver) -> bool {
        if self.cancel.is_cancelled() {
            self.finish_cancelled(observer).await;
            return true;
        }
        false
    }

    async fn finish_cancelled(&mut self, observer: &dyn SessionObserver) {
        tracing::info!("session cancelled");
        self.status = SessionStatus::Cancelled;
        observer.on_complete(CANCELLED_NOTICE).await;
    }

    /// Best-effort reflection into the memory store. Never fails the run.
    async fn reflect(&self, task: &str) {
        let Some(memory) = &self.memory else {
            return;
        };
        if self.tool_sequence.is_empty() {
            return;
        }

        let reflector = Reflector::new(Arc::clone(&self.provider));
        match reflector.extract(task, &self.tool_sequence).await {
            Ok(record) => {
                if let Err(e) = memory.store(record).await {
                    tracing::warn!(error = %e, "failed to store task memory");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reflection failed, no memory recorded");
            }
        }
    }
}
