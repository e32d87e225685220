use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SessionError, ToolError};
use crate::hooks::{
    ApprovalBaseline, HookSet, InvocationRecord, PreVerdict, PromptDecision, ToolInvocation,
};
use crate::model::{
    AgentModel, DecisionRequest, ModelAction, ModelUsage, ToolCallRecord, TranscriptEntry,
};
use crate::tools::{ToolAccess, ToolContent, ToolDefinition, ToolRegistry};

pub const DEFAULT_MAX_TURNS: u32 = 24;

/// Process-wide sequence distinguishing concurrent sessions in logs.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// How tool invocations are gated before hooks run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Read-only tools run freely, anything else needs a hook approval.
    #[default]
    Default,
    /// Like `Default`, but edits run freely too.
    AcceptEdits,
    /// Every tool runs without asking.
    BypassPermissions,
    /// Read-only tools run, mutating tools are refused outright.
    Plan,
}

impl PermissionMode {
    /// Mode-level verdict for one invocation, before hooks weigh in.
    pub fn baseline(self, tool: &str, access: ToolAccess) -> ApprovalBaseline {
        match (self, access) {
            (PermissionMode::BypassPermissions, _) => ApprovalBaseline::Auto,
            (_, ToolAccess::ReadOnly) => ApprovalBaseline::Auto,
            (PermissionMode::AcceptEdits, ToolAccess::Edit) => ApprovalBaseline::Auto,
            (PermissionMode::Plan, _) => ApprovalBaseline::Deny {
                reason: format!("tool '{tool}' is blocked while planning"),
            },
            _ => ApprovalBaseline::Ask,
        }
    }
}

/// Why a session stream produced its terminal event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    FinalAnswer,
    TurnBudgetExhausted,
    PromptRejected,
}

/// One item on a session's event stream.
///
/// Serialized form is tagged by `kind` with camelCase fields, matching what
/// subscribers on the wire expect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    Assistant {
        text: String,
    },
    ToolInvocationRequest {
        call_id: String,
        tool_name: String,
        raw_arguments: Value,
    },
    ToolInvocationResult {
        call_id: String,
        tool_name: String,
        is_error: bool,
        content: ToolContent,
    },
    Terminal {
        total_turns: u32,
        total_cost: f64,
        stop_reason: StopReason,
    },
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub prompt: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// `None` exposes every registered tool; `Some(vec![])` exposes none.
    pub allowed_tools: Option<Vec<String>>,
    pub permission_mode: PermissionMode,
    pub max_turns: u32,
    pub tool_timeout: Option<Duration>,
    pub hooks: HookSet,
}

impl SessionConfig {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            system_prompt: None,
            allowed_tools: None,
            permission_mode: PermissionMode::default(),
            max_turns: DEFAULT_MAX_TURNS,
            tool_timeout: None,
            hooks: HookSet::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_allowed_tools(mut self, allowed_tools: Vec<String>) -> Self {
        self.allowed_tools = Some(allowed_tools);
        self
    }

    pub fn with_permission_mode(mut self, permission_mode: PermissionMode) -> Self {
        self.permission_mode = permission_mode;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = Some(tool_timeout);
        self
    }

    pub fn with_hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }
}

/// Completed-turn counter capped at the session budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnCounter {
    completed: u32,
    max: u32,
}

impl TurnCounter {
    pub fn new(max: u32) -> Self {
        Self { completed: 0, max }
    }

    /// Counts one completed turn; saturates at the budget.
    pub fn record(&mut self) {
        if self.completed < self.max {
            self.completed += 1;
        }
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    pub fn exhausted(&self) -> bool {
        self.completed >= self.max
    }
}

/// Condensed outcome of a drained session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub reply: Option<String>,
    pub total_turns: u32,
    pub total_cost: f64,
    pub stop_reason: StopReason,
}

pub type SessionStream = Pin<Box<dyn Stream<Item = Result<SessionEvent, SessionError>> + Send>>;

#[derive(Default)]
pub struct SessionDriverBuilder {
    model: Option<Arc<dyn AgentModel>>,
    tools: Vec<ToolDefinition>,
}

impl SessionDriverBuilder {
    pub fn model<M>(mut self, model: M) -> Self
    where
        M: AgentModel + 'static,
    {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn build(self) -> Result<SessionDriver, SessionError> {
        let Some(model) = self.model else {
            return Err(SessionError::InvalidConfiguration(
                "session model must be configured via SessionDriverBuilder::model(...)".to_string(),
            ));
        };

        let mut registry = ToolRegistry::new();
        for tool in self.tools {
            registry.register(tool)?;
        }

        Ok(SessionDriver {
            model,
            registry: Arc::new(registry),
        })
    }
}

/// Runs sessions against one model and one tool registry.
///
/// The driver itself is cheap to share; every [`SessionDriver::run`] call
/// produces an independent single-use event stream.
pub struct SessionDriver {
    model: Arc<dyn AgentModel>,
    registry: Arc<ToolRegistry>,
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("tools", &self.registry.len())
            .finish()
    }
}

impl SessionDriver {
    pub fn builder() -> SessionDriverBuilder {
        SessionDriverBuilder::default()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Starts a session and returns its event stream.
    ///
    /// Configuration problems surface here, before any event is produced.
    /// The stream is lazy: nothing runs until it is polled, and dropping it
    /// abandons the session, including any tool handler in flight.
    pub fn run(&self, config: SessionConfig) -> Result<SessionStream, SessionError> {
        validate_config(&config, &self.registry)?;

        let model = Arc::clone(&self.model);
        let registry = Arc::clone(&self.registry);
        let session = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);

        let stream = try_stream! {
            let descriptors = registry.descriptors(config.allowed_tools.as_deref());
            tracing::info!(
                session,
                tools = descriptors.len(),
                mode = ?config.permission_mode,
                max_turns = config.max_turns,
                "session started"
            );

            let mut prompt = config.prompt.clone();

            match config.hooks.evaluate_prompt(&prompt).await {
                PromptDecision::PassThrough => {}
                PromptDecision::Amend(text) => {
                    tracing::debug!(session, "prompt amended by hook");
                    prompt = text;
                }
                PromptDecision::Deny { reason } => {
                    tracing::info!(session, %reason, "prompt rejected by hook");
                    yield SessionEvent::Terminal {
                        total_turns: 0,
                        total_cost: 0.0,
                        stop_reason: StopReason::PromptRejected,
                    };
                    return;
                }
            }

            let mut transcript = Vec::new();
            if let Some(system_prompt) = &config.system_prompt {
                transcript.push(TranscriptEntry::System(system_prompt.clone()));
            }
            transcript.push(TranscriptEntry::User(prompt));

            let mut turns = TurnCounter::new(config.max_turns);
            let mut total_cost = 0.0_f64;
            let mut total_usage = ModelUsage::default();
            let mut call_seq = 0_u32;

            loop {
                if turns.exhausted() {
                    tracing::info!(
                        session,
                        turns = turns.completed(),
                        input_tokens = total_usage.input_tokens,
                        output_tokens = total_usage.output_tokens,
                        "turn budget exhausted"
                    );
                    yield SessionEvent::Terminal {
                        total_turns: turns.completed(),
                        total_cost,
                        stop_reason: StopReason::TurnBudgetExhausted,
                    };
                    return;
                }

                let turn = model
                    .decide(DecisionRequest {
                        transcript: &transcript,
                        tools: &descriptors,
                        model: config.model.as_deref(),
                    })
                    .await?;

                if let Some(usage) = &turn.usage {
                    tracing::debug!(
                        session,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "model turn usage"
                    );
                    total_usage.input_tokens =
                        total_usage.input_tokens.saturating_add(usage.input_tokens);
                    total_usage.output_tokens =
                        total_usage.output_tokens.saturating_add(usage.output_tokens);
                }
                if let Some(cost) = turn.cost {
                    total_cost += cost;
                }

                match turn.action {
                    ModelAction::Respond { text } => {
                        transcript.push(TranscriptEntry::Assistant {
                            text: Some(text.clone()),
                            call: None,
                        });
                        turns.record();
                        tracing::info!(
                            session,
                            turns = turns.completed(),
                            input_tokens = total_usage.input_tokens,
                            output_tokens = total_usage.output_tokens,
                            "session completed"
                        );

                        yield SessionEvent::Assistant { text };
                        yield SessionEvent::Terminal {
                            total_turns: turns.completed(),
                            total_cost,
                            stop_reason: StopReason::FinalAnswer,
                        };
                        return;
                    }
                    ModelAction::CallTool { tool, arguments } => {
                        call_seq += 1;
                        let call_id = format!("call_{call_seq}");
                        tracing::debug!(session, %call_id, tool = %tool, "model requested tool");

                        transcript.push(TranscriptEntry::Assistant {
                            text: None,
                            call: Some(ToolCallRecord {
                                call_id: call_id.clone(),
                                tool: tool.clone(),
                                arguments: arguments.clone(),
                            }),
                        });

                        yield SessionEvent::ToolInvocationRequest {
                            call_id: call_id.clone(),
                            tool_name: tool.clone(),
                            raw_arguments: arguments.clone(),
                        };

                        let record =
                            run_invocation(&registry, &config, &call_id, &tool, arguments).await;

                        transcript.push(TranscriptEntry::ToolResult {
                            call_id: call_id.clone(),
                            tool: tool.clone(),
                            content: record.content.transcript_text(),
                            is_error: record.is_error,
                        });
                        turns.record();

                        yield SessionEvent::ToolInvocationResult {
                            call_id,
                            tool_name: tool,
                            is_error: record.is_error,
                            content: record.content,
                        };
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Drains a session to completion and condenses it into a report.
    pub async fn complete(&self, config: SessionConfig) -> Result<SessionReport, SessionError> {
        let mut stream = self.run(config)?;

        let mut reply: Option<String> = None;
        let mut terminal: Option<(u32, f64, StopReason)> = None;

        while let Some(event) = stream.next().await {
            match event? {
                SessionEvent::Assistant { text } => reply = Some(text),
                SessionEvent::Terminal {
                    total_turns,
                    total_cost,
                    stop_reason,
                } => terminal = Some((total_turns, total_cost, stop_reason)),
                SessionEvent::ToolInvocationRequest { .. }
                | SessionEvent::ToolInvocationResult { .. } => {}
            }
        }

        let (total_turns, total_cost, stop_reason) =
            terminal.ok_or(SessionError::MissingTerminal)?;

        Ok(SessionReport {
            reply,
            total_turns,
            total_cost,
            stop_reason,
        })
    }
}

fn validate_config(config: &SessionConfig, registry: &ToolRegistry) -> Result<(), SessionError> {
    if config.prompt.trim().is_empty() {
        return Err(SessionError::InvalidConfiguration(
            "session prompt must not be empty".to_string(),
        ));
    }

    if config.max_turns == 0 {
        return Err(SessionError::InvalidConfiguration(
            "session must allow at least one turn".to_string(),
        ));
    }

    if let Some(allowed) = &config.allowed_tools {
        for name in allowed {
            if !registry.contains(name) {
                return Err(SessionError::InvalidConfiguration(format!(
                    "allowed tool '{name}' is not registered"
                )));
            }
        }
    }

    Ok(())
}

/// Carries one proposed invocation through gating, execution, and post-hooks.
///
/// Failures never escape: whatever goes wrong becomes an error record that is
/// fed back to the model as the invocation's result.
async fn run_invocation(
    registry: &ToolRegistry,
    config: &SessionConfig,
    call_id: &str,
    tool_name: &str,
    arguments: Value,
) -> InvocationRecord {
    if let Some(allowed) = &config.allowed_tools {
        if !allowed.iter().any(|name| name == tool_name) {
            return InvocationRecord::error(ToolContent::text(format!(
                "tool '{tool_name}' is not available in this session"
            )));
        }
    }

    let definition = match registry.resolve(tool_name) {
        Ok(definition) => definition,
        Err(err) => return InvocationRecord::error(ToolContent::text(err.to_string())),
    };

    let invocation = ToolInvocation {
        call_id: call_id.to_string(),
        tool: tool_name.to_string(),
        access: definition.access(),
        arguments: arguments.clone(),
    };

    let baseline = config
        .permission_mode
        .baseline(tool_name, definition.access());
    match config.hooks.evaluate_pre(&invocation, baseline).await {
        PreVerdict::Approved => {}
        PreVerdict::Denied { reason } => {
            tracing::info!(tool = tool_name, %reason, "tool invocation denied");
            return InvocationRecord::error(ToolContent::text(format!(
                "Tool invocation denied: {reason}"
            )));
        }
    }

    let started = Instant::now();
    let outcome = match config.tool_timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, registry.invoke(tool_name, arguments)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolError::Execution {
                    tool: tool_name.to_string(),
                    message: format!("timed out after {}ms", limit.as_millis()),
                }),
            }
        }
        None => registry.invoke(tool_name, arguments).await,
    };
    let elapsed = started.elapsed();

    let record = match outcome {
        Ok(content) => InvocationRecord::success(content),
        Err(err) => InvocationRecord::error(ToolContent::text(err.to_string())),
    };

    config.hooks.run_post(&invocation, &record, elapsed).await;

    record
}
