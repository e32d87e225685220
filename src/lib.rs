//! Local harness for tool-using model sessions.
//!
//! v0 surface:
//! - `SessionDriver` event loop with per-call permission gating
//! - `ToolRegistry` + typed argument schemas that report every violation
//! - Hook pipeline over prompts and tool invocations (approve, deny, amend)
//! - `ScriptedModel` for offline runs, `RemoteModel` for chat-completions APIs

pub mod error;
pub mod hooks;
pub mod model;
pub mod session;
pub mod tools;

pub use error::{
    FieldViolation, HookError, SchemaViolation, SessionError, ToolError, TransportError,
};
pub use hooks::{
    ApprovalBaseline, HookDecision, HookSet, InvocationRecord, PostToolHook, PreToolHook,
    PreVerdict, PromptDecision, PromptHook, ToolInvocation, post_tool_fn, pre_tool_fn, prompt_fn,
};
pub use model::{
    AgentModel, DecisionRequest, ModelAction, ModelTurn, ModelUsage, RemoteModel,
    RemoteModelConfig, ScriptedModel, ToolCallRecord, ToolDescriptor, TranscriptEntry,
};
pub use session::{
    PermissionMode, SessionConfig, SessionDriver, SessionDriverBuilder, SessionEvent,
    SessionReport, SessionStream, StopReason, TurnCounter,
};
pub use tools::{
    ContentBlock, FieldSpec, FieldType, InputSchema, ToolAccess, ToolContent, ToolDefinition,
    ToolRegistry,
};
