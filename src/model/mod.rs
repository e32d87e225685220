mod remote;
mod scripted;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

pub use remote::{RemoteModel, RemoteModelConfig};
pub use scripted::ScriptedModel;

/// Conversation history handed to the model, oldest entry first.
#[derive(Clone, Debug, PartialEq)]
pub enum TranscriptEntry {
    System(String),
    User(String),
    Assistant {
        text: Option<String>,
        call: Option<ToolCallRecord>,
    },
    ToolResult {
        call_id: String,
        tool: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool: String,
    pub arguments: Value,
}

/// Wire-shaped description of one allowed tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelAction {
    Respond { text: String },
    CallTool { tool: String, arguments: Value },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One model decision: answer in natural language or request a tool call,
/// plus whatever usage and cost the backend reports for the step.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelTurn {
    pub action: ModelAction,
    pub usage: Option<ModelUsage>,
    pub cost: Option<f64>,
}

impl ModelTurn {
    pub fn respond(text: impl Into<String>) -> Self {
        Self {
            action: ModelAction::Respond { text: text.into() },
            usage: None,
            cost: None,
        }
    }

    pub fn call_tool(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            action: ModelAction::CallTool {
                tool: tool.into(),
                arguments,
            },
            usage: None,
            cost: None,
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some(ModelUsage {
            input_tokens,
            output_tokens,
        });
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Everything a backend sees for one thinking step.
#[derive(Clone, Debug)]
pub struct DecisionRequest<'a> {
    pub transcript: &'a [TranscriptEntry],
    pub tools: &'a [ToolDescriptor],
    pub model: Option<&'a str>,
}

/// Seam for the external model decision process. The session transport
/// treats it as an opaque function from conversation state to the next
/// [`ModelTurn`].
#[async_trait]
pub trait AgentModel: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<ModelTurn, TransportError>;
}
