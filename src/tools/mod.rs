pub mod schema;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::model::ToolDescriptor;

pub use schema::{FieldSpec, FieldType, InputSchema};

/// What a tool touches, used by permission modes to pick a baseline verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolAccess {
    #[default]
    ReadOnly,
    Edit,
    Execute,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Json { value: Value },
}

/// Payload a tool handler returns, kept as tagged blocks so callers never
/// have to special-case string versus structured output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolContent {
    blocks: Vec<ContentBlock>,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            blocks: vec![ContentBlock::Json { value }],
        }
    }

    pub fn from_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Flat rendering fed back into the conversation transcript.
    pub fn transcript_text(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Json { value } => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type ToolHandler =
    dyn Fn(Value) -> BoxFuture<'static, Result<ToolContent, ToolError>> + Send + Sync;

#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    schema: InputSchema,
    access: ToolAccess,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .field("access", &self.access)
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let handler_name = name.clone();
        Self {
            name,
            description: description.into(),
            schema: InputSchema::new(),
            access: ToolAccess::ReadOnly,
            handler: Arc::new(move |_args| {
                let tool = handler_name.clone();
                Box::pin(async move {
                    Err(ToolError::Execution {
                        tool,
                        message: "tool handler not configured".to_string(),
                    })
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_access(mut self, access: ToolAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolContent, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args| Box::pin(handler(args)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    pub fn access(&self) -> ToolAccess {
        self.access
    }
}

/// Closed set of tools a session may dispatch into. Registration happens
/// before the registry is shared; afterwards it is read-only.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolDefinition) -> Result<(), ToolError> {
        if tool.name().trim().is_empty() {
            return Err(ToolError::InvalidDefinition(
                "tool name must not be empty".to_string(),
            ));
        }
        if tool.description().trim().is_empty() {
            return Err(ToolError::InvalidDefinition(format!(
                "tool '{}' must carry a description",
                tool.name()
            )));
        }
        if self.index.contains_key(tool.name()) {
            return Err(ToolError::DuplicateName(tool.name().to_string()));
        }

        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDefinition, ToolError> {
        self.index
            .get(name)
            .map(|idx| &self.tools[*idx])
            .ok_or_else(|| ToolError::Unknown(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn validate(&self, name: &str, args: &Value) -> Result<(), ToolError> {
        let tool = self.resolve(name)?;
        tool.schema.validate(name, args)?;
        Ok(())
    }

    /// Wire-shaped descriptors for the tools a session exposes to the model,
    /// in registration order. `None` exposes everything.
    pub fn descriptors(&self, allowed: Option<&[String]>) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .filter(|tool| {
                allowed.is_none_or(|allowed| allowed.iter().any(|name| name == tool.name()))
            })
            .map(|tool| ToolDescriptor {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.schema.to_json_value(),
            })
            .collect()
    }

    /// Validates, then runs the handler. Handler failures come back as
    /// [`ToolError`] values for the session layer to convert into
    /// error-content results.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolContent, ToolError> {
        let tool = self.resolve(name)?;
        tool.schema.validate(name, &args)?;
        tracing::debug!(tool = name, "invoking tool handler");
        (tool.handler)(args).await
    }
}
