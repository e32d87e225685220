use thiserror::Error;

/// One failed constraint on one argument field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Schema check failure carrying every failing field, not just the first.
#[derive(Debug, Error)]
#[error("invalid arguments for {tool}: {}", list_violations(.violations))]
pub struct SchemaViolation {
    pub tool: String,
    pub violations: Vec<FieldViolation>,
}

fn list_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("duplicate tool registered: {0}")]
    DuplicateName(String),
    #[error("invalid tool definition: {0}")]
    InvalidDefinition(String),
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error("tool execution failed for {tool}: {message}")]
    Execution { tool: String, message: String },
}

/// Raised by a hook itself, not by the tool it gates. The approval fold
/// treats it as a denial.
#[derive(Debug, Error)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("model transport request failed: {0}")]
    Request(String),
    #[error("model transport response invalid: {0}")]
    Response(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session stream ended without a terminal event")]
    MissingTerminal,
}
