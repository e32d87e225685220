use std::error::Error;

use agent_harness_rs::{
    FieldSpec, HookDecision, HookSet, InputSchema, ModelTurn, PermissionMode, ScriptedModel,
    SessionConfig, SessionDriver, SessionEvent, ToolAccess, ToolContent, ToolDefinition,
    post_tool_fn, pre_tool_fn,
};
use futures_util::StreamExt;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn cleanup_tool() -> ToolDefinition {
    ToolDefinition::new("cleanup", "Remove a scratch file")
        .with_schema(InputSchema::new().field("path", FieldSpec::string().required()))
        .with_access(ToolAccess::Execute)
        .with_handler(|args| async move {
            let path = args
                .get("path")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            Ok(ToolContent::text(format!("removed {path}")))
        })
}

fn build_driver() -> SessionDriver {
    let model = ScriptedModel::new(vec![
        ModelTurn::call_tool("cleanup", json!({"path": "/tmp/scratch.txt"})),
        ModelTurn::respond("The scratch file is gone."),
    ]);
    SessionDriver::builder()
        .model(model)
        .tool(cleanup_tool())
        .build()
        .expect("driver builds")
}

async fn run_session(
    label: &str,
    driver: SessionDriver,
    config: SessionConfig,
) -> Result<(), Box<dyn Error>> {
    println!("--- {label} ---");
    let mut stream = driver.run(config)?;
    while let Some(event) = stream.next().await {
        match event? {
            SessionEvent::Assistant { text } => println!("assistant: {text}"),
            SessionEvent::ToolInvocationRequest {
                tool_name,
                raw_arguments,
                ..
            } => println!("tool call {tool_name}: {raw_arguments}"),
            SessionEvent::ToolInvocationResult {
                tool_name,
                is_error,
                content,
                ..
            } => println!(
                "tool result {tool_name}: {} (error={is_error})",
                content.transcript_text()
            ),
            SessionEvent::Terminal {
                total_turns,
                stop_reason,
                ..
            } => println!("terminal: turns={total_turns} reason={stop_reason:?}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Execute-class tools need an approval in default mode, and no hook
    // grants one here.
    run_session(
        "default mode, no hooks",
        build_driver(),
        SessionConfig::new("clean up the scratch file"),
    )
    .await?;

    // An approval hook that only lets the tool touch /tmp, plus an audit
    // hook that reports what ran.
    let hooks = HookSet::new()
        .on_pre_tool_use(pre_tool_fn(|invocation| {
            let path = invocation
                .arguments
                .get("path")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            if path.starts_with("/tmp/") {
                HookDecision::Approve
            } else {
                HookDecision::Deny {
                    reason: format!("refusing to touch {path}"),
                }
            }
        }))
        .on_post_tool_use(post_tool_fn(|invocation, record, elapsed| {
            println!(
                "audit: {} finished in {elapsed:?} (error={})",
                invocation.tool, record.is_error
            );
        }));
    run_session(
        "default mode, scoped approval hook",
        build_driver(),
        SessionConfig::new("clean up the scratch file").with_hooks(hooks),
    )
    .await?;

    // Plan mode refuses mutating tools outright, approval hooks or not.
    run_session(
        "plan mode",
        build_driver(),
        SessionConfig::new("clean up the scratch file")
            .with_permission_mode(PermissionMode::Plan),
    )
    .await?;

    Ok(())
}
