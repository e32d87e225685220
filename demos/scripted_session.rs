use std::error::Error;

use agent_harness_rs::{
    FieldSpec, InputSchema, ModelTurn, ScriptedModel, SessionConfig, SessionDriver, SessionEvent,
    ToolContent, ToolDefinition,
};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

fn add_tool() -> ToolDefinition {
    ToolDefinition::new("add", "Add two integers")
        .with_schema(
            InputSchema::new()
                .field("a", FieldSpec::integer().required())
                .field("b", FieldSpec::integer().required()),
        )
        .with_handler(|args| async move {
            let a = args.get("a").and_then(Value::as_i64).unwrap_or_default();
            let b = args.get("b").and_then(Value::as_i64).unwrap_or_default();
            Ok(ToolContent::text((a + b).to_string()))
        })
}

fn build_driver(turns: Vec<ModelTurn>) -> SessionDriver {
    SessionDriver::builder()
        .model(ScriptedModel::new(turns))
        .tool(add_tool())
        .build()
        .expect("driver builds")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let report_driver = build_driver(vec![
        ModelTurn::call_tool("add", json!({"a": 2, "b": 3})),
        ModelTurn::respond("2 + 3 = 5"),
    ]);
    let report = report_driver
        .complete(SessionConfig::new("What is 2 + 3?"))
        .await?;
    println!("complete reply: {}", report.reply.unwrap_or_default());

    let stream_driver = build_driver(vec![
        ModelTurn::call_tool("add", json!({"a": 10, "b": 7})),
        ModelTurn::respond("10 + 7 = 17"),
    ]);
    let mut stream = stream_driver.run(SessionConfig::new("What is 10 + 7?"))?;
    while let Some(event) = stream.next().await {
        match event? {
            SessionEvent::Assistant { text } => println!("assistant: {text}"),
            SessionEvent::ToolInvocationRequest {
                call_id,
                tool_name,
                raw_arguments,
            } => println!("tool call [{call_id}] {tool_name}: {raw_arguments}"),
            SessionEvent::ToolInvocationResult {
                call_id,
                tool_name,
                is_error,
                content,
            } => println!(
                "tool result [{call_id}] {tool_name}: {} (error={is_error})",
                content.transcript_text()
            ),
            SessionEvent::Terminal {
                total_turns,
                total_cost,
                stop_reason,
            } => println!("terminal: turns={total_turns} cost={total_cost} reason={stop_reason:?}"),
        }
    }

    Ok(())
}
