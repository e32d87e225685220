use std::error::Error;

use agent_harness_rs::{
    FieldSpec, InputSchema, ModelTurn, ScriptedModel, SessionConfig, SessionDriver, SessionEvent,
    ToolContent, ToolDefinition,
};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

fn quote_tool() -> ToolDefinition {
    ToolDefinition::new("quote_premium", "Quote a monthly car insurance premium")
        .with_schema(
            InputSchema::new()
                .field(
                    "age",
                    FieldSpec::integer()
                        .describe("Driver age in years")
                        .required()
                        .minimum(16.0)
                        .maximum(100.0),
                )
                .field(
                    "vehicle",
                    FieldSpec::string()
                        .describe("Vehicle make and model")
                        .required()
                        .min_length(2),
                )
                .field(
                    "coverage",
                    FieldSpec::string()
                        .describe("Coverage tier")
                        .required()
                        .one_of(vec![json!("basic"), json!("full")]),
                ),
        )
        .with_handler(|args| async move {
            let age = args.get("age").and_then(Value::as_i64).unwrap_or(30);
            let vehicle = args
                .get("vehicle")
                .and_then(Value::as_str)
                .unwrap_or("car")
                .to_string();
            let coverage = args
                .get("coverage")
                .and_then(Value::as_str)
                .unwrap_or("basic")
                .to_string();

            let mut premium = 55.0;
            if age < 25 {
                premium += 40.0;
            }
            if coverage == "full" {
                premium *= 1.6;
            }

            Ok(ToolContent::json(json!({
                "vehicle": vehicle,
                "coverage": coverage,
                "monthly_premium": (premium * 100.0_f64).round() / 100.0,
            })))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // The first call uses a coverage tier the schema rejects; the violation
    // is fed back and the second call corrects it.
    let model = ScriptedModel::new(vec![
        ModelTurn::call_tool(
            "quote_premium",
            json!({"age": 22, "vehicle": "mazda mx5", "coverage": "premium"}),
        )
        .with_cost(0.0011),
        ModelTurn::call_tool(
            "quote_premium",
            json!({"age": 22, "vehicle": "mazda mx5", "coverage": "full"}),
        )
        .with_cost(0.0012),
        ModelTurn::respond("Full coverage for the MX-5 comes to $152 a month.").with_cost(0.0009),
    ]);

    let driver = SessionDriver::builder()
        .model(model)
        .tool(quote_tool())
        .build()?;

    let config = SessionConfig::new("Quote full coverage for a 22 year old driving an MX-5")
        .with_system_prompt("You are an insurance quoting assistant.")
        .with_max_turns(6);

    let mut stream = driver.run(config)?;
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
