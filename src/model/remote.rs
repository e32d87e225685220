use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::TransportError;
use crate::model::{
    AgentModel, DecisionRequest, ModelAction, ModelTurn, ModelUsage, TranscriptEntry,
};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const EMPTY_USER_CONTENT_FALLBACK: &str = " ";

#[derive(Debug, Clone)]
pub struct RemoteModelConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl RemoteModelConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base_url: None,
            temperature: None,
            top_p: None,
            max_tokens: Some(4096),
        }
    }
}

/// Backend speaking the OpenAI-compatible chat-completions protocol.
/// Point `api_base_url` at any compatible provider.
#[derive(Debug, Clone)]
pub struct RemoteModel {
    client: Client,
    config: RemoteModelConfig,
}

impl RemoteModel {
    pub fn new(config: RemoteModelConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, TransportError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| TransportError::Request("OPENAI_API_KEY is not set".to_string()))?;

        let mut config = RemoteModelConfig::new(api_key, model);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.is_empty() {
                config.api_base_url = Some(base_url);
            }
        }

        Self::new(config)
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl AgentModel for RemoteModel {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<ModelTurn, TransportError> {
        let payload = build_request(&request, &self.config);

        let response = self
            .client
            .post(self.endpoint())
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Request(extract_api_error(response).await));
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|err| TransportError::Response(err.to_string()))?;

        normalize_response(completion)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatRequestMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ChatToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ChatToolDefinition {
    #[serde(rename = "type")]
    type_: String,
    function: ChatToolFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct ChatToolFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    function: ChatToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatAssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatAssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    // Some compatible providers report the step's cost alongside token
    // counts; passed through opaquely when present.
    cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorEnvelope {
    error: ChatApiError,
}

#[derive(Debug, Deserialize)]
struct ChatApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<Value>,
}

fn build_request(
    request: &DecisionRequest<'_>,
    config: &RemoteModelConfig,
) -> ChatCompletionRequest {
    let messages = ensure_non_empty_messages(to_wire_messages(request.transcript));

    let tools_payload = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| ChatToolDefinition {
                    type_: "function".to_string(),
                    function: ChatToolFunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    },
                })
                .collect::<Vec<_>>(),
        )
    };

    let tool_choice = if request.tools.is_empty() {
        None
    } else {
        Some("auto".to_string())
    };

    ChatCompletionRequest {
        model: request.model.unwrap_or(&config.model).to_string(),
        messages,
        tools: tools_payload,
        tool_choice,
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_tokens,
    }
}

fn to_wire_messages(transcript: &[TranscriptEntry]) -> Vec<ChatRequestMessage> {
    let mut messages = Vec::new();

    for entry in transcript {
        match entry {
            TranscriptEntry::System(content) => {
                if content.is_empty() {
                    continue;
                }
                messages.push(ChatRequestMessage::System {
                    content: content.clone(),
                });
            }
            TranscriptEntry::User(content) => {
                if content.is_empty() {
                    continue;
                }
                messages.push(ChatRequestMessage::User {
                    content: content.clone(),
                });
            }
            TranscriptEntry::Assistant { text, call } => {
                let serialized_call = call.as_ref().map(|call| ChatToolCall {
                    id: call.call_id.clone(),
                    type_: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: call.tool.clone(),
                        arguments: call.arguments.to_string(),
                    },
                });

                let content = text.as_ref().filter(|text| !text.is_empty()).cloned();
                if content.is_none() && serialized_call.is_none() {
                    continue;
                }

                messages.push(ChatRequestMessage::Assistant {
                    content,
                    tool_calls: serialized_call.map(|call| vec![call]),
                });
            }
            TranscriptEntry::ToolResult {
                call_id,
                tool: _,
                content,
                is_error,
            } => {
                let rendered = if *is_error {
                    format!("Error: {content}")
                } else {
                    content.clone()
                };

                messages.push(ChatRequestMessage::Tool {
                    tool_call_id: call_id.clone(),
                    content: rendered,
                });
            }
        }
    }

    messages
}

fn ensure_non_empty_messages(mut messages: Vec<ChatRequestMessage>) -> Vec<ChatRequestMessage> {
    if messages.is_empty() {
        messages.push(ChatRequestMessage::User {
            content: EMPTY_USER_CONTENT_FALLBACK.to_string(),
        });
    }

    messages
}

fn normalize_response(response: ChatCompletionResponse) -> Result<ModelTurn, TransportError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        TransportError::Response("chat completion missing choices".to_string())
    })?;

    let message = choice.message.ok_or_else(|| {
        TransportError::Response("chat completion missing choice message".to_string())
    })?;

    // The session transport runs one invocation per turn; only the first
    // tool call in a completion is honored.
    let action = match message.tool_calls.into_iter().next() {
        Some(call) => {
            let arguments = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(&call.function.arguments).map_err(|err| {
                    TransportError::Response(format!(
                        "tool call arguments for '{}' are not valid JSON: {err}",
                        call.function.name
                    ))
                })?
            };
            ModelAction::CallTool {
                tool: call.function.name,
                arguments,
            }
        }
        None => ModelAction::Respond {
            text: message.content.unwrap_or_default(),
        },
    };

    let usage = response.usage.as_ref().map(|usage| ModelUsage {
        input_tokens: usage.prompt_tokens.unwrap_or(0),
        output_tokens: usage.completion_tokens.unwrap_or(0),
    });
    let cost = response.usage.and_then(|usage| usage.cost);

    Ok(ModelTurn { action, usage, cost })
}

async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<ChatErrorEnvelope>(&body) {
        let code = parsed
            .error
            .code
            .map(|value| match value {
                Value::String(value) => value,
                other => other.to_string(),
            })
            .unwrap_or_else(|| status.as_u16().to_string());
        let error_type = parsed
            .error
            .type_
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown api error".to_string());

        return format!("chat api error {code} {error_type}: {message}");
    }

    if body.is_empty() {
        format!("chat api request failed ({status})")
    } else {
        format!("chat api request failed ({status}): {body}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{ToolCallRecord, ToolDescriptor};

    fn lookup_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "lookup".to_string(),
            description: "Look up something".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    #[test]
    fn build_request_serializes_transcript_tools_and_override() {
        let transcript = vec![
            TranscriptEntry::System("You are helpful".to_string()),
            TranscriptEntry::User("Find docs".to_string()),
            TranscriptEntry::Assistant {
                text: Some("Calling tool".to_string()),
                call: Some(ToolCallRecord {
                    call_id: "call_1".to_string(),
                    tool: "lookup".to_string(),
                    arguments: json!({"query": "rust"}),
                }),
            },
            TranscriptEntry::ToolResult {
                call_id: "call_1".to_string(),
                tool: "lookup".to_string(),
                content: "{\"result\":\"ok\"}".to_string(),
                is_error: false,
            },
        ];

        let mut config = RemoteModelConfig::new("key", "gpt-4o-mini");
        config.temperature = Some(0.2);
        config.max_tokens = Some(512);

        let tools = [lookup_descriptor()];
        let request = build_request(
            &DecisionRequest {
                transcript: &transcript,
                tools: &tools,
                model: Some("gpt-4.1"),
            },
            &config,
        );
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(value["model"], "gpt-4.1");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "You are helpful");
        assert_eq!(value["messages"][2]["role"], "assistant");
        assert_eq!(
            value["messages"][2]["tool_calls"][0]["function"]["name"],
            "lookup"
        );
        assert_eq!(
            value["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"rust\"}"
        );
        assert_eq!(value["messages"][3]["role"], "tool");
        assert_eq!(value["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(value["tools"][0]["function"]["name"], "lookup");
        assert_eq!(value["tool_choice"], "auto");
        assert!((value["temperature"].as_f64().unwrap_or_default() - 0.2).abs() < 1e-6);
        assert_eq!(value["max_tokens"], 512);
    }

    #[test]
    fn build_request_adds_fallback_content_for_empty_transcript() {
        let config = RemoteModelConfig::new("key", "gpt-4o-mini");

        let request = build_request(
            &DecisionRequest {
                transcript: &[TranscriptEntry::User(String::new())],
                tools: &[],
                model: None,
            },
            &config,
        );
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(
            value["messages"].as_array().map(|values| values.len()),
            Some(1)
        );
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], " ");
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn normalize_response_extracts_text_usage_and_cost() {
        let response = ChatCompletionResponse {
            choices: vec![ChatChoice {
                message: Some(ChatAssistantMessage {
                    content: Some("answer".to_string()),
                    tool_calls: vec![],
                }),
            }],
            usage: Some(ChatUsage {
                prompt_tokens: Some(11),
                completion_tokens: Some(7),
                cost: Some(0.0003),
            }),
        };

        let turn = normalize_response(response).expect("normalizes");

        assert_eq!(
            turn.action,
            ModelAction::Respond {
                text: "answer".to_string()
            }
        );
        assert_eq!(
            turn.usage,
            Some(ModelUsage {
                input_tokens: 11,
                output_tokens: 7,
            })
        );
        assert_eq!(turn.cost, Some(0.0003));
    }

    #[test]
    fn normalize_response_takes_the_first_tool_call() {
        let call = |id: &str, name: &str| ChatToolCall {
            id: id.to_string(),
            type_: "function".to_string(),
            function: ChatToolCallFunction {
                name: name.to_string(),
                arguments: "{\"q\":\"rust\"}".to_string(),
            },
        };

        let response = ChatCompletionResponse {
            choices: vec![ChatChoice {
                message: Some(ChatAssistantMessage {
                    content: None,
                    tool_calls: vec![call("call_a", "lookup"), call("call_b", "other")],
                }),
            }],
            usage: None,
        };

        let turn = normalize_response(response).expect("normalizes");
        assert_eq!(
            turn.action,
            ModelAction::CallTool {
                tool: "lookup".to_string(),
                arguments: json!({"q": "rust"}),
            }
        );
    }

    #[test]
    fn normalize_response_requires_choices() {
        let err = normalize_response(ChatCompletionResponse {
            choices: Vec::new(),
            usage: None,
        })
        .expect_err("should fail");

        match err {
            TransportError::Response(message) => {
                assert!(message.contains("missing choices"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn normalize_response_fails_on_invalid_tool_arguments() {
        let err = normalize_response(ChatCompletionResponse {
            choices: vec![ChatChoice {
                message: Some(ChatAssistantMessage {
                    content: None,
                    tool_calls: vec![ChatToolCall {
                        id: "call_x".to_string(),
                        type_: "function".to_string(),
                        function: ChatToolCallFunction {
                            name: "lookup".to_string(),
                            arguments: "{not json}".to_string(),
                        },
                    }],
                }),
            }],
            usage: None,
        })
        .expect_err("should fail");

        match err {
            TransportError::Response(message) => {
                assert!(message.contains("not valid JSON"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
