//! Google Gemini provider implementation

use super::stream::sse_data_stream;
use super::types::{
    ContentBlock, LlmRequest, LlmStream, MessageRole, StreamChunk, ToolDefinition, Usage,
};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini service implementation
pub struct GeminiService {
    client: Client,
    api_key: String,
    endpoint: String,
    model_id: String,
}

impl GeminiService {
    pub fn new(api_key: String, model: &str, base_url: Option<&str>) -> Result<Self, LlmError> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let endpoint = format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse");

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model_id: model.to_string(),
        })
    }

    fn translate_request(request: &LlmRequest) -> GeminiRequest {
        let system_instruction = request.system.as_ref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: text.clone(),
                thought: None,
            }],
        });

        let mut contents: Vec<GeminiContent> = Vec::new();
        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "model",
            };

            let parts: Vec<GeminiPart> = msg.content.iter().filter_map(translate_block).collect();
            if parts.is_empty() {
                continue;
            }

            // Gemini requires alternating roles
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
                _ => contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts,
                }),
            }
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: request.tools.iter().map(translate_tool).collect(),
            }])
        };

        GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: request.max_tokens.map(|t| GeminiGenerationConfig {
                max_output_tokens: Some(t),
            }),
        }
    }

    /// Translate one SSE payload into stream chunks
    fn parse_event(data: &str) -> Result<Vec<StreamChunk>, LlmError> {
        let event: GeminiStreamEvent = serde_json::from_str(data).map_err(|e| {
            LlmError::unknown(format!("Failed to parse stream event: {e} - data: {data}"))
        })?;

        if let Some(error) = event.error {
            return Err(LlmError::server_error(format!(
                "Stream error: {}",
                error.message
            )));
        }

        let mut chunks = Vec::new();
        let mut finish = None;
        for candidate in event.candidates {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            for part in parts {
                match part {
                    GeminiPart::Text { text, thought } => {
                        if !text.is_empty() && thought != Some(true) {
                            chunks.push(StreamChunk::Text(text));
                        }
                    }
                    GeminiPart::FunctionCall { function_call } => {
                        let id = function_call
                            .id
                            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                        chunks.push(StreamChunk::ToolUse {
                            id,
                            name: function_call.name,
                            input: function_call.args,
                        });
                    }
                    GeminiPart::FunctionResponse { .. } | GeminiPart::Other(_) => {}
                }
            }
            finish = finish.or(candidate.finish_reason);
        }

        // Usage precedes Finish so consumers see final counts before the end
        if let Some(usage) = event.usage_metadata {
            chunks.push(StreamChunk::Usage(Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            }));
        }
        if let Some(reason) = finish {
            chunks.push(StreamChunk::Finish { reason });
        }

        Ok(chunks)
    }
}

fn translate_block(block: &ContentBlock) -> Option<GeminiPart> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(GeminiPart::Text {
            text: text.clone(),
            thought: None,
        }),
        ContentBlock::ToolUse { id, name, input } => Some(GeminiPart::FunctionCall {
            function_call: GeminiFunctionCall {
                id: Some(id.clone()),
                name: name.clone(),
                args: if input.is_null() { json!({}) } else { input.clone() },
            },
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            name,
            content,
            is_error,
        } => {
            let response = if *is_error {
                json!({ "error": content })
            } else {
                json!({ "result": content })
            };
            Some(GeminiPart::FunctionResponse {
                function_response: GeminiFunctionResponse {
                    id: Some(tool_use_id.clone()),
                    name: name.clone(),
                    response,
                },
            })
        }
    }
}

fn translate_tool(tool: &ToolDefinition) -> GeminiFunctionDeclaration {
    GeminiFunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.takes_arguments().then(|| tool.input_schema.clone()),
    }
}

#[async_trait]
impl LlmService for GeminiService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::auth(
                "No Gemini API key configured. Set GOOGLE_API_KEY.",
            ));
        }
        let gemini_request = Self::translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            return Err(LlmError::from_status(status, &message));
        }

        let chunks = sse_data_stream(response.bytes_stream()).flat_map(|payload| {
            let items = match payload.and_then(|data| Self::parse_event(&data)) {
                Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures::stream::iter(items)
        });

        Ok(Box::pin(chunks))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought: Option<bool>,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamEvent {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
