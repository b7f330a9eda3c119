use crate::config::GeneratorConfig;
use crate::error::{GenerationError, GenerationResult};
use crate::model_client::{InvocationOptions, Message, ModelClient, TextStream};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
    allowed_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Claude Messages API client.
pub struct AnthropicService {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    thinking_budget: u32,
}

impl AnthropicService {
    pub fn new(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_output_tokens,
            thinking_budget: config.thinking_budget_tokens,
        })
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        options: &InvocationOptions,
        stream: bool,
    ) -> AnthropicRequest<'a> {
        let thinking = options.extended_thinking.then(|| ThinkingConfig {
            kind: "enabled",
            budget_tokens: self.thinking_budget,
        });

        let tools = options
            .web_search
            .iter()
            .map(|tool| ToolDefinition {
                kind: WEB_SEARCH_TOOL_TYPE,
                name: "web_search",
                max_uses: tool.max_uses,
                allowed_domains: tool.allowed_domains.clone(),
            })
            .collect();

        AnthropicRequest {
            model: &self.model,
            // the thinking budget is carved out of max_tokens
            max_tokens: if thinking.is_some() {
                self.max_tokens.max(self.thinking_budget.saturating_add(1024))
            } else {
                self.max_tokens
            },
            messages,
            // extended thinking only accepts the default temperature
            temperature: if thinking.is_some() { None } else { Some(0.7) },
            thinking,
            tools,
            stream,
        }
    }

    async fn send(&self, request: &AnthropicRequest<'_>) -> GenerationResult<Response> {
        log::debug!(
            "Calling {} (stream={}, tools={}, thinking={})",
            self.model,
            request.stream,
            request.tools.len(),
            request.thinking.is_some()
        );

        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        log::warn!("Anthropic API error ({}): {}", status, body);

        Err(status_error(status, retry_after, body))
    }
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: String) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Configuration(
            "model provider rejected the configured API key".to_string(),
        ),
        _ => GenerationError::Provider {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl ModelClient for AnthropicService {
    async fn invoke(&self, messages: &[Message], options: &InvocationOptions) -> GenerationResult<String> {
        let request = self.build_request(messages, options, false);
        let response: AnthropicResponse = self.send(&request).await?.json().await?;

        Ok(response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn stream(&self, messages: &[Message], options: &InvocationOptions) -> GenerationResult<TextStream> {
        let request = self.build_request(messages, options, true);
        let response = self.send(&request).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(decode_event_stream(bytes))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Incremental decoder for the Messages API server-sent-event stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the text deltas and errors completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<GenerationResult<String>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = parse_line(&String::from_utf8_lossy(&line)) {
                out.push(item);
            }
        }
        out
    }

    pub fn finish(&mut self) -> Vec<GenerationResult<String>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<GenerationResult<String>> {
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(_) => {
            log::debug!("Skipping non-JSON stream line");
            return None;
        }
    };

    match event["type"].as_str()? {
        "content_block_delta" if event["delta"]["type"] == "text_delta" => event["delta"]["text"]
            .as_str()
            .filter(|text| !text.is_empty())
            .map(|text| Ok(text.to_string())),
        "error" => {
            let message = event["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string();
            let status = match event["error"]["type"].as_str() {
                Some("overloaded_error") => 529,
                Some("rate_limit_error") => return Some(Err(GenerationError::RateLimited { retry_after: None })),
                _ => 500,
            };
            Some(Err(GenerationError::Provider { status, message }))
        }
        _ => None,
    }
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<GenerationResult<String>>,
    done: bool,
}

fn decode_event_stream(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> TextStream {
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.done = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let items = state.decoder.feed(&chunk);
                    state.pending.extend(items);
                }
                Some(Err(err)) => {
                    state.done = true;
                    state.pending.push_back(Err(err.into()));
                }
                None => {
                    state.done = true;
                    let items = state.decoder.finish();
                    state.pending.extend(items);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::WebSearchTool;

    fn service() -> AnthropicService {
        let config = GeneratorConfig::from_lookup(|key| match key {
            "ANTHROPIC_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap();
        AnthropicService::new(&config).unwrap()
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let config = GeneratorConfig::from_lookup(|_| None).unwrap();
        assert!(AnthropicService::new(&config).is_err());
    }

    #[test]
    fn test_request_binds_web_search_only_in_research_mode() {
        let service = service();
        let messages = vec![Message::user("hi")];

        let plain = serde_json::to_value(service.build_request(&messages, &InvocationOptions::default(), false)).unwrap();
        assert!(plain.get("tools").is_none());
        assert!(plain.get("thinking").is_none());
        assert_eq!(plain["messages"][0]["role"], "user");

        let options = InvocationOptions {
            extended_thinking: true,
            web_search: Some(WebSearchTool {
                allowed_domains: vec!["developer.mozilla.org".to_string()],
                max_uses: 3,
            }),
        };
        let research = serde_json::to_value(service.build_request(&messages, &options, true)).unwrap();
        assert_eq!(research["tools"][0]["type"], WEB_SEARCH_TOOL_TYPE);
        assert_eq!(research["tools"][0]["allowed_domains"][0], "developer.mozilla.org");
        assert_eq!(research["thinking"]["type"], "enabled");
        assert!(research.get("temperature").is_none());
        assert_eq!(research["stream"], true);
    }

    #[test]
    fn test_huge_thinking_budget_saturates() {
        let config = GeneratorConfig::from_lookup(|key| match key {
            "ANTHROPIC_API_KEY" => Some("sk-test".to_string()),
            "THINKING_BUDGET_TOKENS" => Some(u32::MAX.to_string()),
            _ => None,
        })
        .unwrap();
        let service = AnthropicService::new(&config).unwrap();
        let messages = vec![Message::user("hi")];
        let options = InvocationOptions {
            extended_thinking: true,
            web_search: None,
        };

        let body = serde_json::to_value(service.build_request(&messages, &options, false)).unwrap();
        assert_eq!(body["max_tokens"], u32::MAX);
        assert_eq!(body["thinking"]["budget_tokens"], u32::MAX);
    }

    #[test]
    fn test_decoder_joins_split_chunks() {
        let mut decoder = SseDecoder::default();
        let event = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"<Module>é\"}}\n\n";
        let (first, second) = event.as_bytes().split_at(70);

        assert!(decoder.feed(first).is_empty());
        let items = decoder.feed(second);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "<Module>é");
    }

    #[test]
    fn test_decoder_skips_thinking_and_reports_errors() {
        let mut decoder = SseDecoder::default();
        let body = concat!(
            "data: {\"type\":\"message_start\",\"message\":{}}\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n",
        );
        let items = decoder.feed(body.as_bytes());

        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(GenerationError::Provider { status, message }) => {
                assert_eq!(*status, 529);
                assert_eq!(message, "Overloaded");
            }
            other => panic!("unexpected item: {:?}", other),
        }
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), String::new()),
            GenerationError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, String::new()),
            GenerationError::Configuration(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, None, "upstream".to_string()),
            GenerationError::Provider { status: 502, .. }
        ));
    }
}
