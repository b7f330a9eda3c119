use crate::config::GeneratorConfig;
use crate::error::{GenerationError, GenerationResult};
use crate::model_client::{InvocationOptions, Message, ModelClient, WebSearchTool};
use crate::models::{DocumentKind, GenerationAttempt, GenerationRequest, TerminalResult};
use crate::prompt_builder::PromptBuilder;
use crate::validator::SchemaValidator;
use crate::xml_extractor::extract_root_element;
use futures::StreamExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// Capacity of the per-run event channel. A slow consumer applies backpressure to the run.
pub const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Forward model output to the caller chunk by chunk.
    Streaming,
    /// Wait for the whole model response.
    Blocking,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub max_retries: u32,
    pub timeout: Duration,
    pub research_timeout: Duration,
    pub web_search: WebSearchTool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            research_timeout: Duration::from_secs(crate::config::DEFAULT_RESEARCH_TIMEOUT_SECS),
            web_search: WebSearchTool {
                allowed_domains: crate::config::DEFAULT_RESEARCH_DOMAINS
                    .iter()
                    .map(|d| d.to_string())
                    .collect(),
                max_uses: 5,
            },
        }
    }
}

impl From<&GeneratorConfig> for GenerationSettings {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: config.generation_timeout,
            research_timeout: config.research_timeout,
            web_search: config.web_search_tool(),
        }
    }
}

/// Why an attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Extraction,
    Validation,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Extraction => "extraction",
            FailureCategory::Validation => "validation",
        }
    }
}

/// Lifecycle events of one run, in the order the caller receives them.
///
/// Serialized with a `type` discriminator so each event can be written
/// directly as an SSE `data:` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GenerationEvent {
    Connected {
        message: String,
    },
    Progress {
        message: String,
        attempt: u32,
    },
    Content {
        chunk: String,
    },
    ValidationStarted {
        message: String,
        attempt: u32,
    },
    ValidationSuccess {
        message: String,
        attempt: u32,
        warnings: Vec<String>,
    },
    ValidationFailed {
        message: String,
        attempt: u32,
        category: FailureCategory,
        errors: Vec<String>,
        warnings: Vec<String>,
        retryable: bool,
    },
    Complete {
        message: String,
        content: String,
        xml_content: Option<String>,
        attempts: u32,
        warnings: Vec<String>,
    },
    Error {
        message: String,
        category: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        xml_content: Option<String>,
        errors: Vec<String>,
        warnings: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts: Option<u32>,
    },
}

impl GenerationEvent {
    /// True for the event that ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationEvent::Complete { .. } | GenerationEvent::Error { .. })
    }
}

/// A run started with [`Generator::spawn`].
pub struct GenerationRun {
    pub events: mpsc::Receiver<GenerationEvent>,
    pub outcome: JoinHandle<GenerationResult<TerminalResult>>,
}

impl GenerationRun {
    /// Event stream for SSE delivery. Dropping the stream cancels the run.
    pub fn into_event_stream(self) -> ReceiverStream<GenerationEvent> {
        ReceiverStream::new(self.events)
    }

    /// Drain events and wait for the final result.
    pub async fn finish(mut self) -> GenerationResult<TerminalResult> {
        while self.events.recv().await.is_some() {}
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(err) => Err(GenerationError::Internal(format!(
                "generation task failed: {}",
                err
            ))),
        }
    }
}

/// Drives prompt construction, model invocation, extraction and validation
/// through a bounded number of attempts.
pub struct Generator {
    client: Arc<dyn ModelClient>,
    settings: GenerationSettings,
    kind: DocumentKind,
    prompts: PromptBuilder,
    validator: SchemaValidator,
}

impl Generator {
    pub fn new(client: Arc<dyn ModelClient>, settings: GenerationSettings) -> Self {
        Self::for_kind(client, settings, DocumentKind::Module)
    }

    pub fn for_kind(client: Arc<dyn ModelClient>, settings: GenerationSettings, kind: DocumentKind) -> Self {
        Self {
            client,
            settings,
            kind,
            prompts: PromptBuilder::new(kind),
            validator: SchemaValidator::new(kind),
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Run in a background task, returning the event receiver and the task handle.
    pub fn spawn(self: &Arc<Self>, request: GenerationRequest, mode: InvocationMode) -> GenerationRun {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let generator = Arc::clone(self);
        let outcome = tokio::spawn(async move { generator.run(&request, mode, &tx).await });
        GenerationRun { events: rx, outcome }
    }

    /// Execute one run to completion, reporting progress on `events`.
    ///
    /// Exactly one terminal event is sent unless the receiver has gone away.
    /// A closed receiver cancels the run at the next event or while waiting
    /// on the model.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        mode: InvocationMode,
        events: &mpsc::Sender<GenerationEvent>,
    ) -> GenerationResult<TerminalResult> {
        let run_id = Uuid::new_v4();
        info!(
            "[{}] Generation started: model={}, research={}, thinking={}, mode={:?}",
            run_id,
            self.model_name(),
            request.enable_research,
            request.use_extended_thinking,
            mode
        );

        emit(
            events,
            GenerationEvent::Connected {
                message: "Connected to generation service".to_string(),
            },
        )
        .await?;

        let outcome = self.attempt_loop(request, mode, events, run_id).await;
        if matches!(outcome, Err(GenerationError::Cancelled)) {
            info!("[{}] Client disconnected, generation abandoned", run_id);
            return outcome;
        }

        let terminal = match &outcome {
            Ok(result) if result.success => {
                info!("[{}] Generation succeeded after {} attempt(s)", run_id, result.attempts);
                GenerationEvent::Complete {
                    message: format!("Generation complete after {} attempt(s)", result.attempts),
                    content: result.content.clone(),
                    xml_content: result.xml_content.clone(),
                    attempts: result.attempts,
                    warnings: result.validation_warnings.clone(),
                }
            }
            Ok(result) => {
                warn!(
                    "[{}] Generation failed after {} attempt(s) with {} error(s)",
                    run_id,
                    result.attempts,
                    result.validation_errors.len()
                );
                let category = if result.extraction_failed {
                    FailureCategory::Extraction
                } else {
                    FailureCategory::Validation
                };
                GenerationEvent::Error {
                    message: format!(
                        "Generated content failed validation after {} attempt(s)",
                        result.attempts
                    ),
                    category: category.as_str().to_string(),
                    content: Some(result.content.clone()),
                    xml_content: result.xml_content.clone(),
                    errors: result.validation_errors.clone(),
                    warnings: result.validation_warnings.clone(),
                    attempts: Some(result.attempts),
                }
            }
            Err(err) => {
                error!("[{}] Generation aborted: {}", run_id, err);
                GenerationEvent::Error {
                    message: err.to_string(),
                    category: err.kind().to_string(),
                    content: None,
                    xml_content: None,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    attempts: None,
                }
            }
        };

        if events.send(terminal).await.is_err() {
            debug!("[{}] Receiver closed before the terminal event", run_id);
        }
        outcome
    }

    async fn attempt_loop(
        &self,
        request: &GenerationRequest,
        mode: InvocationMode,
        events: &mpsc::Sender<GenerationEvent>,
        run_id: Uuid,
    ) -> GenerationResult<TerminalResult> {
        let root = self.kind.root_tag();
        let max_attempts = self.settings.max_retries.max(1);
        let mut feedback: Vec<String> = Vec::new();

        for attempt_number in 1..=max_attempts {
            let mut attempt = GenerationAttempt::new(attempt_number, std::mem::take(&mut feedback));
            let last = attempt_number == max_attempts;

            let prompt = self.prompts.build(request, Some(attempt.prior_errors.as_slice()));
            debug!(
                "[{}] Attempt {}/{}: prompt of {} chars, {} prior error(s)",
                run_id,
                attempt_number,
                max_attempts,
                prompt.len(),
                attempt.prior_errors.len()
            );

            let message = if attempt_number == 1 {
                format!("Generating {}...", root.to_lowercase())
            } else {
                format!(
                    "Retrying generation (attempt {}/{}) with validation feedback...",
                    attempt_number, max_attempts
                )
            };
            emit(
                events,
                GenerationEvent::Progress {
                    message,
                    attempt: attempt_number,
                },
            )
            .await?;

            attempt.raw_output = self.call_model(&prompt, request, mode, events).await?;
            attempt.extracted_xml = extract_root_element(&attempt.raw_output, root);

            let xml = match attempt.extracted_xml.clone() {
                Some(xml) => xml,
                None => {
                    let error = format!(
                        "Response did not contain a complete <{root}>...</{root}> element. Respond with the XML document only.",
                        root = root
                    );
                    warn!("[{}] Attempt {}: no <{}> element in model output", run_id, attempt_number, root);
                    emit(
                        events,
                        GenerationEvent::ValidationFailed {
                            message: format!("Could not extract <{}> from the response", root),
                            attempt: attempt_number,
                            category: FailureCategory::Extraction,
                            errors: vec![error.clone()],
                            warnings: Vec::new(),
                            retryable: !last,
                        },
                    )
                    .await?;

                    if last {
                        return Ok(TerminalResult {
                            success: false,
                            content: attempt.raw_output,
                            xml_content: None,
                            validation_errors: vec![error],
                            validation_warnings: Vec::new(),
                            attempts: attempt_number,
                            extraction_failed: true,
                        });
                    }
                    feedback = vec![error];
                    continue;
                }
            };

            emit(
                events,
                GenerationEvent::ValidationStarted {
                    message: "Validating generated XML...".to_string(),
                    attempt: attempt_number,
                },
            )
            .await?;

            let validation = self.validator.validate(&xml);
            let valid = validation.is_valid();
            let (errors, warnings) = validation.into_parts();

            if valid {
                emit(
                    events,
                    GenerationEvent::ValidationSuccess {
                        message: "Generated XML passed validation".to_string(),
                        attempt: attempt_number,
                        warnings: warnings.clone(),
                    },
                )
                .await?;
                return Ok(TerminalResult {
                    success: true,
                    content: attempt.raw_output,
                    xml_content: Some(xml),
                    validation_errors: Vec::new(),
                    validation_warnings: warnings,
                    attempts: attempt_number,
                    extraction_failed: false,
                });
            }

            warn!(
                "[{}] Attempt {}: {} validation error(s)",
                run_id,
                attempt_number,
                errors.len()
            );
            emit(
                events,
                GenerationEvent::ValidationFailed {
                    message: format!("Validation failed with {} error(s)", errors.len()),
                    attempt: attempt_number,
                    category: FailureCategory::Validation,
                    errors: errors.clone(),
                    warnings: warnings.clone(),
                    retryable: !last,
                },
            )
            .await?;

            if last {
                return Ok(TerminalResult {
                    success: false,
                    content: attempt.raw_output,
                    xml_content: Some(xml),
                    validation_errors: errors,
                    validation_warnings: warnings,
                    attempts: attempt_number,
                    extraction_failed: false,
                });
            }
            feedback = errors;
        }

        Err(GenerationError::Validation { errors: feedback })
    }

    async fn call_model(
        &self,
        prompt: &str,
        request: &GenerationRequest,
        mode: InvocationMode,
        events: &mpsc::Sender<GenerationEvent>,
    ) -> GenerationResult<String> {
        let messages = vec![Message::user(prompt)];
        let options = InvocationOptions {
            extended_thinking: request.use_extended_thinking,
            web_search: request
                .enable_research
                .then(|| self.settings.web_search.clone()),
        };
        let limit = if request.enable_research {
            self.settings.research_timeout
        } else {
            self.settings.timeout
        };

        let call = async {
            match mode {
                InvocationMode::Blocking => {
                    tokio::time::timeout(limit, self.client.invoke(&messages, &options))
                        .await
                        .unwrap_or_else(|_| Err(GenerationError::Timeout { after: limit }))
                }
                InvocationMode::Streaming => {
                    self.stream_model(&messages, &options, limit, events).await
                }
            }
        };

        tokio::select! {
            result = call => result,
            _ = events.closed() => Err(GenerationError::Cancelled),
        }
    }

    /// Forward chunks as they arrive. `limit` bounds the time spent waiting on
    /// the model; time blocked on a full event channel is not counted.
    async fn stream_model(
        &self,
        messages: &[Message],
        options: &InvocationOptions,
        limit: Duration,
        events: &mpsc::Sender<GenerationEvent>,
    ) -> GenerationResult<String> {
        let timed_out = || GenerationError::Timeout { after: limit };

        let started = Instant::now();
        let mut stream = tokio::time::timeout(limit, self.client.stream(messages, options))
            .await
            .map_err(|_| timed_out())??;
        let mut waited = started.elapsed();

        let mut raw = String::new();
        let mut chunks = 0usize;
        loop {
            let remaining = limit.checked_sub(waited).ok_or_else(timed_out)?;
            let started = Instant::now();
            let next = tokio::time::timeout(remaining, stream.next())
                .await
                .map_err(|_| timed_out())?;
            waited += started.elapsed();

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            chunks += 1;
            raw.push_str(&chunk);
            emit(events, GenerationEvent::Content { chunk }).await?;
        }

        debug!("Stream finished after {} chunk(s), {} chars", chunks, raw.len());
        Ok(raw)
    }
}

async fn emit(events: &mpsc::Sender<GenerationEvent>, event: GenerationEvent) -> GenerationResult<()> {
    events
        .send(event)
        .await
        .map_err(|_| GenerationError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = GenerationEvent::ValidationFailed {
            message: "Validation failed with 1 error(s)".to_string(),
            attempt: 2,
            category: FailureCategory::Validation,
            errors: vec!["Missing required <Projects> section".to_string()],
            warnings: Vec::new(),
            retryable: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "validation_failed");
        assert_eq!(value["category"], "validation");
        assert_eq!(value["retryable"], true);
        assert_eq!(value["attempt"], 2);

        let complete = GenerationEvent::Complete {
            message: "done".to_string(),
            content: "<Module/>".to_string(),
            xml_content: Some("<Module/>".to_string()),
            attempts: 1,
            warnings: Vec::new(),
        };
        let value = serde_json::to_value(&complete).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["xmlContent"], "<Module/>");
        assert!(complete.is_terminal());
    }

    #[test]
    fn test_error_event_omits_absent_fields() {
        let event = GenerationEvent::Error {
            message: "model did not respond within 120s".to_string(),
            category: "timeout".to_string(),
            content: None,
            xml_content: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            attempts: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "error",
                "message": "model did not respond within 120s",
                "category": "timeout",
                "xmlContent": null,
                "errors": [],
                "warnings": [],
            })
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = GeneratorConfig::from_lookup(|key| match key {
            "GENERATION_MAX_RETRIES" => Some("2".to_string()),
            "RESEARCH_MAX_USES" => Some("9".to_string()),
            _ => None,
        })
        .unwrap();
        let settings = GenerationSettings::from(&config);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.web_search.max_uses, 9);
        assert_eq!(settings.timeout, Duration::from_secs(120));
    }
}
