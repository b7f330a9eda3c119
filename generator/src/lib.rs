pub mod anthropic_service;
pub mod config;
pub mod error;
pub mod input_formatter;
pub mod model_client;
pub mod models;
pub mod orchestrator;
pub mod prompt_builder;
pub mod schema;
pub mod upload;
pub mod validator;
pub mod xml_extractor;
pub mod xml_tree;

pub use anthropic_service::AnthropicService;
pub use config::GeneratorConfig;
pub use error::{GenerationError, GenerationResult};
pub use model_client::{InvocationOptions, Message, ModelClient, TextStream, WebSearchTool};
pub use models::*;
pub use orchestrator::{
    FailureCategory, GenerationEvent, GenerationRun, GenerationSettings, Generator, InvocationMode,
};
pub use prompt_builder::{build_prompt, PromptBuilder};
pub use upload::{check_upload, UploadError};
pub use validator::{validate_course, validate_module, SchemaValidator};
pub use xml_extractor::extract_root_element;
