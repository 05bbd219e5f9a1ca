//! Backends de completion: reciben el prompt ya construido y devuelven texto.
//!
//! - `HttpCompletion`: POST a un endpoint compatible con OpenAI
//!   (`/v1/chat/completions` de LM Studio, llama.cpp, vLLM...).
//! - `RigCompletion`: OpenAI a través de un agente de Rig.
//!
//! Ninguno lanza errores hacia el orquestador: devuelven `CompletionError` y
//! es `rag::answer` quien lo convierte en texto para el usuario.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AppConfig, CompletionConfig, LlmProvider};
use crate::error::CompletionError;

/// Prefijo del texto que ve el usuario cuando falla la llamada al LLM.
pub const LLM_ERROR_PREFIX: &str = "Error contacting LLM API";

#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Texto mostrado en lugar de la respuesta cuando el backend falla.
pub fn failure_message(err: &CompletionError) -> String {
    format!("{LLM_ERROR_PREFIX}: {err}")
}

/// Construye el backend configurado.
pub fn from_config(cfg: &AppConfig) -> Result<Arc<dyn Completion>> {
    let backend: Arc<dyn Completion> = match cfg.llm_provider {
        LlmProvider::LmStudio => Arc::new(HttpCompletion::new(cfg.completion.clone())?),
        LlmProvider::OpenAI => Arc::new(RigCompletion::new(cfg.completion.clone())),
    };
    Ok(backend)
}

// ---------------------------------------------------------------------
// HTTP (compatible con OpenAI)
// ---------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct HttpCompletion {
    client: reqwest::Client,
    cfg: CompletionConfig,
}

impl HttpCompletion {
    pub fn new(cfg: CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { client, cfg })
    }

    fn map_send_error(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout(self.cfg.timeout_secs)
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Completion for HttpCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let payload = ChatRequest {
            model: Some(self.cfg.chat_model.as_str()).filter(|m| !m.is_empty()),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
            stream: false,
        };

        debug!("Enviando prompt de {} caracteres a {}", prompt.len(), self.cfg.api_url);
        let response = self
            .client
            .post(&self.cfg.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status(status.as_u16(), body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::MalformedResponse("response has no choices".into()))
    }
}

// ---------------------------------------------------------------------
// OpenAI vía Rig
// ---------------------------------------------------------------------

pub struct RigCompletion {
    cfg: CompletionConfig,
}

impl RigCompletion {
    pub fn new(cfg: CompletionConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Completion for RigCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt as _;
        use rig::providers::openai;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.cfg.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.cfg.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .temperature(self.cfg.temperature as f64)
            .max_tokens(self.cfg.max_tokens as u64)
            .build();

        let timeout = Duration::from_secs(self.cfg.timeout_secs);
        match tokio::time::timeout(timeout, agent.prompt(prompt)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => Err(CompletionError::Provider(e.to_string())),
            Err(_) => Err(CompletionError::Timeout(self.cfg.timeout_secs)),
        }
    }
}
