//! Carga y gestión de configuración de la aplicación (LLM, embeddings y pipeline RAG).

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::filter::DEFAULT_MIN_OVERLAP;

/// Tamaño máximo por defecto de una petición de subida (200 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Backend usado para generar las respuestas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Endpoint compatible con OpenAI (LM Studio, llama.cpp, vLLM...) vía HTTP directo.
    LmStudio,
    /// OpenAI a través de Rig.
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "http" => Ok(Self::LmStudio),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Backend usado para calcular los embeddings de los chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Embeddings locales por hashing de tokens; no necesita red.
    Hashing,
    OpenAI,
}

impl EmbeddingProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hashing" | "local" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor de embeddings no soportado: {other}")),
        }
    }
}

/// Parámetros del troceado de documentos.
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 20,
        }
    }
}

/// Parámetros de recuperación y filtrado léxico.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_overlap: DEFAULT_MIN_OVERLAP,
        }
    }
}

/// Parámetros de la llamada de completion.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_url: String,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:1234/v1/chat/completions".to_string(),
            chat_model: String::new(),
            max_tokens: 3500,
            temperature: 0.9,
            timeout_secs: 30,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,
    /// Límite del cuerpo de `/api/upload`, en bytes.
    pub max_upload_bytes: usize,

    pub llm_provider: LlmProvider,
    pub completion: CompletionConfig,

    pub embedding_provider: EmbeddingProvider,
    pub llm_embedding_model: String,
    pub embedding_dim: usize,

    pub chunker: ChunkerConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            open_browser: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            llm_provider: LlmProvider::LmStudio,
            completion: CompletionConfig::default(),
            embedding_provider: EmbeddingProvider::Hashing,
            llm_embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: 384,
            chunker: ChunkerConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);
        let open_browser = parse_var("OPEN_BROWSER", defaults.open_browser)?;
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?;
        if max_upload_bytes == 0 {
            return Err(anyhow!("MAX_UPLOAD_BYTES debe ser mayor que 0"));
        }

        let llm_provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "lmstudio".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let api_url = env::var("LLM_API_URL").unwrap_or(defaults.completion.api_url);
        Url::parse(&api_url).with_context(|| format!("LLM_API_URL no es una URL válida: {api_url}"))?;

        let completion = CompletionConfig {
            api_url,
            chat_model: env::var("LLM_CHAT_MODEL").unwrap_or_default(),
            max_tokens: parse_var("LLM_MAX_TOKENS", defaults.completion.max_tokens)?,
            temperature: parse_var("LLM_TEMPERATURE", defaults.completion.temperature)?,
            timeout_secs: parse_var("LLM_TIMEOUT_SECS", defaults.completion.timeout_secs)?,
        };

        let embedding_provider_str =
            env::var("EMBEDDING_PROVIDER").unwrap_or_else(|_| "hashing".to_string());
        let embedding_provider = EmbeddingProvider::from_str(&embedding_provider_str)?;

        let llm_embedding_model =
            env::var("LLM_EMBEDDING_MODEL").unwrap_or(defaults.llm_embedding_model);
        let embedding_dim = parse_var("EMBEDDING_DIM", defaults.embedding_dim)?;
        if embedding_dim == 0 {
            return Err(anyhow!("EMBEDDING_DIM debe ser mayor que 0"));
        }

        let chunker = ChunkerConfig {
            chunk_size: parse_var("CHUNK_SIZE", defaults.chunker.chunk_size)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", defaults.chunker.chunk_overlap)?,
        };
        if chunker.chunk_overlap >= chunker.chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({}) debe ser menor que CHUNK_SIZE ({})",
                chunker.chunk_overlap,
                chunker.chunk_size
            ));
        }

        let retrieval = RetrievalConfig {
            top_k: parse_var("RETRIEVAL_TOP_K", defaults.retrieval.top_k)?,
            min_overlap: parse_var("MIN_OVERLAP", defaults.retrieval.min_overlap)?,
        };

        Ok(Self {
            server_addr,
            open_browser,
            max_upload_bytes,
            llm_provider,
            completion,
            embedding_provider,
            llm_embedding_model,
            embedding_dim,
            chunker,
            retrieval,
        })
    }
}

/// Lee una variable opcional; si existe pero no se puede interpretar, es un error.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {name} ('{raw}'): {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!(LlmProvider::from_str("LMStudio").unwrap(), LlmProvider::LmStudio);
        assert_eq!(LlmProvider::from_str("openai").unwrap(), LlmProvider::OpenAI);
        assert!(LlmProvider::from_str("gemini").is_err());
        assert_eq!(
            EmbeddingProvider::from_str("LOCAL").unwrap(),
            EmbeddingProvider::Hashing
        );
    }

    #[test]
    fn defaults_match_reference_pipeline() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chunker.chunk_size, 1000);
        assert_eq!(cfg.chunker.chunk_overlap, 20);
        assert_eq!(cfg.retrieval.min_overlap, 3);
        assert_eq!(cfg.retrieval.min_overlap, DEFAULT_MIN_OVERLAP);
        assert!(cfg.max_upload_bytes > 2 * 1024 * 1024);
        assert_eq!(cfg.completion.max_tokens, 3500);
        assert_eq!(cfg.completion.timeout_secs, 30);
    }

    #[test]
    fn parse_var_falls_back_to_default_when_unset() {
        let value: usize = parse_var("DOCQA_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
