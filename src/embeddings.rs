//! Cálculo de embeddings para chunks y preguntas.
//!
//! `HashingEmbedder` funciona sin red (hashing de tokens); `OpenAiEmbedder`
//! usa los embeddings de OpenAI a través de Rig.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::{AppConfig, EmbeddingProvider};
use crate::filter;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Un vector por texto, en el mismo orden.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la query"))
    }
}

/// Construye el embedder configurado.
pub fn from_config(cfg: &AppConfig) -> Arc<dyn Embedder> {
    match cfg.embedding_provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(cfg.embedding_dim)),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbedder::new(&cfg.llm_embedding_model)),
    }
}

/// Bolsa de palabras con "hashing trick": cada token en minúsculas suma ±1 en
/// un cubo del vector; el resultado se normaliza (L2).
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in filter::words(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embeddings de OpenAI (requiere `OPENAI_API_KEY`).
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();
        let model_name = if self.model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }

        Ok(embeddings
            .into_iter()
            .map(|emb| emb.vec.into_iter().map(|x| x as f32).collect())
            .collect())
    }
}
