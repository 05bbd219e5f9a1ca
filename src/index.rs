//! Gestor del índice de la sesión: alta de chunks con embeddings, borrado por
//! documento de origen y búsqueda por similitud.
//!
//! Una instancia por sesión. Supone un único escritor: no protege contra
//! altas y consultas concurrentes más allá de lo que da el almacén.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    embeddings::Embedder,
    models::{Chunk, RetrievedChunk},
    vector_store::{InMemoryVectorStore, VectorIndex, VectorRecord},
};

pub struct IndexManager {
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl IndexManager {
    pub fn new(store: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
        }
    }

    pub fn in_memory(embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self::new(Arc::new(InMemoryVectorStore::new()), embedder, top_k)
    }

    /// Calcula los embeddings de `chunks` y los guarda. Sin efecto si está vacío.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de chunks ({})",
                vectors.len(),
                chunks.len()
            ));
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                text: chunk.text.clone(),
                source: Some(chunk.source.clone()),
                embedding,
            })
            .collect();

        let added = records.len();
        self.store.insert(records)?;
        info!(
            "{} chunks añadidos al índice (embedder '{}').",
            added,
            self.embedder.name()
        );
        Ok(added)
    }

    /// Borra todos los chunks de `source_name`. Borrar algo que no existe devuelve 0.
    pub fn remove(&self, source_name: &str) -> Result<usize> {
        let removed = self.store.delete_where_source(source_name)?;
        info!("Eliminados {} chunks de '{}'.", removed, source_name);
        Ok(removed)
    }

    /// Los `top_k` chunks más parecidos a la pregunta.
    pub async fn query(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        self.query_k(question, self.top_k).await
    }

    pub async fn query_k(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 || self.store.is_empty()? {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(question).await?;
        let hits = self.store.search(&vector, k)?;
        debug!("Búsqueda vectorial: {} resultados para '{}'", hits.len(), question);
        Ok(hits)
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use async_trait::async_trait;

    fn chunk(text: &str, source: &str, index: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
            index,
        }
    }

    fn manager() -> IndexManager {
        IndexManager::in_memory(Arc::new(HashingEmbedder::new(256)), 4)
    }

    #[tokio::test]
    async fn added_chunks_are_retrievable_by_their_text() {
        let index = manager();
        index
            .add(&[
                chunk("The sky is blue and the grass is green.", "nature.txt", 0),
                chunk("Invoices are due within thirty days.", "billing.pdf", 0),
            ])
            .await
            .unwrap();

        let hits = index.query("The sky is blue and the grass is green.").await.unwrap();
        assert_eq!(hits[0].source.as_deref(), Some("nature.txt"));
    }

    #[tokio::test]
    async fn removed_sources_never_come_back() {
        let index = manager();
        index
            .add(&[
                chunk("The sky is blue.", "nature.txt", 0),
                chunk("The grass is green.", "nature.txt", 1),
                chunk("The sky was grey in London.", "travel.docx", 0),
            ])
            .await
            .unwrap();

        assert_eq!(index.remove("nature.txt").unwrap(), 2);
        let hits = index.query("The sky is blue.").await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.source.as_deref() != Some("nature.txt")));
    }

    #[tokio::test]
    async fn empty_add_and_unknown_remove_are_noops() {
        let index = manager();
        assert_eq!(index.add(&[]).await.unwrap(), 0);
        assert_eq!(index.remove("ghost.pdf").unwrap(), 0);
        assert!(index.is_empty().unwrap());
        assert!(index.query("anything at all").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_respects_top_k() {
        let index = IndexManager::in_memory(Arc::new(HashingEmbedder::new(64)), 2);
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(&format!("note number {i}"), "notes.txt", i))
            .collect();
        index.add(&chunks).await.unwrap();

        assert_eq!(index.query("note").await.unwrap().len(), 2);
        assert_eq!(index.query_k("note", 10).await.unwrap().len(), 5);
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }

        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]])
        }
    }

    /// Almacén cuyo lock quedó envenenado: toda operación falla.
    struct BrokenStore;

    impl VectorIndex for BrokenStore {
        fn insert(&self, _records: Vec<VectorRecord>) -> Result<()> {
            Err(anyhow!("lock envenenado"))
        }

        fn delete_where_source(&self, _source: &str) -> Result<usize> {
            Err(anyhow!("lock envenenado"))
        }

        fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<RetrievedChunk>> {
            Err(anyhow!("lock envenenado"))
        }

        fn len(&self) -> Result<usize> {
            Err(anyhow!("lock envenenado"))
        }
    }

    #[tokio::test]
    async fn store_failures_surface_from_query() {
        let index = IndexManager::new(
            Arc::new(BrokenStore),
            Arc::new(HashingEmbedder::new(64)),
            4,
        );
        assert!(index.query("What color is the sky?").await.is_err());
        assert!(index.len().is_err());
    }

    #[tokio::test]
    async fn embedding_count_mismatch_is_an_error() {
        let index = IndexManager::in_memory(Arc::new(ShortEmbedder), 4);
        let result = index
            .add(&[chunk("a", "x.txt", 0), chunk("b", "x.txt", 1)])
            .await;
        assert!(result.is_err());
        assert!(index.is_empty().unwrap());
    }
}
