//! Almacén vectorial en memoria para los chunks de la sesión.
//!
//! API pública:
//!   - `VectorIndex::insert(records)`
//!   - `VectorIndex::delete_where_source(source)`
//!   - `VectorIndex::search(vector, k)`, similitud coseno, más relevante primero.

use std::cmp::Ordering;
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use crate::models::RetrievedChunk;

/// Registro almacenado: texto, fuente y vector.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub source: Option<String>,
    pub embedding: Vec<f32>,
}

/// Índice vectorial con alta incremental y borrado por fuente.
pub trait VectorIndex: Send + Sync {
    fn insert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Borra todos los registros cuya fuente sea exactamente `source`.
    fn delete_where_source(&self, source: &str) -> Result<usize>;

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Índice de búsqueda exhaustiva. Pensado para una colección pequeña por
/// sesión; un único escritor, sin transacciones.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryVectorStore {
    fn insert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.records
            .write()
            .map_err(|_| anyhow!("Índice vectorial inaccesible (lock envenenado)"))?
            .extend(records);
        Ok(())
    }

    fn delete_where_source(&self, source: &str) -> Result<usize> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("Índice vectorial inaccesible (lock envenenado)"))?;
        let before = records.len();
        records.retain(|r| r.source.as_deref() != Some(source));
        Ok(before - records.len())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("Índice vectorial inaccesible (lock envenenado)"))?;

        let mut scored: Vec<(f32, &VectorRecord)> = records
            .iter()
            .map(|r| (cosine_similarity(query, &r.embedding), r))
            .collect();

        // sort_by es estable: a igual puntuación manda el orden de inserción.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, r)| RetrievedChunk {
                id: r.id.clone(),
                text: r.text.clone(),
                source: r.source.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> Result<usize> {
        self.records
            .read()
            .map(|r| r.len())
            .map_err(|_| anyhow!("Índice vectorial inaccesible (lock envenenado)"))
    }
}

/// Similitud coseno; 0.0 si las dimensiones no coinciden o algún vector es nulo.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, source: Option<&str>, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            text: format!("text of {id}"),
            source: source.map(str::to_string),
            embedding,
        }
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .insert(vec![
                record("far", Some("a.txt"), vec![0.0, 1.0]),
                record("near", Some("a.txt"), vec![1.0, 0.1]),
                record("mid", Some("b.txt"), vec![1.0, 1.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store
            .insert(vec![
                record("first", None, vec![1.0, 0.0]),
                record("second", None, vec![2.0, 0.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits[0].id, "first");
        assert_eq!(hits[1].id, "second");
    }

    #[test]
    fn delete_where_source_is_exact_and_idempotent() {
        let store = InMemoryVectorStore::new();
        store
            .insert(vec![
                record("1", Some("a.txt"), vec![1.0]),
                record("2", Some("a.txt.bak"), vec![1.0]),
                record("3", None, vec![1.0]),
            ])
            .unwrap();

        assert_eq!(store.delete_where_source("a.txt").unwrap(), 1);
        assert_eq!(store.delete_where_source("a.txt").unwrap(), 0);
        assert_eq!(store.delete_where_source("never-added.pdf").unwrap(), 0);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn poisoned_store_reports_errors_instead_of_looking_empty() {
        let store = std::sync::Arc::new(InMemoryVectorStore::new());
        store.insert(vec![record("1", Some("a.txt"), vec![1.0])]).unwrap();

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.records.write().unwrap();
            panic!("writer crashed while holding the lock");
        })
        .join();

        assert!(store.len().is_err());
        assert!(store.is_empty().is_err());
        assert!(store.search(&[1.0], 4).is_err());
    }

    #[test]
    fn cosine_handles_mismatched_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
