//! Estado de una sesión de usuario: índice, ficheros subidos e historial.
//!
//! Superficie que consume la capa HTTP:
//!   - `initialize_index(&AppConfig)`
//!   - `apply_file_changes(new_files, index, removed_source_names, ...)`
//!   - `answer_question(question, index, llm, ...)`
//!
//! `Session` agrupa las tres y lleva el registro de ficheros e historial.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use chrono::Utc;
use mime_guess::MimeGuess;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::{
    chunker,
    config::{AppConfig, ChunkerConfig, RetrievalConfig},
    embeddings,
    error::IngestError,
    index::IndexManager,
    llm::Completion,
    loaders::{extension_of, DocumentLoader, LoaderRegistry},
    models::{Answer, ChatTurn, FileInfo},
    rag,
};

/// Fichero subido por el usuario. `name` es el nombre original, que actúa
/// como identificador de la fuente en el índice.
pub struct UploadedFile {
    pub name: String,
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl UploadedFile {
    pub fn from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            _temp: None,
        }
    }

    /// Vuelca el contenido a un temporal con la misma extensión que `name`.
    /// El temporal se borra al soltar el `UploadedFile`.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> std::io::Result<Self> {
        let name = name.into();
        let suffix = extension_of(&name)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut temp = tempfile::Builder::new()
            .prefix("docqa-")
            .suffix(&suffix)
            .tempfile()?;
        temp.write_all(bytes)?;
        temp.flush()?;

        Ok(Self {
            name,
            path: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resultado por fichero de una operación de subida.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub chunks: usize,
    pub skipped: bool,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_indexed(&self) -> bool {
        !self.skipped && self.error.is_none()
    }
}

/// Resumen de los cambios aplicados al índice.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub removed_files: Vec<String>,
    pub removed_chunks: usize,
    pub files: Vec<FileOutcome>,
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexed = self.files.iter().filter(|f| f.is_indexed()).count();
        let failed = self.files.iter().filter(|f| f.error.is_some()).count();
        let chunks: usize = self.files.iter().map(|f| f.chunks).sum();
        write!(
            f,
            "{} fichero(s) eliminados ({} chunks), {} indexados ({} chunks), {} con error.",
            self.removed_files.len(),
            self.removed_chunks,
            indexed,
            chunks,
            failed
        )
    }
}

/// Crea el índice de una sesión con el embedder configurado.
pub fn initialize_index(cfg: &AppConfig) -> Arc<IndexManager> {
    let embedder = embeddings::from_config(cfg);
    info!(
        "Índice de sesión creado (embedder '{}', top_k {}).",
        embedder.name(),
        cfg.retrieval.top_k
    );
    Arc::new(IndexManager::in_memory(embedder, cfg.retrieval.top_k))
}

/// Borra del índice las fuentes eliminadas y añade los ficheros nuevos.
///
/// Un fichero que no se puede leer (o de tipo no soportado) sólo falla él:
/// queda anotado en su `FileOutcome` y el resto sigue adelante.
pub async fn apply_file_changes(
    new_files: &[UploadedFile],
    index: &IndexManager,
    removed_source_names: &[String],
    registry: &LoaderRegistry,
    chunker_cfg: &ChunkerConfig,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();

    for name in removed_source_names {
        report.removed_chunks += index.remove(name)?;
        report.removed_files.push(name.clone());
    }

    for file in new_files {
        let outcome = match ingest_file(file, index, registry, chunker_cfg).await {
            Ok(chunks) => FileOutcome {
                file_name: file.name.clone(),
                chunks,
                skipped: false,
                error: None,
            },
            Err(err) => {
                error!("Error ingiriendo '{}': {err}", file.name);
                FileOutcome {
                    file_name: file.name.clone(),
                    chunks: 0,
                    skipped: false,
                    error: Some(err.to_string()),
                }
            }
        };
        report.files.push(outcome);
    }

    info!("{report}");
    Ok(report)
}

async fn ingest_file(
    file: &UploadedFile,
    index: &IndexManager,
    registry: &LoaderRegistry,
    chunker_cfg: &ChunkerConfig,
) -> Result<usize, IngestError> {
    let chunks = chunker::chunk_file(file.path(), &file.name, registry, chunker_cfg)?;
    if chunks.is_empty() {
        warn!("Fichero vacío o sin texto útil: {}", file.name);
        return Ok(0);
    }
    index
        .add(&chunks)
        .await
        .map_err(|e| IngestError::Embedding(e.to_string()))
}

/// Responde una pregunta contra el índice de la sesión.
pub async fn answer_question(
    question: &str,
    index: &IndexManager,
    llm: &dyn Completion,
    retrieval: &RetrievalConfig,
) -> Result<Option<Answer>> {
    rag::answer(question, index, llm, retrieval.min_overlap).await
}

/// Sesión de un usuario. Las operaciones se ejecutan de una en una.
pub struct Session {
    cfg: AppConfig,
    index: OnceLock<Arc<IndexManager>>,
    registry: LoaderRegistry,
    llm: Arc<dyn Completion>,
    files: Vec<FileInfo>,
    history: Vec<ChatTurn>,
}

impl Session {
    pub fn new(cfg: AppConfig, llm: Arc<dyn Completion>) -> Self {
        Self {
            cfg,
            index: OnceLock::new(),
            registry: LoaderRegistry::default(),
            llm,
            files: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Sesión con un índice ya construido (p. ej. con otro almacén o embedder).
    pub fn with_index(cfg: AppConfig, llm: Arc<dyn Completion>, index: Arc<IndexManager>) -> Self {
        let session = Self::new(cfg, llm);
        // Recién creado: la celda está vacía y el set no puede fallar.
        let _ = session.index.set(index);
        session
    }

    /// Índice de la sesión; se crea en la primera llamada y después siempre
    /// se devuelve la misma instancia.
    pub fn index(&self) -> Arc<IndexManager> {
        self.index
            .get_or_init(|| initialize_index(&self.cfg))
            .clone()
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    /// Indica si algún lector registrado en la sesión acepta `file_name`.
    pub fn supports(&self, file_name: &str) -> bool {
        self.registry.supports(file_name)
    }

    /// Registra un lector adicional para esta sesión.
    pub fn register_loader(&mut self, extension: &'static str, loader: Box<dyn DocumentLoader>) {
        self.registry.register(extension, loader);
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    /// Historial en orden de llegada.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Indexa los ficheros que aún no están registrados.
    ///
    /// Un nombre ya registrado se omite sin volver a calcular embeddings,
    /// aunque el contenido haya cambiado; hay que eliminarlo antes.
    pub async fn upload(&mut self, files: Vec<UploadedFile>) -> Result<ApplyReport> {
        self.apply(&[], files).await
    }

    /// Elimina del índice y del registro los ficheros indicados.
    pub async fn remove(&mut self, names: &[String]) -> Result<ApplyReport> {
        self.apply(names, Vec::new()).await
    }

    /// Reconcilia con la lista de ficheros que el usuario tiene subidos:
    /// elimina los registrados que ya no aparecen y añade `new_files`.
    pub async fn sync(
        &mut self,
        current_names: &[String],
        new_files: Vec<UploadedFile>,
    ) -> Result<ApplyReport> {
        let removed: Vec<String> = self
            .files
            .iter()
            .filter(|f| !current_names.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();
        self.apply(&removed, new_files).await
    }

    async fn apply(&mut self, removed: &[String], files: Vec<UploadedFile>) -> Result<ApplyReport> {
        let mut skipped = Vec::new();
        let mut fresh = Vec::new();
        for file in files {
            let removed_now = removed.contains(&file.name);
            if self.is_tracked(&file.name) && !removed_now {
                warn!(
                    "'{}' ya está registrado; se omite sin volver a indexar.",
                    file.name
                );
                skipped.push(FileOutcome {
                    file_name: file.name.clone(),
                    chunks: 0,
                    skipped: true,
                    error: None,
                });
            } else if fresh.iter().any(|f: &UploadedFile| f.name == file.name) {
                warn!("'{}' aparece repetido en la misma subida; se omite.", file.name);
                skipped.push(FileOutcome {
                    file_name: file.name.clone(),
                    chunks: 0,
                    skipped: true,
                    error: None,
                });
            } else {
                fresh.push(file);
            }
        }

        let index = self.index();
        let mut report = apply_file_changes(
            &fresh,
            &index,
            removed,
            &self.registry,
            &self.cfg.chunker,
        )
        .await?;

        self.files.retain(|f| !removed.contains(&f.name));
        for outcome in report.files.iter().filter(|o| o.is_indexed()) {
            self.files.push(FileInfo {
                name: outcome.file_name.clone(),
                mime_type: MimeGuess::from_path(&outcome.file_name)
                    .first()
                    .map(|m| m.to_string()),
                chunks: outcome.chunks,
                uploaded_at: Utc::now(),
            });
        }

        report.files.extend(skipped);
        Ok(report)
    }

    /// Pregunta sobre los documentos de la sesión. Si hay respuesta (aunque
    /// sea un error del LLM) se añade al historial.
    pub async fn ask(&mut self, question: &str) -> Result<Option<Answer>> {
        if question.trim().is_empty() {
            return Ok(None);
        }

        let index = self.index();
        let answer =
            answer_question(question, &index, self.llm.as_ref(), &self.cfg.retrieval).await?;

        if let Some(answer) = &answer {
            self.history.push(ChatTurn::from_answer(question, answer));
        }
        Ok(answer)
    }
}
