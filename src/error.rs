//! Errores de dominio sobre los que el llamador necesita decidir.
//! El resto de la aplicación trabaja con `anyhow::Result`.

use thiserror::Error;

/// Fallos al convertir un fichero subido en chunks indexados.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Could not read {file}: {reason}")]
    Load { file: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),
}

impl IngestError {
    pub fn load(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}

/// Fallos al contactar con el backend de completion. Nunca salen del
/// orquestador: se convierten en el texto de la respuesta.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Transport(String),

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Provider(String),
}
