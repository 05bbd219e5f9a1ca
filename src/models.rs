//! Modelos de dominio: páginas cargadas, chunks, resultados de recuperación
//! e historial de conversación.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Valor usado cuando un resultado de recuperación no trae fuente.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Unidad de texto devuelta por un `DocumentLoader` (página de un PDF,
/// hoja de un Excel, el fichero entero en el caso de un .txt...).
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub text: String,
    pub number: usize,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            number,
        }
    }
}

/// Trozo de un documento listo para indexar. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// Nombre del fichero original.
    pub source: String,
    /// Posición dentro del documento (orden de troceado).
    pub index: usize,
}

/// Chunk devuelto por una búsqueda de similitud, más relevante primero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub source: Option<String>,
    pub score: f32,
}

/// Par (texto, fuente) que sobrevive al filtro léxico.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredChunk {
    pub text: String,
    pub source: String,
}

/// Resultado de una pregunta con contexto disponible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Respuesta del LLM o el mensaje de error al contactarlo.
    pub answer: String,
    pub top_content: String,
    pub top_source: String,
}

/// Entrada del historial de conversación. Sólo se añade, nunca se modifica.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub source_doc: String,
    pub source_content: String,
    pub asked_at: DateTime<Utc>,
}

const PREVIEW_CHARS: usize = 500;

impl ChatTurn {
    pub fn from_answer(question: &str, answer: &Answer) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.answer.clone(),
            source_doc: answer.top_source.clone(),
            source_content: answer.top_content.clone(),
            asked_at: Utc::now(),
        }
    }

    /// Extracto del chunk de soporte para mostrar en el historial.
    pub fn preview(&self) -> String {
        if self.source_content.chars().count() > PREVIEW_CHARS {
            let head: String = self.source_content.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            self.source_content.clone()
        }
    }
}

/// Fichero subido y registrado en la sesión.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub mime_type: Option<String>,
    pub chunks: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn_with_content(content: &str) -> ChatTurn {
        ChatTurn::from_answer(
            "q",
            &Answer {
                answer: "a".into(),
                top_content: content.into(),
                top_source: "doc.txt".into(),
            },
        )
    }

    #[test]
    fn preview_keeps_short_content() {
        assert_eq!(turn_with_content("short").preview(), "short");
    }

    #[test]
    fn preview_truncates_long_content() {
        let content = "é".repeat(600);
        let preview = turn_with_content(&content).preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }
}
