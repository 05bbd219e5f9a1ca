//! Construcción del contexto que se envía al LLM.

use crate::models::FilteredChunk;

pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Une los textos de los chunks filtrados, en orden, con una línea en blanco.
pub fn build_context(filtered: &[FilteredChunk]) -> String {
    filtered
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
