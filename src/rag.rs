//! Consulta RAG sobre el índice de la sesión.
//!
//! Flujo:
//!   1. Búsqueda vectorial de candidatos para la pregunta.
//!   2. Filtro léxico (solapamiento de palabras + deduplicado).
//!   3. Construcción del contexto con los chunks supervivientes.
//!   4. El LLM responde usando sólo ese contexto.
//!
//! Si la búsqueda o el filtro no dejan nada, no hay respuesta (`None`): el
//! llamador debe mostrarlo como "no se encontró información relevante".

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    context::build_context,
    filter::filter_relevant_chunks,
    index::IndexManager,
    llm::{failure_message, Completion},
    models::Answer,
    prompt::format_prompt,
};

/// Responde a `question` con el índice y el backend dados.
///
/// Los fallos del LLM no se propagan: el texto de error se devuelve como
/// respuesta. Sólo fallan aquí los errores del propio índice (embeddings).
pub async fn answer(
    question: &str,
    index: &IndexManager,
    llm: &dyn Completion,
    min_overlap: usize,
) -> Result<Option<Answer>> {
    let candidates = index.query(question).await?;
    if candidates.is_empty() {
        info!("Sin candidatos en el índice para la pregunta.");
        return Ok(None);
    }

    let filtered = filter_relevant_chunks(question, &candidates, min_overlap);
    info!(
        "{} candidatos recuperados, {} tras el filtro léxico (mínimo {}).",
        candidates.len(),
        filtered.len(),
        min_overlap
    );
    let Some(top) = filtered.first() else {
        return Ok(None);
    };

    let context = build_context(&filtered);
    let prompt = format_prompt(&context, question);

    let answer = match llm.complete(&prompt).await {
        Ok(text) => text,
        Err(err) => {
            warn!("Fallo contactando con el LLM: {err}");
            failure_message(&err)
        }
    };

    Ok(Some(Answer {
        answer,
        top_content: top.text.clone(),
        top_source: top.source.clone(),
    }))
}
