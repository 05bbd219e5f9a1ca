//! Plantilla del prompt de respuesta.
//!
//! El modelo sólo puede usar el contexto recibido. Si no hay contexto útil,
//! se le pide que conteste literalmente con `FALLBACK_MESSAGE`.

pub const FALLBACK_MESSAGE: &str = "Sorry, the answer is not available in the document.";

/// Valores de contexto que equivalen a "sin contexto" (tras trim + minúsculas).
const EMPTY_CONTEXT_SENTINELS: [&str; 3] = ["no relevant context was found", "n/a", "none"];

pub fn format_prompt(context: &str, question: &str) -> String {
    format_prompt_with_fallback(context, question, FALLBACK_MESSAGE)
}

pub fn format_prompt_with_fallback(context: &str, question: &str, fallback_message: &str) -> String {
    if !has_usable_context(context) {
        return format!("You are a helpful assistant. Respond with:\n\"{fallback_message}\"");
    }

    format!(
        "You are a helpful assistant. Answer the user's question using ONLY the context provided below.\n\
         Be clear, concise, and do not include any external knowledge or assumptions.\n\n\
         Context:\n\"\"\"\n{}\n\"\"\"\n\n\
         Question: {}\n\n\
         Answer:",
        context.trim(),
        question.trim()
    )
}

fn has_usable_context(context: &str) -> bool {
    let cleaned = context.trim().to_lowercase();
    !cleaned.is_empty() && !EMPTY_CONTEXT_SENTINELS.contains(&cleaned.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_context_asks_for_the_fallback_sentence() {
        let expected = format!("You are a helpful assistant. Respond with:\n\"{FALLBACK_MESSAGE}\"");
        for context in ["", "   ", "N/A", " none ", "No relevant context was found"] {
            assert_eq!(format_prompt(context, "anything"), expected, "context {context:?}");
        }
    }

    #[test]
    fn context_template_embeds_trimmed_context_and_question() {
        let prompt = format_prompt("  The sky is blue.  ", "  What color is the sky?  ");
        assert!(prompt.starts_with(
            "You are a helpful assistant. Answer the user's question using ONLY the context provided below.\n"
        ));
        assert!(prompt.contains("Context:\n\"\"\"\nThe sky is blue.\n\"\"\"\n\n"));
        assert!(prompt.contains("Question: What color is the sky?\n\n"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn custom_fallback_message_is_used() {
        let prompt = format_prompt_with_fallback("n/a", "q", "No lo sé.");
        assert!(prompt.ends_with("\"No lo sé.\""));
    }
}
