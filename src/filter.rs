//! Filtro léxico sobre los candidatos de la búsqueda vectorial.
//!
//! Un candidato se queda si comparte al menos `min_overlap` palabras distintas
//! (en minúsculas, `\w+`) con la pregunta. Sin stemming ni lematización.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{FilteredChunk, RetrievedChunk, UNKNOWN_SOURCE};

pub const DEFAULT_MIN_OVERLAP: usize = 3;

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("patrón de palabra válido"))
}

/// Palabras en minúsculas, en orden y con repeticiones.
pub fn words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    words(text).into_iter().collect()
}

pub fn overlap_count(question: &str, content: &str) -> usize {
    token_set(question).intersection(&token_set(content)).count()
}

pub fn has_overlap(question: &str, content: &str, min_overlap: usize) -> bool {
    overlap_count(question, content) >= min_overlap
}

/// Algo que puede pasar por el filtro: un resultado de búsqueda o un chunk
/// ya filtrado.
pub trait Candidate {
    fn text(&self) -> &str;
    fn source(&self) -> Option<&str>;
}

impl Candidate for RetrievedChunk {
    fn text(&self) -> &str {
        &self.text
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl Candidate for FilteredChunk {
    fn text(&self) -> &str {
        &self.text
    }

    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }
}

/// Deduplica por texto recortado y conserva los candidatos con solapamiento
/// suficiente, respetando el orden de relevancia de entrada.
pub fn filter_relevant_chunks<C: Candidate>(
    question: &str,
    candidates: &[C],
    min_overlap: usize,
) -> Vec<FilteredChunk> {
    let question_tokens = token_set(question);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut filtered = Vec::new();

    for candidate in candidates {
        let content = candidate.text().trim();
        if seen.contains(content) {
            continue;
        }
        let shared = token_set(content).intersection(&question_tokens).count();
        if shared < min_overlap {
            continue;
        }

        seen.insert(content);
        filtered.push(FilteredChunk {
            text: content.to_string(),
            source: candidate.source().unwrap_or(UNKNOWN_SOURCE).to_string(),
        });
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, source: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            id: text.to_string(),
            text: text.to_string(),
            source: source.map(str::to_string),
            score: 0.0,
        }
    }

    #[test]
    fn tokens_are_lowercase_word_runs() {
        assert_eq!(
            words("What's the SKY_color, 2day?"),
            vec!["what", "s", "the", "sky_color", "2day"]
        );
        assert_eq!(token_set("the THE The").len(), 1);
    }

    #[test]
    fn threshold_boundary() {
        let question = "alpha beta gamma delta";
        let below = hit("alpha beta only", Some("a.txt"));
        let exact = hit("alpha beta gamma here", Some("b.txt"));

        let kept = filter_relevant_chunks(question, &[below, exact], 3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source, "b.txt");
    }

    #[test]
    fn duplicates_keep_the_first_occurrence_in_order() {
        let question = "the sky is blue";
        let candidates = vec![
            hit("  The sky is blue.  ", Some("first.txt")),
            hit("Is the sky blue today?", Some("other.txt")),
            hit("The sky is blue.", Some("second.txt")),
        ];

        let kept = filter_relevant_chunks(question, &candidates, 3);
        assert_eq!(
            kept,
            vec![
                FilteredChunk {
                    text: "The sky is blue.".into(),
                    source: "first.txt".into()
                },
                FilteredChunk {
                    text: "Is the sky blue today?".into(),
                    source: "other.txt".into()
                },
            ]
        );
    }

    #[test]
    fn duplicates_below_threshold_do_not_shadow_later_text() {
        // Un candidato descartado no cuenta como visto.
        let candidates = vec![hit("sky", None), hit("sky", None)];
        assert!(filter_relevant_chunks("the sky is blue", &candidates, 3).is_empty());
    }

    #[test]
    fn missing_source_defaults_to_unknown() {
        let kept = filter_relevant_chunks("the sky is blue", &[hit("the sky is blue", None)], 3);
        assert_eq!(kept[0].source, UNKNOWN_SOURCE);
    }

    #[test]
    fn no_candidate_over_threshold_gives_empty_result() {
        let candidates = vec![hit("completely unrelated words", Some("x.txt"))];
        assert!(filter_relevant_chunks("what color is the sky", &candidates, 3).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let question = "which fruit is yellow and sweet";
        let candidates = vec![
            hit("A banana is yellow and sweet.", Some("fruit.txt")),
            hit("A banana is yellow and sweet.", Some("dupe.txt")),
            hit("Lemons are yellow but sour, which fruit is best?", Some("fruit.txt")),
            hit("Cars are fast.", Some("cars.txt")),
        ];

        let once = filter_relevant_chunks(question, &candidates, DEFAULT_MIN_OVERLAP);
        let twice = filter_relevant_chunks(question, &once, DEFAULT_MIN_OVERLAP);
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }
}
