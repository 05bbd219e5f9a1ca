//! Troceado de documentos en chunks solapados.
//!
//! Divisor recursivo por caracteres: intenta cortar por párrafos, luego por
//! líneas, luego por frases y por último por palabras. Sólo baja al siguiente
//! separador cuando un trozo sigue sin caber en `chunk_size`. Los trozos
//! pequeños se vuelven a juntar hasta llenar el tamaño, arrastrando al
//! siguiente chunk hasta `chunk_overlap` caracteres del anterior.

use std::collections::VecDeque;
use std::path::Path;

use tracing::{debug, info};

use crate::{
    config::ChunkerConfig,
    error::IngestError,
    loaders::LoaderRegistry,
    models::{Chunk, Page},
};

/// Separadores en orden de preferencia: párrafo, línea, frase, palabra.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(cfg: &ChunkerConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size.max(1),
            chunk_overlap: cfg.chunk_overlap.min(cfg.chunk_size.saturating_sub(1)),
        }
    }

    /// Divide `text` en trozos recortados y no vacíos.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Primer separador presente en el texto; si no hay ninguno se usa el último.
        let (separator, finer) = separators
            .iter()
            .position(|sep| text.contains(sep))
            .map(|i| (separators[i], &separators[i + 1..]))
            .unwrap_or((separators[separators.len() - 1], &[][..]));

        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                final_chunks.extend(self.merge(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                // Sin un separador más fino: el trozo se queda entero aunque exceda el tamaño.
                let piece = piece.trim();
                if !piece.is_empty() {
                    final_chunks.push(piece.to_string());
                }
            } else {
                final_chunks.extend(self.split_with(piece, finer));
            }
        }

        if !fitting.is_empty() {
            final_chunks.extend(self.merge(&fitting));
        }

        final_chunks
    }

    /// Junta trozos consecutivos sin pasar de `chunk_size`. Al cerrar un chunk,
    /// conserva por la cola trozos que sumen como mucho `chunk_overlap`.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_pieces(&current) {
                    docs.push(doc);
                }

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }
        docs
    }
}

/// Parte `text` por `separator`, dejando el separador al final de cada trozo.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, matched) in text.match_indices(separator) {
        let end = idx + matched.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_pieces(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Trocea las páginas de un documento y marca cada chunk con `source_name`.
pub fn chunk_document(pages: &[Page], source_name: &str, cfg: &ChunkerConfig) -> Vec<Chunk> {
    let text = pages
        .iter()
        .map(|page| page.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks: Vec<Chunk> = RecursiveSplitter::new(cfg)
        .split_text(&text)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            text,
            source: source_name.to_string(),
            index,
        })
        .collect();

    debug!(
        "'{}': {} páginas → {} chunks",
        source_name,
        pages.len(),
        chunks.len()
    );
    chunks
}

/// Carga un fichero con el lector de su extensión y lo trocea.
///
/// La extensión se toma de `file_name` (nombre original del documento), no de
/// `path`, que puede ser un fichero temporal.
pub fn chunk_file(
    path: &Path,
    file_name: &str,
    registry: &LoaderRegistry,
    cfg: &ChunkerConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let loader = registry.for_file(file_name)?;
    let pages = loader.load(path)?;
    let chunks = chunk_document(&pages, file_name, cfg);
    info!("Fichero '{}' troceado en {} chunks.", file_name, chunks.len());
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(&ChunkerConfig {
            chunk_size,
            chunk_overlap,
        })
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let chunks = splitter(30, 0).split_text("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn falls_back_to_sentences_without_newlines() {
        let chunks = splitter(15, 0).split_text("One two. Three four. Five six.");
        assert_eq!(chunks, vec!["One two.", "Three four.", "Five six."]);
    }

    #[test]
    fn consecutive_chunks_share_the_overlap() {
        let chunks = splitter(20, 5).split_text("aaaa bbbb cccc dddd eeee ffff");
        assert_eq!(chunks, vec!["aaaa bbbb cccc dddd", "dddd eeee ffff"]);
    }

    #[test]
    fn unbreakable_text_is_kept_whole() {
        let word = "x".repeat(50);
        let chunks = splitter(20, 5).split_text(&word);
        assert_eq!(chunks, vec![word]);
    }

    #[test]
    fn empty_or_blank_text_produces_no_chunks() {
        assert!(splitter(100, 10).split_text("").is_empty());
        assert!(splitter(100, 10).split_text(" \n\n \n ").is_empty());
    }

    #[test]
    fn default_chunks_respect_the_size_budget() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let paragraph = sentence.repeat(12);
        let text = vec![paragraph.as_str(); 10].join("\n\n");

        let cfg = ChunkerConfig::default();
        let chunks = RecursiveSplitter::new(&cfg).split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.trim().is_empty());
            assert!(chunk.chars().count() <= cfg.chunk_size, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn long_lines_are_split_by_words_within_budget() {
        let text = "word ".repeat(600);
        let cfg = ChunkerConfig::default();
        let chunks = RecursiveSplitter::new(&cfg).split_text(&text);

        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            assert!(pair[0].chars().count() <= 1000);
            // El siguiente chunk arranca con la cola del anterior.
            let head: String = pair[1].chars().take(4).collect();
            assert!(pair[0].ends_with(&head));
        }
    }

    #[test]
    fn chunk_document_stamps_source_and_sequence() {
        let pages = vec![
            Page::new(1, "The sky is blue."),
            Page::new(2, "   "),
            Page::new(3, "The grass is green."),
        ];
        let cfg = ChunkerConfig {
            chunk_size: 20,
            chunk_overlap: 0,
        };

        let chunks = chunk_document(&pages, "colors.txt", &cfg);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.source == "colors.txt"));
        assert_eq!(chunks[0].text, "The sky is blue.");
        assert_eq!(chunks[1].text, "The grass is green.");
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn chunk_file_rejects_unknown_extensions_before_reading() {
        let registry = LoaderRegistry::default();
        let err = chunk_file(
            Path::new("/does/not/exist.md"),
            "exist.md",
            &registry,
            &ChunkerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    }

    #[test]
    fn chunk_file_reads_text_documents() {
        use std::io::Write;
        let mut file = tempfile::Builder::new().suffix(".tmp").tempfile().unwrap();
        write!(file, "The sky is blue and the grass is green.").unwrap();

        let chunks = chunk_file(
            file.path(),
            "nature.txt",
            &LoaderRegistry::default(),
            &ChunkerConfig::default(),
        )
        .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "nature.txt");
    }
}
