// ============================================================
// Layer 4 - Sentence Loader
// ============================================================
// Reads dependency-parsed sentences from a JSON-lines file:
// one Sentence object per line, blank lines ignored.
//
//   {"words":["Ada","wrote"],"heads":[1,null],
//    "dep_labels":["nsubj","root"],"labels":["S-PER","O"]}
//
// subword_ids / orig_to_tok_index may be omitted; the
// application layer then aligns the words with a tokenizer.

use std::{fs, path::PathBuf};

use crate::domain::{sentence::Sentence, traits::SentenceSource};
use crate::error::{NerError, Result};

/// Loads sentences from a `.jsonl` file.
/// Implements the SentenceSource trait from Layer 3.
pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse sentences from an in-memory JSON-lines string
    pub fn parse(text: &str) -> Result<Vec<Sentence>> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<Sentence>(line)
                    .map_err(|source| NerError::Json { line: i + 1, source })
            })
            .collect()
    }
}

impl SentenceSource for JsonlLoader {
    fn load_all(&self) -> Result<Vec<Sentence>> {
        let text = fs::read_to_string(&self.path).map_err(|source| NerError::Io {
            path: self.path.clone(),
            source,
        })?;
        let sentences = Self::parse(&text)?;
        tracing::info!("Loaded {} sentences from '{}'", sentences.len(), self.path.display());
        Ok(sentences)
    }
}
