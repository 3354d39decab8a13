// ============================================================
// Layer 6 - Tokenizer Store
// ============================================================
// Loads the subword tokenizer that matches the embedder.
//
// The path may point at the JSON file itself or at a model
// directory (as downloaded from the HuggingFace hub) that
// contains `tokenizer.json`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokenizers::Tokenizer;

const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct TokenizerStore {
    path: PathBuf,
}

impl TokenizerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The tokenizer file this store reads
    pub fn file(&self) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(TOKENIZER_FILE)
        } else {
            self.path.clone()
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let file = self.file();
        if !self.exists() {
            anyhow::bail!("Cannot load tokenizer: no file at '{}'", file.display());
        }
        let tokenizer = Tokenizer::from_file(&file)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Cannot load tokenizer from '{}'", file.display()))?;
        tracing::info!(
            "Loaded tokenizer from '{}' ({} entries)",
            file.display(),
            tokenizer.get_vocab_size(true)
        );
        Ok(tokenizer)
    }

    pub fn exists(&self) -> bool {
        self.file().is_file()
    }
}
