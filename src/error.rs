// ============================================================
// Library Error Type
// ============================================================
// Every fallible operation in the library returns NerError.
// The CLI and application layers wrap it in anyhow with
// context, the same way they wrap I/O errors.
//
// Numeric shape errors inside burn are not caught here;
// they panic inside the backend like in any burn model.

use std::path::PathBuf;

/// Result alias used across the library
pub type Result<T, E = NerError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum NerError {
    #[error("label vocabulary is missing the sentinel label '{0}'")]
    MissingSentinel(&'static str),

    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    #[error("unknown dependency label '{0}'")]
    UnknownDepLabel(String),

    #[error("unknown embedder '{0}'")]
    UnknownEmbedder(String),

    #[error("sentence {sentence}: word {word} points at head {head}, but the sentence has {len} words")]
    InvalidHead {
        sentence: usize,
        word:     usize,
        head:     usize,
        len:      usize,
    },

    #[error("malformed sentence: {0}")]
    MalformedSentence(String),

    #[error("subword sequence of length {len} exceeds the embedder limit of {max}")]
    SequenceTooLong { len: usize, max: usize },

    #[error("gold labels are required to compute a training loss")]
    MissingLabels,

    #[error("span-classification mode requires candidate spans in the batch")]
    MissingSpans,

    #[error("model was built without a prediction head")]
    MissingHead,

    #[error("unknown span combination term '{0}'")]
    UnknownCombination(String),

    #[error("subword id {id} is outside the embedder vocabulary of {vocab_size}")]
    SubwordOutOfVocab { id: usize, vocab_size: usize },

    #[error("tag vocabulary has no tags besides the CRF sentinels")]
    NoTags,

    #[error("cannot read tensor data back to the host: {0}")]
    TensorData(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("cannot read '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON on line {line}: {source}")]
    Json {
        line:   usize,
        #[source]
        source: serde_json::Error,
    },
}
