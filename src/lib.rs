// ============================================================
// dep-ner - dependency-aware named-entity recognition
// ============================================================
// Layers, innermost first:
//
//   domain       labels, sentences, spans (no Burn types)
//   data         loading, alignment, samples, batching
//   ml           embedder, GCN, encoder, CRF, span heads, model
//   infra        tokenizer files
//   application  use cases behind the CLI
//
// Library callers usually need only `NerModelConfig`,
// `SampleBuilder`, `NerBatcher` and `NerModel::{loss, decode}`.

#![recursion_limit = "256"]

pub mod application;
pub mod data;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ml;

pub use error::{NerError, Result};
