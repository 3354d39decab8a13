// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between a JSON-lines file and a padded batch:
//
//   sentences.jsonl
//       │
//       ▼
//   JsonlLoader       → Sentence (words, heads, dep labels, tags)
//       │
//       ▼
//   SubwordAligner    → subword ids + first-subword index per word
//       │
//       ▼
//   SampleBuilder     → NerSample (label ids, candidate spans)
//       │
//       ▼
//   NerDataset        → Burn Dataset, fed to a DataLoader
//       │
//       ▼
//   NerBatcher        → NerBatch (padded tensors + masks)
//
// The model builds dependency adjacency matrices from the
// batch's heads with `adjacency` when the GCN is enabled.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads JSON-lines sentence files
pub mod loader;

/// Maps words to subword ids with a HuggingFace tokenizer
pub mod alignment;

/// Converts a Sentence to an id-level NerSample
pub mod sample;

/// Burn Dataset over built samples
pub mod dataset;

/// Pads samples into tensor batches
pub mod batcher;

/// Builds dependency adjacency matrices for a batch
pub mod adjacency;
