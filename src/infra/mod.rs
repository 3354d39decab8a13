// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// File-system concerns shared by the use cases:
//
//   tokenizer_store.rs - Locates and loads a HuggingFace
//                        `tokenizer.json`, either given
//                        directly or inside a model directory.
//
// Reference: Rust Book §9 (Error Handling with anyhow)

/// Tokenizer loading
pub mod tokenizer_store;
