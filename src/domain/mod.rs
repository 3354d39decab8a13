// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Pure Rust structs and traits that define what the system
// talks about: sentences, labels, spans, entities.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Keeping it framework-free means label handling and span
// enumeration are unit-testable without any tensor backend.

/// Entity and dependency label vocabularies, tag schemes
pub mod labels;

/// Dependency-model and parser-mode switches
pub mod mode;

/// A dependency-parsed, subword-aligned sentence
pub mod sentence;

/// Candidate spans, width buckets, entities
pub mod span;

/// Core abstractions that other layers implement
pub mod traits;
