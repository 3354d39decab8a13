// ============================================================
// Layer 3 - Core Traits
// ============================================================
// The application layer only sees these traits, so a corpus
// reader can be swapped without touching the use cases.

use crate::domain::sentence::Sentence;
use crate::error::Result;

// ─── SentenceSource ───────────────────────────────────────────────────────────
/// Any component that can load parsed sentences.
///
/// Implementations:
///   - JsonlLoader → one JSON sentence per line
pub trait SentenceSource {
    fn load_all(&self) -> Result<Vec<Sentence>>;
}
