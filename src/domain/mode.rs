// ============================================================
// Layer 3 - Model Switches
// ============================================================
// The two configuration axes that pick the model's wiring:
//
//   DepModel    None   → encoder reads transformer output
//               DgGcn  → encoder reads GCN-refined output
//
//   ParserMode  Crf    → per-word emissions + linear-chain CRF
//               Span   → exhaustive span classification

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepModel {
    #[default]
    None,
    DgGcn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    #[default]
    Crf,
    Span,
}
