// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Workflow coordination behind the CLI commands.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Errors carry context via anyhow
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Writes a model config file (`init-config`)
pub mod config_use_case;

/// Loads sentences and scores or decodes them (`run`)
pub mod run_use_case;
