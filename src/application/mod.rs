// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal at a time.
//
// Rules for this layer:
//   - No tensor math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern

/// Build a fresh network and checkpoint it
pub mod init_use_case;

/// Load a checkpoint and predict answer slots
pub mod predict_use_case;
