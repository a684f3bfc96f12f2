// ============================================================================
// components — reference component types shipped with overrun
// ============================================================================
//
// Each submodule registers itself with the catalog in `component.rs` via a
// `register()` function called from `component::register_builtin_components`.
// ============================================================================

pub mod exec;
pub mod homebrew;
