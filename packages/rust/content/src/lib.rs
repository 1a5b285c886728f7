//! Pure string utilities for post content.
//!
//! Everything here is deterministic and network-free:
//! - [`split`] cuts rich-text HTML into heading-aligned chunks
//! - [`strip_code_fences`] removes markdown fences a model wrapped around its output
//! - [`truncate`] / [`truncate_with_marker`] bound prompt inputs on char boundaries
//! - [`extract_json_array`] finds the outermost JSON array in free-form text

mod chunk;
mod text;

pub use chunk::{ContentChunk, split};
pub use text::{extract_json_array, strip_code_fences, truncate, truncate_with_marker};
