//! Embedded static HTML assets served by the viewer web UI.
//!
//! The assets are kept as `&'static str` so they can be bundled directly inside
//! the binary without filesystem lookups.

mod index;

pub use index::INDEX_HTML;
