//! The built-in transformation passes, one module per processor.

/// Image reference resolution.
pub mod image;
/// LaTeX math span transformation.
pub mod math;
/// Mermaid diagram block transformation.
pub mod mermaid;
/// Baseline hygiene validation and JSX-safety escaping.
pub mod standard;
/// GFM table normalization.
pub mod table;

pub use image::{ImageOptions, ImageProcessor, ImageRef, find_image_refs};
pub use math::{MathKind, MathOptions, MathProcessor, MathSpan, find_math_spans};
pub use mermaid::{
    MERMAID_KEYWORDS, MermaidBlock, MermaidOptions, MermaidProcessor, find_mermaid_blocks,
};
pub use standard::{StandardOptions, StandardProcessor};
pub use table::{Alignment, Table, TableOptions, TableProcessor, find_tables};
