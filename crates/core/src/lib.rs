#![deny(missing_docs)]
//! mdflow core: frontmatter codec, content processors, and the transformer
//! that chains them over one file's markdown body.

/// Error and diagnostic types.
pub mod error;
/// Frontmatter codec for the restricted YAML subset.
pub mod frontmatter;
/// JSX escaping helpers and output validation.
pub mod jsx;
/// The processor contract.
pub mod processor;
/// The built-in transformation passes.
pub mod processors;
/// Fence-aware content segmentation.
pub mod segment;
/// The processor chain orchestrator.
pub mod transformer;

pub use error::{Diagnostic, ErrorContext, ProcessingError};
pub use frontmatter::{Decoded, Frontmatter, Value, decode, encode};
pub use jsx::{escape_template_literal, unescape_template_literal, validate_output};
pub use processor::{ProcessContext, Processor, ProcessorOutput};
pub use processors::{
    ImageOptions, ImageProcessor, MathOptions, MathProcessor, MermaidOptions, MermaidProcessor,
    StandardOptions, StandardProcessor, TableOptions, TableProcessor,
};
pub use segment::{Segment, SegmentKind, split_fenced_segments};
pub use transformer::{
    ContentTransformer, TransformOptions, TransformOutcome, TransformerStats, split_line_chunks,
};
