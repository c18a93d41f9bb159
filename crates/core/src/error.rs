use std::path::{Path, PathBuf};

use thiserror::Error;

/// Location and attribution details attached to processing errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Source file the error originated from.
    pub file: Option<PathBuf>,
    /// Line number (1-indexed).
    pub line: Option<usize>,
    /// Column number (1-indexed).
    pub column: Option<usize>,
    /// Name of the processor that reported the error.
    pub processor: Option<String>,
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, " ({}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
                if let Some(column) = self.column {
                    write!(f, ":{}", column)?;
                }
            }
            write!(f, ")")?;
        } else if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        if let Some(processor) = &self.processor {
            write!(f, " [{}]", processor)?;
        }
        Ok(())
    }
}

/// Errors raised while compiling markdown content to MDX.
///
/// Domain-level syntax problems are normally reported through per-file
/// warning/error lists rather than bubbled up as `Err`; these variants cover
/// both that accumulation and genuinely fatal failures (I/O, configuration).
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// File system failure (missing directory, read or write error).
    #[error("file system error: {message}{context}")]
    FileSystem {
        /// Human readable description.
        message: String,
        /// Location/attribution details.
        context: ErrorContext,
        /// Underlying I/O error, when one exists.
        #[source]
        source: Option<std::io::Error>,
    },
    /// Malformed or unprocessable content.
    #[error("content error: {message}{context}")]
    Content {
        /// Human readable description.
        message: String,
        /// Location/attribution details.
        context: ErrorContext,
    },
    /// Invalid mermaid diagram source.
    #[error("mermaid error: {message}{context}")]
    Mermaid {
        /// Human readable description.
        message: String,
        /// Location/attribution details.
        context: ErrorContext,
    },
    /// Invalid LaTeX math expression.
    #[error("math error: {message}{context}")]
    Math {
        /// Human readable description.
        message: String,
        /// Location/attribution details.
        context: ErrorContext,
    },
    /// Invalid pipeline configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human readable description.
        message: String,
    },
}

impl ProcessingError {
    /// Create a content error.
    pub fn content(message: impl Into<String>) -> Self {
        Self::Content {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a mermaid error.
    pub fn mermaid(message: impl Into<String>) -> Self {
        Self::Mermaid {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a math error.
    pub fn math(message: impl Into<String>) -> Self {
        Self::Math {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error without an underlying I/O cause.
    pub fn file_system(message: impl Into<String>) -> Self {
        Self::FileSystem {
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Create a file system error wrapping an I/O error.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileSystem {
            message: message.into(),
            context: ErrorContext::default(),
            source: Some(source),
        }
    }

    /// Attach a source file to the error context.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        if let Some(context) = self.context_mut() {
            context.file = Some(file.into());
        }
        self
    }

    /// Attach a line number to the error context.
    pub fn with_line(mut self, line: usize) -> Self {
        if let Some(context) = self.context_mut() {
            context.line = Some(line);
        }
        self
    }

    /// Attach the reporting processor's name to the error context.
    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        if let Some(context) = self.context_mut() {
            context.processor = Some(processor.into());
        }
        self
    }

    /// The error context, if this variant carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::FileSystem { context, .. }
            | Self::Content { context, .. }
            | Self::Mermaid { context, .. }
            | Self::Math { context, .. } => Some(context),
            Self::Configuration { .. } => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::FileSystem { context, .. }
            | Self::Content { context, .. }
            | Self::Mermaid { context, .. }
            | Self::Math { context, .. } => Some(context),
            Self::Configuration { .. } => None,
        }
    }
}

/// A non-fatal finding recorded during processing.
///
/// Warnings never affect the success of a compile; they surface hygiene
/// issues and best-effort validation results alongside the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human readable description.
    pub message: String,
    /// Name of the processor that reported the warning.
    pub processor: Option<String>,
    /// Source file the warning refers to.
    pub file: Option<PathBuf>,
    /// Line number (1-indexed), when known.
    pub line: Option<usize>,
}

impl Diagnostic {
    /// Create a diagnostic with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            processor: None,
            file: None,
            line: None,
        }
    }

    /// Attach the reporting processor's name.
    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    /// Attach a source file.
    pub fn with_file(mut self, file: impl AsRef<Path>) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self
    }

    /// Attach a line number.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
            write!(f, ")")?;
        } else if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        if let Some(processor) = &self.processor {
            write!(f, " [{}]", processor)?;
        }
        Ok(())
    }
}
