//! Pipeline configuration surface.
//!
//! Build-tool glue hands configuration over as JSON; everything has a
//! default matching a conventional Astro-style content tree.

use std::path::PathBuf;

use mdflow_core::{
    ImageOptions, MathOptions, MermaidOptions, ProcessingError, StandardOptions, TableOptions,
};
use serde::{Deserialize, Serialize};

/// Per-processor option blocks, keyed the way the JSON surface spells them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorsConfig {
    /// Baseline hygiene/escaping pass.
    pub standard: StandardOptions,
    /// Mermaid block transformation.
    pub mermaid: MermaidOptions,
    /// Image reference resolution.
    pub image: ImageOptions,
    /// Math span transformation.
    pub math: MathOptions,
    /// Table normalization.
    pub tables: TableOptions,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Directory scanned for markdown sources.
    pub content_dir: PathBuf,
    /// Directory outputs are written under (mirrors the source tree).
    pub output_dir: PathBuf,
    /// Project root used for resolving root-relative asset URLs.
    pub project_root: PathBuf,
    /// Include globs, relative to `content_dir`.
    pub include: Vec<String>,
    /// Exclude globs, relative to `content_dir`.
    pub exclude: Vec<String>,
    /// Per-processor options.
    pub processors: ProcessorsConfig,
    /// Enable watch mode.
    pub watch: bool,
    /// Notify hot-reload listeners after watch-mode compiles.
    pub hot_reload: bool,
    /// Keep running remaining processors after an unexpected failure.
    pub continue_on_error: bool,
    /// Maximum concurrently in-flight file compiles.
    pub max_concurrency: usize,
    /// Files handed to the pool per wave, and scanner stat/read batch size.
    pub batch_size: usize,
    /// Skip files whose existing output is newer than the source.
    pub skip_up_to_date_outputs: bool,
    /// Bodies above this many bytes take the chunked transform path.
    pub large_file_threshold: usize,
    /// Watch-mode debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("src/content"),
            output_dir: PathBuf::from("src/content"),
            project_root: PathBuf::from("."),
            include: vec!["**/*.md".to_string()],
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
                "**/.astro/**".to_string(),
            ],
            processors: ProcessorsConfig::default(),
            watch: true,
            hot_reload: true,
            continue_on_error: true,
            max_concurrency: 4,
            batch_size: 10,
            skip_up_to_date_outputs: true,
            large_file_threshold: 1024 * 1024,
            debounce_ms: 300,
        }
    }
}

impl Config {
    /// Parse a configuration from its JSON form and validate it.
    pub fn from_json(json: &str) -> Result<Self, ProcessingError> {
        let config: Config = serde_json::from_str(json)
            .map_err(|err| ProcessingError::configuration(format!("invalid config JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        let mut problems = Vec::new();

        if self.content_dir.as_os_str().is_empty() {
            problems.push("contentDir must be a non-empty path".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            problems.push("outputDir must be a non-empty path".to_string());
        }
        if self.include.is_empty() {
            problems.push("include must list at least one glob pattern".to_string());
        }
        if self.max_concurrency == 0 {
            problems.push("maxConcurrency must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            problems.push("batchSize must be at least 1".to_string());
        }

        let (inline_open, inline_close) = &self.processors.math.inline_delimiters;
        if inline_open.is_empty() || inline_close.is_empty() {
            problems.push("math inline delimiters must be non-empty".to_string());
        }
        let (display_open, display_close) = &self.processors.math.display_delimiters;
        if display_open.is_empty() || display_close.is_empty() {
            problems.push("math display delimiters must be non-empty".to_string());
        }
        if self.processors.mermaid.component_name.is_empty() {
            problems.push("mermaid componentName must be non-empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProcessingError::configuration(format!(
                "configuration validation failed:\n{}",
                problems.join("\n")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap_or_else(|e| panic!("{e}"));
    }

    #[test]
    fn default_processor_priorities_follow_the_pipeline_order() {
        let config = Config::default();
        assert!(config.processors.standard.priority < config.processors.mermaid.priority);
        assert!(config.processors.mermaid.priority < config.processors.image.priority);
        assert!(config.processors.image.priority < config.processors.math.priority);
        assert!(config.processors.math.priority < config.processors.tables.priority);
    }

    #[test]
    fn from_json_overrides_and_keeps_defaults() {
        let config = Config::from_json(
            r#"{
                "contentDir": "docs",
                "maxConcurrency": 8,
                "processors": { "mermaid": { "preserve_code_block": true } }
            }"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.content_dir, PathBuf::from("docs"));
        assert_eq!(config.max_concurrency, 8);
        assert!(config.processors.mermaid.preserve_code_block);
        // Untouched fields keep their defaults.
        assert_eq!(config.batch_size, 10);
        assert!(config.processors.math.validate_latex);
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = Config::default();
        config.include.clear();
        config.max_concurrency = 0;
        let err = config.validate().expect_err("expected validation failure");
        let message = err.to_string();
        assert!(message.contains("include"), "{message}");
        assert!(message.contains("maxConcurrency"), "{message}");
    }

    #[test]
    fn invalid_json_is_a_configuration_error() {
        let err = Config::from_json("{not json").expect_err("expected parse failure");
        assert!(matches!(err, ProcessingError::Configuration { .. }));
    }
}
