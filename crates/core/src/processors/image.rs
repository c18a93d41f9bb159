//! Resolves local image references against asset folders and the project
//! root, rewriting them to site-root-relative URLs.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, ProcessingError};
use crate::processor::{ProcessContext, Processor, ProcessorOutput};

/// Options for [`ImageProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// Whether the processor participates in the pipeline.
    pub enabled: bool,
    /// Execution priority.
    pub priority: i32,
    /// Asset folder naming pattern; `{filename}` expands to the markdown
    /// file's stem.
    pub asset_folder_pattern: String,
    /// Extensions tried when a reference has no extension, and accepted
    /// during folder lookups.
    pub supported_extensions: Vec<String>,
    /// Probe the filesystem for referenced images.
    pub validate_image_exists: bool,
    /// Record a warning when a referenced image cannot be found.
    pub warn_missing_images: bool,
    /// Directory (under the project root) that absolute `/` sources are
    /// validated against.
    pub public_dir: String,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 15,
            asset_folder_pattern: "{filename}".to_string(),
            supported_extensions: vec![
                ".jpg".to_string(),
                ".jpeg".to_string(),
                ".png".to_string(),
                ".gif".to_string(),
                ".webp".to_string(),
                ".svg".to_string(),
                ".avif".to_string(),
            ],
            validate_image_exists: true,
            warn_missing_images: true,
            public_dir: "public".to_string(),
        }
    }
}

/// One markdown image reference: `![alt](src "title")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Byte offset of the `!`.
    pub start: usize,
    /// Byte offset just past the closing `)`.
    pub end: usize,
    /// 1-indexed line number.
    pub line: usize,
    /// Alt text (may be empty).
    pub alt: String,
    /// The source as written.
    pub src: String,
    /// Optional quoted title.
    pub title: Option<String>,
}

impl ImageRef {
    /// True for `http://`, `https://`, and protocol-relative `//` sources.
    pub fn is_external(&self) -> bool {
        self.src.starts_with("http://")
            || self.src.starts_with("https://")
            || self.src.starts_with("//")
    }

    /// True for sources that are neither external nor `/`-absolute.
    pub fn is_relative(&self) -> bool {
        !self.is_external() && !self.src.starts_with('/')
    }
}

static IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(([^)]+?)(?:\s+"([^"]*)")?\)"#)
        .unwrap_or_else(|e| panic!("image pattern: {e}"))
});

/// Find every image reference in `content`.
pub fn find_image_refs(content: &str) -> Vec<ImageRef> {
    let mut refs = Vec::new();
    let mut pos = 0usize;

    for (idx, line) in content.split('\n').enumerate() {
        for caps in IMAGE.captures_iter(line) {
            let (Some(whole), Some(src)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            refs.push(ImageRef {
                start: pos + whole.start(),
                end: pos + whole.end(),
                line: idx + 1,
                alt: caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
                src: src.as_str().trim().to_string(),
                title: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }
        pos += line.len() + 1;
    }

    refs
}

/// Rewrites local image references to resolved, root-relative URLs.
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    options: ImageOptions,
}

impl ImageProcessor {
    /// Create the processor with the given options.
    pub fn new(options: ImageOptions) -> Self {
        Self { options }
    }

    fn asset_folder(&self, source_file: &Path) -> PathBuf {
        let stem = source_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let folder = self.options.asset_folder_pattern.replace("{filename}", &stem);
        source_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(folder)
    }

    /// Look for `name` inside the asset folder: exact match, then alternate
    /// extensions when none was given, then a case-insensitive scan.
    fn find_in_asset_folder(&self, name: &str, folder: &Path) -> Option<PathBuf> {
        if !folder.is_dir() {
            return None;
        }

        let exact = folder.join(name);
        if exact.is_file() {
            return Some(exact);
        }

        let has_extension = Path::new(name).extension().is_some();
        if !has_extension {
            for ext in &self.options.supported_extensions {
                let candidate = folder.join(format!("{name}{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        let lowered = name.to_lowercase();
        let entries = std::fs::read_dir(folder).ok()?;
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.to_lowercase() == lowered {
                return Some(folder.join(file_name));
            }
        }

        None
    }

    /// Convert a resolved filesystem path to a `/`-prefixed URL relative to
    /// the project root. Paths outside the root pass through unchanged.
    fn to_root_url(&self, resolved: &Path, original: &str, project_root: &Path) -> String {
        match resolved.strip_prefix(project_root) {
            Ok(relative) => {
                let joined = relative.to_string_lossy().replace('\\', "/");
                format!("/{joined}")
            }
            Err(_) => original.to_string(),
        }
    }

    /// Resolve one reference. `None` means "leave the reference untouched";
    /// `Some` carries the rewritten source.
    fn resolve(
        &self,
        image: &ImageRef,
        asset_folder: &Path,
        ctx: &ProcessContext<'_>,
        warnings: &mut Vec<Diagnostic>,
    ) -> Option<String> {
        if image.is_external() {
            return None;
        }

        if image.src.starts_with('/') {
            if self.options.validate_image_exists {
                let public = ctx
                    .project_root
                    .join(&self.options.public_dir)
                    .join(image.src.trim_start_matches('/'));
                if !public.is_file() && self.options.warn_missing_images {
                    warnings.push(
                        Diagnostic::new(format!("image not found: {}", image.src))
                            .with_processor("image")
                            .with_file(ctx.source_file)
                            .with_line(image.line),
                    );
                }
            }
            return Some(image.src.clone());
        }

        if let Some(found) = self.find_in_asset_folder(&image.src, asset_folder) {
            return Some(self.to_root_url(&found, &image.src, ctx.project_root));
        }

        let relative = ctx
            .source_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&image.src);
        if relative.is_file() {
            return Some(self.to_root_url(&relative, &image.src, ctx.project_root));
        }

        if self.options.warn_missing_images {
            warnings.push(
                Diagnostic::new(format!(
                    "image not found: {} (searched in {} and relative to the source file)",
                    image.src,
                    asset_folder.display()
                ))
                .with_processor("image")
                .with_file(ctx.source_file)
                .with_line(image.line),
            );
        }

        Some(image.src.clone())
    }

    fn image_syntax(image: &ImageRef, resolved: &str) -> String {
        match &image.title {
            Some(title) => format!("![{}]({} \"{}\")", image.alt, resolved, title),
            None => format!("![{}]({})", image.alt, resolved),
        }
    }
}

impl Processor for ImageProcessor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn priority(&self) -> i32 {
        self.options.priority
    }

    fn enabled(&self) -> bool {
        self.options.enabled
    }

    fn process(
        &self,
        content: &str,
        ctx: &ProcessContext<'_>,
    ) -> Result<ProcessorOutput, ProcessingError> {
        let refs = find_image_refs(content);
        if refs.is_empty() {
            return Ok(ProcessorOutput::unchanged(content));
        }

        let asset_folder = self.asset_folder(ctx.source_file);
        let mut output = ProcessorOutput::default();
        let mut rebuilt = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for image in &refs {
            rebuilt.push_str(&content[cursor..image.start]);
            match self.resolve(image, &asset_folder, ctx, &mut output.warnings) {
                Some(resolved) => rebuilt.push_str(&Self::image_syntax(image, &resolved)),
                None => rebuilt.push_str(&content[image.start..image.end]),
            }
            cursor = image.end;
        }
        rebuilt.push_str(&content[cursor..]);
        output.content = rebuilt;

        log::debug!(
            "image pass handled {} reference(s) in {}",
            refs.len(),
            ctx.source_file.display()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::frontmatter::Frontmatter;

    fn ctx<'a>(frontmatter: &'a Frontmatter, source: &'a Path, root: &'a Path) -> ProcessContext<'a> {
        ProcessContext {
            source_file: source,
            project_root: root,
            frontmatter,
        }
    }

    #[test]
    fn finds_refs_with_alt_src_and_title() {
        let refs = find_image_refs("![diagram](./pics/a.png \"The diagram\") and ![](b.svg)\n");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].alt, "diagram");
        assert_eq!(refs[0].src, "./pics/a.png");
        assert_eq!(refs[0].title.as_deref(), Some("The diagram"));
        assert_eq!(refs[1].alt, "");
        assert_eq!(refs[1].src, "b.svg");
        assert_eq!(refs[1].title, None);
    }

    #[test]
    fn classifies_sources() {
        let refs = find_image_refs("![a](https://x.test/a.png) ![b](//cdn/b.png) ![c](/c.png) ![d](d.png)");
        assert!(refs[0].is_external());
        assert!(refs[1].is_external());
        assert!(!refs[2].is_external());
        assert!(!refs[2].is_relative());
        assert!(refs[3].is_relative());
    }

    #[test]
    fn external_sources_pass_through_untouched() {
        let frontmatter = Frontmatter::new();
        let content = "![a](https://x.test/a.png)\n";
        let output = ImageProcessor::default()
            .process(
                content,
                &ctx(&frontmatter, Path::new("post.md"), Path::new(".")),
            )
            .unwrap();
        assert_eq!(output.content, content);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn resolves_from_asset_folder_named_after_file() {
        let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let root = temp.path();
        let content_dir = root.join("content");
        let asset_dir = content_dir.join("post");
        std::fs::create_dir_all(&asset_dir).unwrap_or_else(|e| panic!("mkdir: {e}"));
        std::fs::write(asset_dir.join("chart.png"), b"png").unwrap_or_else(|e| panic!("write: {e}"));

        let source = content_dir.join("post.md");
        let frontmatter = Frontmatter::new();
        let output = ImageProcessor::default()
            .process("![c](chart.png)\n", &ctx(&frontmatter, &source, root))
            .unwrap();
        assert_eq!(output.content, "![c](/content/post/chart.png)\n");
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn tries_alternate_extensions_when_none_given() {
        let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let root = temp.path();
        let asset_dir = root.join("post");
        std::fs::create_dir_all(&asset_dir).unwrap_or_else(|e| panic!("mkdir: {e}"));
        std::fs::write(asset_dir.join("chart.webp"), b"webp").unwrap_or_else(|e| panic!("write: {e}"));

        let source = root.join("post.md");
        let frontmatter = Frontmatter::new();
        let output = ImageProcessor::default()
            .process("![c](chart)\n", &ctx(&frontmatter, &source, root))
            .unwrap();
        assert_eq!(output.content, "![c](/post/chart.webp)\n");
    }

    #[test]
    fn missing_image_warns_and_passes_through() {
        let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let root = temp.path();
        let source = root.join("post.md");
        let frontmatter = Frontmatter::new();
        let content = "![c](missing.png)\n";
        let output = ImageProcessor::default()
            .process(content, &ctx(&frontmatter, &source, root))
            .unwrap();
        assert_eq!(output.content, content);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.contains("image not found"));
    }

    #[test]
    fn absolute_source_checks_public_dir() {
        let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let root = temp.path();
        std::fs::create_dir_all(root.join("public/img")).unwrap_or_else(|e| panic!("mkdir: {e}"));
        std::fs::write(root.join("public/img/ok.png"), b"png").unwrap_or_else(|e| panic!("write: {e}"));

        let source = root.join("post.md");
        let frontmatter = Frontmatter::new();
        let output = ImageProcessor::default()
            .process(
                "![a](/img/ok.png) ![b](/img/missing.png)\n",
                &ctx(&frontmatter, &source, root),
            )
            .unwrap();
        // Both pass through; only the missing one warns.
        assert!(output.content.contains("(/img/ok.png)"));
        assert!(output.content.contains("(/img/missing.png)"));
        assert_eq!(output.warnings.len(), 1);
    }
}
