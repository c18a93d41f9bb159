//! Fence-aware segmentation of markdown content.
//!
//! Splits a document into alternating text and code segments so that
//! escaping passes can leave fenced code untouched. The closing fence must
//! use the same marker string that opened the block (``` vs ~~~).

/// Classification of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Prose outside fenced code blocks.
    Text,
    /// A fenced code block, fences included.
    Code,
}

/// One contiguous piece of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Whether this segment is prose or fenced code.
    pub kind: SegmentKind,
    /// Raw text of the segment, line endings preserved.
    pub text: String,
}

/// Split content into alternating text/code segments.
///
/// Concatenating the segment texts reproduces the input exactly.
pub fn split_fenced_segments(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut open_fence: Option<&str> = None;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (open_fence, marker) {
            (None, Some(fence)) => {
                if !current.is_empty() {
                    segments.push(Segment {
                        kind: SegmentKind::Text,
                        text: std::mem::take(&mut current),
                    });
                }
                open_fence = Some(fence);
                current.push_str(line);
            }
            (Some(fence), Some(closer)) if fence == closer => {
                current.push_str(line);
                segments.push(Segment {
                    kind: SegmentKind::Code,
                    text: std::mem::take(&mut current),
                });
                open_fence = None;
            }
            _ => current.push_str(line),
        }
    }

    if !current.is_empty() {
        segments.push(Segment {
            kind: if open_fence.is_some() {
                SegmentKind::Code
            } else {
                SegmentKind::Text
            },
            text: current,
        });
    }

    segments
}
