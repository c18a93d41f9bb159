//! Normalizes GitHub-flavored markdown tables.
//!
//! Detection is two consecutive lines: a header row with at least two pipes
//! followed by a separator row of pipes, dashes, and colons. Re-emission
//! normalizes spacing and separator tokens; cell content, column and row
//! counts are preserved exactly.

use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, ProcessingError};
use crate::processor::{ProcessContext, Processor, ProcessorOutput};

/// Options for [`TableProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Whether the processor participates in the pipeline.
    pub enabled: bool,
    /// Execution priority.
    pub priority: i32,
    /// Emit structure warnings (column count mismatches, empty headers).
    pub validate_structure: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 30,
            validate_structure: true,
        }
    }
}

/// Column alignment parsed from the separator row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// `:---` or bare `---`.
    Left,
    /// `:---:`
    Center,
    /// `---:`
    Right,
}

/// One parsed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Byte offset of the header row.
    pub start: usize,
    /// Byte offset just past the last data row (newline included).
    pub end: usize,
    /// 1-indexed line of the header row.
    pub start_line: usize,
    /// Header cells.
    pub headers: Vec<String>,
    /// Per-column alignment.
    pub alignments: Vec<Alignment>,
    /// Data rows.
    pub rows: Vec<Vec<String>>,
}

/// A line that could be a table row: at least two pipes.
fn is_table_row(line: &str) -> bool {
    line.matches('|').count() >= 2
}

/// A separator row: pipes plus only dashes, colons, and whitespace.
fn is_table_separator(line: &str) -> bool {
    if !line.contains('|') {
        return false;
    }
    let without_pipes: String = line.chars().filter(|&c| c != '|').collect();
    let trimmed = without_pipes.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c == '-' || c == ':' || c.is_whitespace())
}

/// Split a row into cells, dropping the empty edge cells produced by
/// leading/trailing pipes.
fn parse_row(line: &str) -> Vec<String> {
    let cells: Vec<&str> = line.split('|').map(|cell| cell.trim()).collect();
    let len = cells.len();
    cells
        .into_iter()
        .enumerate()
        .filter(|(i, cell)| !(cell.is_empty() && (*i == 0 || *i == len - 1)))
        .map(|(_, cell)| cell.to_string())
        .collect()
}

fn parse_alignments(line: &str) -> Vec<Alignment> {
    parse_row(line)
        .into_iter()
        .map(|cell| {
            if cell.starts_with(':') && cell.ends_with(':') {
                Alignment::Center
            } else if cell.ends_with(':') {
                Alignment::Right
            } else {
                Alignment::Left
            }
        })
        .collect()
}

/// Find every table in `content`.
pub fn find_tables(content: &str) -> Vec<Table> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut tables = Vec::new();
    let mut pos = 0usize;
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i].trim();
        if is_table_row(line)
            && i + 1 < lines.len()
            && is_table_separator(lines[i + 1].trim())
        {
            let headers = parse_row(line);
            let alignments = parse_alignments(lines[i + 1].trim());
            if headers.len() == alignments.len() {
                let start = pos;
                let mut end = pos + lines[i].len() + 1 + lines[i + 1].len() + 1;
                let mut rows = Vec::new();
                let mut j = i + 2;
                while j < lines.len() {
                    let row_line = lines[j].trim();
                    if row_line.is_empty() || !is_table_row(row_line) {
                        break;
                    }
                    rows.push(parse_row(row_line));
                    end += lines[j].len() + 1;
                    j += 1;
                }
                tables.push(Table {
                    start,
                    end: end.min(content.len()),
                    start_line: i + 1,
                    headers,
                    alignments,
                    rows,
                });
                pos = end;
                i = j;
                continue;
            }
        }
        pos += lines[i].len() + 1;
        i += 1;
    }

    tables
}

/// Re-emit a table with normalized spacing and canonical separators.
fn normalize_table(table: &Table) -> String {
    let mut out = String::new();

    out.push('|');
    for header in &table.headers {
        out.push_str(&format!(" {header} |"));
    }
    out.push('\n');

    out.push('|');
    for alignment in &table.alignments {
        let token = match alignment {
            Alignment::Center => " :---: |",
            Alignment::Right => " ---: |",
            Alignment::Left => " :--- |",
        };
        out.push_str(token);
    }
    out.push('\n');

    for row in &table.rows {
        out.push('|');
        for cell in row {
            out.push_str(&format!(" {cell} |"));
        }
        out.push('\n');
    }

    out
}

/// Re-emits detected tables in a normalized form and records structure
/// warnings for ragged rows and empty headers.
#[derive(Debug, Clone, Default)]
pub struct TableProcessor {
    options: TableOptions,
}

impl TableProcessor {
    /// Create the processor with the given options.
    pub fn new(options: TableOptions) -> Self {
        Self { options }
    }

    fn validate(&self, table: &Table, ctx: &ProcessContext<'_>) -> Vec<Diagnostic> {
        let mut warnings = Vec::new();
        let expected = table.headers.len();

        for (index, row) in table.rows.iter().enumerate() {
            if row.len() != expected {
                warnings.push(
                    Diagnostic::new(format!(
                        "row {} has {} columns, expected {}",
                        index + 1,
                        row.len(),
                        expected
                    ))
                    .with_processor(self.name())
                    .with_file(ctx.source_file)
                    .with_line(table.start_line),
                );
            }
        }

        for (index, header) in table.headers.iter().enumerate() {
            if header.trim().is_empty() {
                warnings.push(
                    Diagnostic::new(format!("column {} has an empty header", index + 1))
                        .with_processor(self.name())
                        .with_file(ctx.source_file)
                        .with_line(table.start_line),
                );
            }
        }

        warnings
    }
}

impl Processor for TableProcessor {
    fn name(&self) -> &'static str {
        "tables"
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
        let tables = find_tables(content);
        if tables.is_empty() {
            return Ok(ProcessorOutput::unchanged(content));
        }

        let mut output = ProcessorOutput::default();
        let mut rebuilt = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for table in &tables {
            if self.options.validate_structure {
                output.warnings.extend(self.validate(table, ctx));
            }

            rebuilt.push_str(&content[cursor..table.start]);
            let mut normalized = normalize_table(table);
            // A table ending at EOF without a trailing newline keeps that
            // shape after normalization.
            if table.end == content.len() && !content.ends_with('\n') {
                normalized.pop();
            }
            rebuilt.push_str(&normalized);
            cursor = table.end;
        }
        rebuilt.push_str(&content[cursor..]);
        output.content = rebuilt;

        log::debug!(
            "table pass normalized {} table(s) in {}",
            tables.len(),
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

    fn run(content: &str) -> ProcessorOutput {
        let frontmatter = Frontmatter::new();
        let ctx = ProcessContext {
            source_file: Path::new("post.md"),
            project_root: Path::new("."),
            frontmatter: &frontmatter,
        };
        TableProcessor::default().process(content, &ctx).unwrap()
    }

    #[test]
    fn finds_table_with_alignments_and_rows() {
        let content = "| Name | Age | City |\n|:-----|:---:|-----:|\n| Ann | 34 | Oslo |\n| Bo | 5 | Pune |\n\nafter\n";
        let tables = find_tables(content);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.headers, vec!["Name", "Age", "City"]);
        assert_eq!(
            table.alignments,
            vec![Alignment::Left, Alignment::Center, Alignment::Right]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["Bo", "5", "Pune"]);
    }

    #[test]
    fn header_without_separator_is_not_a_table() {
        let tables = find_tables("| a | b |\njust text\n");
        assert!(tables.is_empty());
    }

    #[test]
    fn normalization_preserves_cells_and_counts() {
        let content = "|Name|Age|\n|---|---:|\n|Ann|34|\n";
        let output = run(content);
        assert_eq!(output.content, "| Name | Age |\n| :--- | ---: |\n| Ann | 34 |\n");
    }

    #[test]
    fn ragged_row_warns_but_never_errors() {
        let content = "| a | b | c |\n|---|---|---|\n| 1 | 2 |\n";
        let output = run(content);
        assert!(output.errors.is_empty());
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.contains("has 2 columns, expected 3"));
        // The short row is re-emitted as-is.
        assert!(output.content.contains("| 1 | 2 |\n"));
    }

    #[test]
    fn empty_header_warns() {
        let content = "| a |  | c |\n|---|---|---|\n| 1 | 2 | 3 |\n";
        let output = run(content);
        assert!(
            output
                .warnings
                .iter()
                .any(|w| w.message.contains("column 2 has an empty header")),
            "{:?}",
            output.warnings
        );
    }

    #[test]
    fn table_ends_at_first_non_row_line() {
        let content = "| a | b |\n|---|---|\n| 1 | 2 |\nplain text\n| x | y |\n";
        let tables = find_tables(content);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 1);
    }

    #[test]
    fn surrounding_content_is_untouched() {
        let content = "before\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nafter\n";
        let output = run(content);
        assert!(output.content.starts_with("before\n\n| a | b |\n"));
        assert!(output.content.ends_with("\nafter\n"));
    }
}
