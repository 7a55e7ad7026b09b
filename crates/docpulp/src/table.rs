//! Table normalizer: 2-D cell arrays to strict GFM Markdown.
//!
//! Downstream LLM consumers require column-aligned tables; ragged or empty
//! rows would cascade into unparseable output, so they are dropped here
//! rather than propagated.

/// Convert a 2-D array of cell strings into a Markdown table.
///
/// The first row is the header. Returns an empty string when the table is
/// judged meaningless (no rows, or a blank header). Data rows are skipped
/// when empty, ragged (length differs from the header) or all-blank.
/// Newlines inside cells become literal `<br>` tags so row structure
/// survives.
pub fn cells_to_markdown(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let cleaned: Vec<Vec<String>> = rows.iter().map(|row| row.iter().map(|c| clean_cell(c)).collect()).collect();

    let header = &cleaned[0];
    if header.is_empty() || header.iter().all(|c| c.is_empty()) {
        tracing::debug!("table header empty, skipping conversion");
        return String::new();
    }

    let num_columns = header.len();
    let mut md = String::new();
    md.push_str("| ");
    md.push_str(&header.join(" | "));
    md.push_str(" |\n");
    md.push_str("| ");
    md.push_str(&vec!["---"; num_columns].join(" | "));
    md.push_str(" |\n");

    let mut skipped = 0usize;
    for row in &cleaned[1..] {
        if row.is_empty() || row.len() != num_columns || row.iter().all(|c| c.is_empty()) {
            skipped += 1;
            continue;
        }
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
    }

    if skipped > 0 {
        tracing::debug!(skipped, "dropped malformed table rows");
    }

    md
}

fn clean_cell(cell: &str) -> String {
    cell.replace('\n', "<br>").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_simple_table() {
        let md = cells_to_markdown(&rows(&[&["A", "B"], &["1", "2"]]));
        assert_eq!(md, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(cells_to_markdown(&[]), "");
    }

    #[test]
    fn test_blank_header_rejected() {
        let md = cells_to_markdown(&rows(&[&["", "  "], &["1", "2"]]));
        assert_eq!(md, "");
    }

    #[test]
    fn test_ragged_row_skipped() {
        let md = cells_to_markdown(&rows(&[&["A", "B"], &["1", "2", "3"], &["x", "y"]]));
        assert_eq!(md, "| A | B |\n| --- | --- |\n| x | y |\n");
    }

    #[test]
    fn test_all_blank_row_skipped() {
        let md = cells_to_markdown(&rows(&[&["A", "B"], &["", ""], &["1", "2"]]));
        assert_eq!(md, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn test_newline_in_cell_becomes_br() {
        let md = cells_to_markdown(&rows(&[&["A", "B"], &["line1\nline2", "2"]]));
        assert!(md.contains("line1<br>line2"));
    }

    #[test]
    fn test_cells_trimmed() {
        let md = cells_to_markdown(&rows(&[&["  A ", " B "], &[" 1", "2  "]]));
        assert_eq!(md, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn test_markdown_shape_invariant() {
        let md = cells_to_markdown(&rows(&[
            &["h1", "h2", "h3"],
            &["a", "b", "c"],
            &["d", "e", "f"],
        ]));
        let lines: Vec<&str> = md.lines().collect();
        assert!(lines.len() >= 2);

        let pipes = |line: &str| line.matches('|').count();
        let header_pipes = pipes(lines[0]);
        assert_eq!(header_pipes, 4);
        let sep = lines[1].replace(' ', "");
        assert!(sep.starts_with('|'));
        assert!(sep.trim_start_matches('|').trim_end_matches('|').split('|').all(|s| s == "---"));
        for line in &lines[2..] {
            assert_eq!(pipes(line), header_pipes);
        }
    }

    #[test]
    fn test_header_only_table() {
        let md = cells_to_markdown(&rows(&[&["A", "B"]]));
        assert_eq!(md, "| A | B |\n| --- | --- |\n");
    }
}
