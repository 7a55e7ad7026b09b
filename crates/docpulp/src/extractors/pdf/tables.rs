//! PDF table detection.
//!
//! Try-fallback strategy: line-grid detection first (stroked rulings
//! clustered into a cell grid), and only when that finds nothing, a
//! text-alignment pass that looks for consecutive rows of x-aligned spans.
//! Detected bboxes are reported so page text extraction can exclude the
//! spans that were consumed by a table.

use super::content::{PageContent, Ruling, TextSpan};

/// Position tolerance when clustering ruling coordinates.
const LINE_CLUSTER_TOLERANCE: f64 = 2.0;

/// Expansion applied to segment bboxes when grouping them into one table
/// candidate.
const GROUP_EXPAND: f64 = 5.0;

/// Vertical tolerance when collecting spans into text lines.
const ROW_CLUSTER_TOLERANCE: f64 = 3.0;

/// Column starts must agree within this much across rows for the text
/// strategy.
const COLUMN_ALIGN_TOLERANCE: f64 = 10.0;

/// A detected table: cell texts plus the device-space bbox it occupies.
#[derive(Debug, Clone)]
pub struct DetectedTable {
    /// (x0, y0, x1, y1) with y increasing upwards.
    pub bbox: (f64, f64, f64, f64),
    pub rows: Vec<Vec<String>>,
}

impl DetectedTable {
    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.bbox.1 && y <= self.bbox.3
    }
}

/// Detect tables with the line strategy, falling back to text alignment
/// when no ruled table exists.
pub fn detect_tables(content: &PageContent) -> Vec<DetectedTable> {
    let ruled = detect_by_lines(content);
    if !ruled.is_empty() {
        return ruled;
    }
    detect_by_text(content)
}

/// Group rulings into candidates and read each candidate's grid.
fn detect_by_lines(content: &PageContent) -> Vec<DetectedTable> {
    if content.rulings.is_empty() {
        return Vec::new();
    }

    let mut tables = Vec::new();
    for group in group_rulings(&content.rulings) {
        if let Some(table) = grid_from_group(&group, &content.spans) {
            tables.push(table);
        }
    }
    tables
}

/// Merge segments whose expanded bboxes touch into connected groups.
fn group_rulings(rulings: &[Ruling]) -> Vec<Vec<Ruling>> {
    let mut groups: Vec<(Vec<Ruling>, (f64, f64, f64, f64))> = Vec::new();

    for &ruling in rulings {
        let bbox = (
            ruling.x0 - GROUP_EXPAND,
            ruling.y0 - GROUP_EXPAND,
            ruling.x1 + GROUP_EXPAND,
            ruling.y1 + GROUP_EXPAND,
        );
        let intersecting: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, (_, gb))| boxes_intersect(bbox, *gb))
            .map(|(i, _)| i)
            .collect();

        match intersecting.first().copied() {
            None => groups.push((vec![ruling], bbox)),
            Some(first) => {
                // Fold the other intersecting groups into the first; the
                // removed indices are all greater than `first`.
                for &idx in intersecting.iter().skip(1).rev() {
                    let (segs, gb) = groups.remove(idx);
                    groups[first].0.extend(segs);
                    groups[first].1 = union_boxes(groups[first].1, gb);
                }
                groups[first].0.push(ruling);
                groups[first].1 = union_boxes(groups[first].1, bbox);
            }
        }
    }

    groups.into_iter().map(|(segs, _)| segs).collect()
}

fn boxes_intersect(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> bool {
    a.0 <= b.2 && b.0 <= a.2 && a.1 <= b.3 && b.1 <= a.3
}

fn union_boxes(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> (f64, f64, f64, f64) {
    (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3))
}

/// Turn one ruling group into a table if it forms a grid with at least two
/// cells and some text content.
fn grid_from_group(group: &[Ruling], spans: &[TextSpan]) -> Option<DetectedTable> {
    let xs = cluster_positions(
        group
            .iter()
            .filter(|r| r.is_vertical())
            .map(|r| (r.x0 + r.x1) / 2.0)
            .collect(),
    );
    let ys = cluster_positions(
        group
            .iter()
            .filter(|r| r.is_horizontal())
            .map(|r| (r.y0 + r.y1) / 2.0)
            .collect(),
    );

    // A grid needs at least 2x1 or 1x2 cells; a lone rectangle is not a
    // table.
    if xs.len() < 2 || ys.len() < 2 || (xs.len() < 3 && ys.len() < 3) {
        return None;
    }

    let bbox = (xs[0], ys[0], *xs.last()?, *ys.last()?);

    // Row bands run top to bottom (descending y), columns left to right.
    let mut rows = Vec::with_capacity(ys.len() - 1);
    for row_idx in (0..ys.len() - 1).rev() {
        let (y_low, y_high) = (ys[row_idx], ys[row_idx + 1]);
        let mut row = Vec::with_capacity(xs.len() - 1);
        for col_idx in 0..xs.len() - 1 {
            let (x_low, x_high) = (xs[col_idx], xs[col_idx + 1]);
            let cell_spans: Vec<&TextSpan> = spans
                .iter()
                .filter(|s| {
                    let cy = s.center_y();
                    s.x >= x_low - 1.0 && s.x < x_high - 1.0 && cy >= y_low && cy <= y_high
                })
                .collect();
            row.push(assemble_lines(&cell_spans));
        }
        rows.push(row);
    }

    let has_text = rows.iter().flatten().any(|cell| !cell.trim().is_empty());
    if !has_text {
        return None;
    }

    Some(DetectedTable { bbox, rows })
}

/// Cluster 1-D positions into representative coordinates.
fn cluster_positions(mut values: Vec<f64>) -> Vec<f64> {
    if values.is_empty() {
        return values;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut clusters: Vec<f64> = vec![values[0]];
    for value in values.into_iter().skip(1) {
        let last = *clusters.last().expect("clusters is non-empty");
        // Rulings repeat at near-identical coordinates; the first
        // representative wins.
        if (value - last).abs() > LINE_CLUSTER_TOLERANCE {
            clusters.push(value);
        }
    }
    clusters
}

/// Text-alignment fallback: consecutive lines with the same column count
/// (≥ 2) and aligned column starts.
fn detect_by_text(content: &PageContent) -> Vec<DetectedTable> {
    let lines = lines_of_spans(&content.spans);
    if lines.len() < 2 {
        return Vec::new();
    }

    let mut tables = Vec::new();
    let mut run_start = 0usize;

    let mut idx = 1;
    while idx <= lines.len() {
        let extends_run = idx < lines.len() && rows_align(&lines[run_start], &lines[idx]);
        if !extends_run {
            let run = &lines[run_start..idx];
            if run.len() >= 2 && run[0].len() >= 2 {
                tables.push(table_from_rows(run));
            }
            run_start = idx;
        }
        idx += 1;
    }

    tables
}

fn rows_align(reference: &[&TextSpan], candidate: &[&TextSpan]) -> bool {
    if reference.len() != candidate.len() || reference.len() < 2 {
        return false;
    }
    reference
        .iter()
        .zip(candidate.iter())
        .all(|(a, b)| (a.x - b.x).abs() <= COLUMN_ALIGN_TOLERANCE)
}

fn table_from_rows(rows: &[Vec<&TextSpan>]) -> DetectedTable {
    let mut bbox = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for span in rows.iter().flatten() {
        bbox.0 = bbox.0.min(span.x);
        bbox.1 = bbox.1.min(span.y - span.size * 0.5);
        bbox.2 = bbox.2.max(span.x + approx_width(span));
        bbox.3 = bbox.3.max(span.y + span.size);
    }

    let cells = rows
        .iter()
        .map(|row| row.iter().map(|span| span.text.trim().to_string()).collect())
        .collect();

    DetectedTable { bbox, rows: cells }
}

fn approx_width(span: &TextSpan) -> f64 {
    span.text.chars().count() as f64 * span.size * 0.6
}

/// Group spans into visual lines (descending y), each line sorted by x.
pub(super) fn lines_of_spans(spans: &[TextSpan]) -> Vec<Vec<&TextSpan>> {
    let mut ordered: Vec<&TextSpan> = spans.iter().collect();
    ordered.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<Vec<&TextSpan>> = Vec::new();
    for span in ordered {
        match lines.last_mut() {
            Some(line) if (line[0].y - span.y).abs() <= ROW_CLUSTER_TOLERANCE => line.push(span),
            _ => lines.push(vec![span]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    }
    lines
}

/// Join spans into readable text: lines separated by `\n`, spans within a
/// line separated by a space when a visible gap exists.
pub(super) fn assemble_lines(spans: &[&TextSpan]) -> String {
    let owned: Vec<TextSpan> = spans.iter().map(|s| (*s).clone()).collect();
    let lines = lines_of_spans(&owned);

    let mut out = String::new();
    for (line_idx, line) in lines.iter().enumerate() {
        if line_idx > 0 {
            out.push('\n');
        }
        let mut cursor: Option<f64> = None;
        for span in line {
            if let Some(prev_end) = cursor {
                if span.x - prev_end > span.size * 0.2 {
                    out.push(' ');
                }
            }
            out.push_str(span.text.trim_end());
            cursor = Some(span.x + approx_width(span));
        }
    }
    out.trim().to_string()
}
