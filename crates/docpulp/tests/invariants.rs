//! Cross-cutting invariants checked end to end.

mod common;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use common::{build_docx, build_pdf, docx_paragraph, docx_table, pptx_title, FixedOcr, PdfPage, PptxFixture};
use docpulp::core::orchestrator::parse_bytes;
use docpulp::ocr::OcrService;
use docpulp::types::ParseOptions;
use serial_test::serial;

fn no_ocr() -> Arc<dyn OcrService> {
    Arc::new(FixedOcr(""))
}

fn request_temp_dirs() -> HashSet<PathBuf> {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().starts_with("docpulp_"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
#[serial]
async fn temp_dir_removed_on_success() {
    let before = request_temp_dirs();

    let pdf = build_pdf(vec![PdfPage::text("cleanup check")]);
    parse_bytes(&pdf, "doc.pdf", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    assert_eq!(request_temp_dirs(), before);
}

#[tokio::test]
#[serial]
async fn temp_dir_removed_on_failure() {
    let before = request_temp_dirs();

    let err = parse_bytes(b"not a pdf at all", "broken.pdf", &ParseOptions::default(), no_ocr()).await;
    assert!(err.is_err());

    assert_eq!(request_temp_dirs(), before);
}

#[tokio::test]
async fn page_order_matches_source_order() {
    let pdf = build_pdf(vec![
        PdfPage::text("alpha"),
        PdfPage::text("bravo"),
        PdfPage::text("charlie"),
        PdfPage::text("delta"),
    ]);

    let result = parse_bytes(&pdf, "doc.pdf", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    let positions: Vec<usize> = ["alpha", "bravo", "charlie", "delta"]
        .iter()
        .map(|word| result.content.find(word).expect("every page present"))
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted, "pages must appear in source order");
    assert_eq!(result.content.matches("--- Page Break ---").count(), 3);
}

#[tokio::test]
async fn table_accounting_matches_fragments() {
    let body = format!(
        "{}{}{}",
        docx_table(&[&["A", "B"], &["1", "2"]]),
        docx_paragraph("between"),
        docx_table(&[&["X", "Y"], &["3", "4"]]),
    );
    let result = parse_bytes(&build_docx(&body), "t.docx", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    assert_eq!(result.metadata.table_count, 2);
    // Emitted table strings have strict GFM shape.
    for table in result.content.split("\n\n").filter(|part| part.starts_with('|')) {
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines.len() >= 2);
        let header_pipes = lines[0].matches('|').count();
        assert!(header_pipes >= 3);
        let separator = lines[1].replace(' ', "");
        assert!(separator
            .trim_start_matches('|')
            .trim_end_matches('|')
            .split('|')
            .all(|cell| cell == "---"));
        for line in &lines[2..] {
            assert_eq!(line.matches('|').count(), header_pipes);
        }
    }
}

#[tokio::test]
async fn image_accounting_never_exceeded_by_ocr() {
    let pdf = build_pdf(vec![
        PdfPage::image_only(600, 400, [1, 2, 3]),
        PdfPage::image_only(800, 500, [4, 5, 6]),
    ]);
    let ocr: Arc<dyn OcrService> = Arc::new(FixedOcr("text"));
    let result = parse_bytes(&pdf, "doc.pdf", &ParseOptions::default(), ocr)
        .await
        .unwrap();

    assert_eq!(result.metadata.image_count, 2);
    assert!(result.metadata.ocr_count <= result.metadata.image_count);
}

#[tokio::test]
async fn broken_page_does_not_poison_the_document() {
    // Slide 1 is healthy; slide 2's XML is malformed, so its page worker
    // fails and contributes nothing.
    let pptx = PptxFixture::new()
        .slide(1, &pptx_title("Healthy"))
        .raw_part("ppt/slides/slide2.xml", "<p:sld><unclosed")
        .build();

    let result = parse_bytes(&pptx, "deck.pptx", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    assert!(result.content.contains("### Healthy"));
    assert!(!result.content.contains("## Slide 2"));
    assert_eq!(result.metadata.page_count, 2);
    assert_eq!(result.metadata.image_count, 0);
}

#[tokio::test]
async fn markdown_decode_is_exact_for_utf8() {
    let input = "# Exactness\n\n`code` **bold** — ünïcode 中文\n";
    let result = parse_bytes(input.as_bytes(), "x.markdown", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();
    assert_eq!(result.content, input);
}

#[tokio::test]
async fn optimizer_idempotent_on_full_pipeline_output() {
    let shapes = format!(
        "{}{}",
        pptx_title("Deck"),
        r#"<p:sp><p:txBody><a:p><a:r><a:t>y = wx + b</a:t></a:r></a:p>
           <a:p><a:r><a:t>神经元/激活函数/前向传播</a:t></a:r></a:p></p:txBody></p:sp>"#
    );
    let pptx = PptxFixture::new().slide(1, &shapes).build();

    let result = parse_bytes(&pptx, "deck.pptx", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    // The pipeline already ran the optimizer once; a second application
    // must be a fixed point.
    assert_eq!(docpulp::narrative::optimize(&result.content), result.content);
}
