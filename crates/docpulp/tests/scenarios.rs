//! End-to-end parse scenarios driven through the orchestrator with stub
//! OCR services.

mod common;

use std::sync::Arc;

use common::{
    build_docx, build_pdf, docx_paragraph, docx_table, noisy_bytes, pptx_image_rels, pptx_picture, pptx_title,
    FixedOcr, MapOcr, PdfPage, PptxFixture,
};
use docpulp::core::orchestrator::parse_bytes;
use docpulp::ocr::OcrService;
use docpulp::types::ParseOptions;

fn no_ocr() -> Arc<dyn OcrService> {
    Arc::new(FixedOcr(""))
}

#[tokio::test]
async fn markdown_pass_through() {
    let result = parse_bytes(b"# Title\n\nhello", "a.md", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    assert_eq!(result.content, "# Title\n\nhello");
    assert_eq!(result.metadata.page_count, 0);
    assert_eq!(result.metadata.image_count, 0);
    assert_eq!(result.metadata.table_count, 0);
    assert_eq!(result.metadata.ocr_count, 0);
    assert_eq!(result.metadata.caption_count, 0);
    assert!(result.metadata.parse_time_ms >= 0.0);
}

#[tokio::test]
async fn docx_with_one_table_no_images() {
    let body = format!("{}{}", docx_paragraph("Intro."), docx_table(&[&["A", "B"], &["1", "2"]]));
    let docx = build_docx(&body);

    let result = parse_bytes(&docx, "report.docx", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    assert_eq!(result.content, "Intro.\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    assert_eq!(result.metadata.table_count, 1);
    assert_eq!(result.metadata.image_count, 0);
    assert_eq!(result.metadata.page_count, 0);
}

#[tokio::test]
async fn pptx_background_image_filtered() {
    // One slide: title plus a 1920x1080 picture of ~500 KiB.
    let shapes = format!("{}{}", pptx_title("Cover"), pptx_picture("rId5", 1920, 1080));
    let pptx = PptxFixture::new()
        .slide(1, &shapes)
        .raw_part(
            "ppt/slides/_rels/slide1.xml.rels",
            pptx_image_rels(&[("rId5", "../media/image1.png")]),
        )
        .raw_part("ppt/media/image1.png", noisy_bytes(500 * 1024))
        .build();

    let result = parse_bytes(&pptx, "deck.pptx", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();

    assert!(result.content.contains("## Slide 1\n\n### Cover"));
    assert!(!result.content.contains("[图片"));
    assert_eq!(result.metadata.image_count, 0);
    assert_eq!(result.metadata.ocr_count, 0);
    assert_eq!(result.metadata.page_count, 1);
}

#[tokio::test]
async fn pdf_two_pages_with_figure() {
    // Page 1 carries text; page 2 carries a 600x400 figure whose OCR
    // resolves to "STOP".
    let pdf = build_pdf(vec![
        PdfPage::text("Hello."),
        PdfPage::image_only(600, 400, [180, 20, 20]),
    ]);

    let ocr: Arc<dyn OcrService> = Arc::new(FixedOcr("STOP"));
    let result = parse_bytes(&pdf, "doc.pdf", &ParseOptions::default(), ocr)
        .await
        .unwrap();

    assert_eq!(result.content, "Hello.\n\n--- Page Break ---\n\n[图像 1 OCR 内容]:\nSTOP");
    assert_eq!(result.metadata.page_count, 2);
    assert_eq!(result.metadata.image_count, 1);
    assert_eq!(result.metadata.ocr_count, 1);
    assert_eq!(result.metadata.table_count, 0);
}

#[test]
fn narrative_keyword_rule() {
    assert_eq!(
        docpulp::narrative::optimize("神经元/激活函数/前向传播"),
        "神经元、激活函数、前向传播等内容。"
    );
    // Unspaced ASCII slashes are paths or fractions, not keyword runs.
    let untouched = docpulp::narrative::optimize("a/b/c/d");
    assert_eq!(untouched, "a/b/c/d");
}

#[tokio::test]
async fn ocr_failure_isolation() {
    // Two pictures on one slide; recognition fails (empty) for the first
    // and returns "ok" for the second.
    let first = noisy_bytes(6 * 1024);
    let second = noisy_bytes(8 * 1024);
    let shapes = format!(
        "{}{}{}",
        pptx_title("Figures"),
        pptx_picture("rId1", 600, 400),
        pptx_picture("rId2", 600, 400),
    );
    let pptx = PptxFixture::new()
        .slide(1, &shapes)
        .raw_part(
            "ppt/slides/_rels/slide1.xml.rels",
            pptx_image_rels(&[("rId1", "../media/one.jpg"), ("rId2", "../media/two.jpg")]),
        )
        .raw_part("ppt/media/one.jpg", first.clone())
        .raw_part("ppt/media/two.jpg", second.clone())
        .build();

    let ocr: Arc<dyn OcrService> = Arc::new(MapOcr::new(&[(second.len(), "ok")]));
    let result = parse_bytes(&pptx, "deck.pptx", &ParseOptions::default(), ocr)
        .await
        .unwrap();

    assert_eq!(result.metadata.image_count, 2);
    assert_eq!(result.metadata.ocr_count, 1);
    // Only the second placeholder renders (normalized by the narrative
    // pass).
    assert!(result.content.contains("[图片 2 内容]：\nok"));
    assert!(!result.content.contains("[图片 1"));
}

#[tokio::test]
async fn ocr_disabled_drops_placeholders_but_counts_images() {
    let pdf = build_pdf(vec![PdfPage::image_only(600, 400, [10, 10, 200])]);

    let options = ParseOptions {
        enable_ocr: false,
        ..ParseOptions::default()
    };
    let ocr: Arc<dyn OcrService> = Arc::new(FixedOcr("SHOULD NOT APPEAR"));
    let result = parse_bytes(&pdf, "doc.pdf", &options, ocr).await.unwrap();

    assert_eq!(result.metadata.image_count, 1);
    assert_eq!(result.metadata.ocr_count, 0);
    assert!(!result.content.contains("SHOULD NOT APPEAR"));
}

#[tokio::test]
async fn enable_caption_is_a_noop() {
    let options = ParseOptions {
        enable_caption: true,
        ..ParseOptions::default()
    };
    let result = parse_bytes(b"hello", "a.md", &options, no_ocr()).await.unwrap();
    assert_eq!(result.metadata.caption_count, 0);
}

#[tokio::test]
async fn doc_extension_routes_through_docx() {
    let docx = build_docx(&docx_paragraph("Legacy name."));
    let result = parse_bytes(&docx, "old.doc", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();
    assert_eq!(result.content, "Legacy name.");
}

#[tokio::test]
async fn gb18030_markdown_decodes() {
    let (encoded, _, _) = encoding_rs::GB18030.encode("# 中文标题");
    let result = parse_bytes(&encoded, "cn.md", &ParseOptions::default(), no_ocr())
        .await
        .unwrap();
    assert_eq!(result.content, "# 中文标题");
}
