//! Narrative post-processor for slide-deck output.
//!
//! Slide decks extract into fragmented keyword lists, bare formulas and
//! unpunctuated short lines. This rule engine rewrites those into text a
//! downstream LLM digests better: keyword runs become enumerations, formula
//! lines get a labelled prefix, image placeholders are normalized and
//! missing terminal punctuation is supplied. Applied to PPTX output only.
//!
//! Rule order matters (later rules see earlier rewrites), and the whole pass
//! is idempotent: `optimize(optimize(x)) == optimize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

static KEYWORDS_CJK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fa5}]{2,}(?:/[\x{4e00}-\x{9fa5}]{2,})+").unwrap());

static KEYWORDS_ASCII: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z]+(?:[ \t][A-Za-z]+)*(?:[ \t]+/[ \t]+[A-Za-z]+(?:[ \t][A-Za-z]+)*)+").unwrap()
});

static ASCII_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*/[ \t]*").unwrap());

static SLIDE_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)@@@\s*Slide[_\s]+(\d+)\s*@@@").unwrap());
static SLIDE_EQ: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)={3,}\s*Slide\s+(\d+)\s*={3,}").unwrap());
static SLIDE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)-{3,}\s*Slide\s+(\d+)\s*-{3,}").unwrap());
static SLIDE_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[\[(]\s*Slide\s+(\d+)\s*[\])]").unwrap());

static PLACEHOLDER_OCR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[图像\s+(\d+)\s+OCR\s+内容\]\s*[:：]").unwrap());
static PLACEHOLDER_EN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Image\s+(\d+)\s+Text\s*:").unwrap());
static PLACEHOLDER_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[Image\s+(\d+)\]\s*[:：]?").unwrap());

const FORMULA_GREEK: &str = "αβγδεθλμσπ∑∏∫";
const FORMULA_INDICATORS: &[char] = &[
    '=', '∑', '∏', '∫', 'α', 'β', 'γ', 'δ', 'ε', 'ζ', 'η', 'θ', 'ι', 'κ', 'λ', 'μ', 'ν', 'ξ', 'ο', 'π', 'ρ', 'σ',
    'τ', 'υ', 'φ', 'χ', 'ψ', 'ω', '±', '≈', '≠', '≤', '≥',
];

const CJK_TERMINALS: &str = "。！？；，、：）】」";
const ASCII_TERMINALS: &str = ".!?;:)]}";

/// Apply every optimization rule, in order.
pub fn optimize(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let text = optimize_keyword_separators(text);
    let text = optimize_slide_separators(&text);
    let text = optimize_formula_notation(&text);
    let text = optimize_image_placeholders(&text);
    optimize_punctuation(&text)
}

/// Rule 1: slash-joined keyword runs become enumerations.
///
/// CJK runs use `、` and the `等内容` suffix; ASCII word groups must be
/// joined by a spaced slash (` / `) so paths and fractions like `a/b` stay
/// untouched.
fn optimize_keyword_separators(text: &str) -> String {
    let text = KEYWORDS_CJK.replace_all(text, |caps: &regex::Captures| {
        format!("{}等内容", caps[0].replace('/', "、"))
    });

    KEYWORDS_ASCII
        .replace_all(&text, |caps: &regex::Captures| {
            format!("{} 等内容", ASCII_SLASH.replace_all(&caps[0], ", "))
        })
        .into_owned()
}

/// Rule 2: normalize slide-separator variants to `## Slide N`.
fn optimize_slide_separators(text: &str) -> String {
    let text = SLIDE_AT.replace_all(text, "## Slide $1");
    let text = SLIDE_EQ.replace_all(&text, "## Slide $1");
    let text = SLIDE_DASH.replace_all(&text, "## Slide $1");
    SLIDE_BRACKET.replace_all(&text, "## Slide $1").into_owned()
}

/// Rule 3: prefix formula-looking lines with `公式：`.
fn optimize_formula_notation(text: &str) -> String {
    // split('\n') rather than lines(): a trailing newline must survive the
    // pass unchanged.
    let lines: Vec<String> = text.split('\n').map(rewrite_formula_line).collect();
    lines.join("\n")
}

fn rewrite_formula_line(line: &str) -> String {
    let stripped = line.trim();

    if stripped.starts_with("公式：")
        || stripped.starts_with('#')
        || stripped.starts_with('-')
        || stripped.starts_with('*')
    {
        return line.to_string();
    }

    let has_indicator = stripped.chars().any(|c| FORMULA_INDICATORS.contains(&c));
    let confirmed = stripped.contains('=') || stripped.chars().any(|c| FORMULA_GREEK.contains(c));

    if has_indicator && confirmed && stripped.chars().count() > 3 {
        let indent = &line[..line.len() - line.trim_start().len()];
        format!("{indent}公式：{stripped}")
    } else {
        line.to_string()
    }
}

/// Rule 4: normalize image placeholders to the `[图片 N 内容]：` form.
fn optimize_image_placeholders(text: &str) -> String {
    let text = PLACEHOLDER_OCR.replace_all(text, "[图片 $1 内容]：");
    let text = PLACEHOLDER_EN.replace_all(&text, "[图片 $1 内容]：");
    PLACEHOLDER_BRACKET.replace_all(&text, "[图片 $1]：").into_owned()
}

/// Rule 5: supply terminal punctuation on bare content lines.
fn optimize_punctuation(text: &str) -> String {
    let lines: Vec<String> = text.split('\n').map(punctuate_line).collect();
    lines.join("\n")
}

fn punctuate_line(line: &str) -> String {
    let stripped = line.trim();

    if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with('-') || stripped.starts_with('*') {
        return line.to_string();
    }

    if let Some(last) = stripped.chars().last() {
        if CJK_TERMINALS.contains(last) || ASCII_TERMINALS.contains(last) {
            return line.to_string();
        }
    }

    if stripped.matches('|').count() >= 2 {
        return line.to_string();
    }

    if stripped.contains('=') || stripped.contains("公式：") {
        return line.to_string();
    }

    let indent = &line[..line.len() - line.trim_start().len()];
    let char_count = stripped.chars().count();
    let is_cjk = stripped.chars().any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c));

    if is_cjk && char_count > 5 {
        format!("{indent}{stripped}。")
    } else if !is_cjk && char_count > 10 {
        format!("{indent}{stripped}.")
    } else {
        line.to_string()
    }
}
