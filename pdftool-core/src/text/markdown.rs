//! Markdown export of extracted text.
//!
//! Runs sharing a baseline are joined into lines, large vertical gaps become
//! paragraph breaks. Headings are detected from font size first; when a
//! document uses a single size, short lines opening a paragraph are promoted
//! instead.

use super::extraction::{PageText, TextExtraction, TextRun};

#[derive(Debug, Clone, PartialEq)]
struct Line {
    text: String,
    font_size: f64,
}

/// Renders the extraction as Markdown.
pub fn to_markdown(extraction: &TextExtraction) -> String {
    let mut lines: Vec<Option<Line>> = Vec::new();
    for page in &extraction.pages {
        if !lines.is_empty() {
            lines.push(None);
        }
        lines.extend(page_lines(page));
    }
    format_lines(&lines)
}

/// Lines of a page; `None` marks a paragraph break.
fn page_lines(page: &PageText) -> Vec<Option<Line>> {
    let mut lines = Vec::new();
    let mut current: Option<(Line, &TextRun)> = None;

    for run in &page.runs {
        let size = run.font_size.max(1.0);
        match current.take() {
            Some((mut line, last)) if (run.y - last.y).abs() <= size * 0.5 => {
                let gap = run.x - (last.x + last.width);
                if gap > size * 0.15
                    && !line.text.ends_with(char::is_whitespace)
                    && !run.text.starts_with(char::is_whitespace)
                {
                    line.text.push(' ');
                }
                line.text.push_str(&run.text);
                line.font_size = line.font_size.max(run.font_size);
                current = Some((line, run));
            }
            Some((line, last)) => {
                let paragraph_break = (last.y - run.y).abs() > size * 1.8;
                lines.push(Some(line));
                if paragraph_break {
                    lines.push(None);
                }
                current = Some((new_line(run), run));
            }
            None => current = Some((new_line(run), run)),
        }
    }
    if let Some((line, _)) = current {
        lines.push(Some(line));
    }
    lines
}

fn new_line(run: &TextRun) -> Line {
    Line {
        text: run.text.clone(),
        font_size: run.font_size,
    }
}

fn is_page_number(text: &str) -> bool {
    !text.is_empty() && text.len() <= 4 && text.chars().all(|c| c.is_ascii_digit())
}

/// Bulleted or numbered list item (`•`, `-`, `1.`, `2)`, `a)`).
fn list_item(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if matches!(first, '•' | '–' | '-' | '*' | '·' | '▪') {
        let rest = chars.as_str().trim_start();
        return (!rest.is_empty()).then(|| format!("- {rest}"));
    }
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        let rest = &text[digits.len()..];
        if let Some(body) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return Some(format!("{digits}. {}", body.trim_start()));
        }
    }
    let second = chars.next();
    if first.is_ascii_alphabetic() && matches!(second, Some(')')) {
        return Some(text.to_string());
    }
    None
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

fn heading_levels(lines: &[Option<Line>]) -> Vec<u8> {
    let body: Vec<&Line> = lines
        .iter()
        .flatten()
        .filter(|l| {
            let t = l.text.trim();
            !t.is_empty() && !is_page_number(t) && list_item(t).is_none()
        })
        .collect();
    let body_size = median(body.iter().map(|l| l.font_size).collect());
    let body_length = median(body.iter().map(|l| l.text.trim().chars().count() as f64).collect());
    let sizes_vary =
        body_size.is_some_and(|m| body.iter().any(|l| (l.font_size - m).abs() > 0.5));

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let Some(line) = line else {
                return 0;
            };
            let text = line.text.trim();
            if text.is_empty() || is_page_number(text) || list_item(text).is_some() {
                return 0;
            }
            let (Some(size), Some(length)) = (body_size, body_length) else {
                return 0;
            };

            if sizes_vary {
                return if line.font_size >= size * 1.5 {
                    1
                } else if line.font_size >= size * 1.2 {
                    2
                } else {
                    0
                };
            }

            let threshold = if length > 20.0 { length / 2.0 } else { 0.0 };
            let opens_paragraph = index == 0 || lines[index - 1].is_none();
            let chars = text.chars().count() as f64;
            if threshold > 0.0 && opens_paragraph && chars >= 3.0 && chars <= threshold {
                if chars <= threshold / 2.0 {
                    1
                } else {
                    2
                }
            } else {
                0
            }
        })
        .collect()
}

fn format_lines(lines: &[Option<Line>]) -> String {
    let levels = heading_levels(lines);
    let mut out = String::new();

    for (line, level) in lines.iter().zip(levels) {
        let Some(line) = line else {
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            continue;
        };
        let text = line.text.trim();
        if text.is_empty() || is_page_number(text) {
            continue;
        }

        if level > 0 {
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            out.push_str(&"#".repeat(level as usize));
            out.push(' ');
            out.push_str(text);
            out.push_str("\n\n");
        } else if let Some(item) = list_item(text) {
            out.push_str(&item);
            out.push('\n');
        } else {
            out.push_str(text);
            out.push('\n');
        }
    }

    while out.contains("\n\n\n") {
        out = out.replace("\n\n\n", "\n\n");
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}
