use std::io::Cursor;

use docx_rs::{BreakType, Docx, Paragraph, Run, Style, StyleType};

use crate::error::ExportError;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const FILENAME_WORDS: usize = 5;

/// Build a minimal Word document: title, subtitle, and the body as one plain paragraph.
/// Markdown in `body` is not interpreted; line breaks are kept inside the paragraph.
pub fn export_docx(title: &str, subtitle: &str, body: &str) -> Result<Vec<u8>, ExportError> {
    let mut paragraph = Paragraph::new();
    let mut lines = body.lines().peekable();
    while let Some(line) = lines.next() {
        let mut run = Run::new().add_text(line);
        if lines.peek().is_some() {
            run = run.add_break(BreakType::TextWrapping);
        }
        paragraph = paragraph.add_run(run);
    }

    let docx = Docx::new()
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .size(36)
                .bold(),
        )
        .add_style(
            Style::new("Heading2", StyleType::Paragraph)
                .name("Heading 2")
                .size(28)
                .bold(),
        )
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(title))
                .style("Heading1"),
        )
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(subtitle))
                .style("Heading2"),
        )
        .add_paragraph(paragraph);

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| ExportError(Box::new(e)))?;
    Ok(buf.into_inner())
}

/// File name from the first few words of the request (or the query when the
/// request is blank), reduced to alphanumerics and underscores.
pub fn export_filename(query: &str, request: &str) -> String {
    let source = if request.trim().is_empty() {
        query
    } else {
        request
    };

    let words: Vec<String> = source
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .take(FILENAME_WORDS)
        .collect();

    if words.is_empty() {
        "analysis.docx".to_string()
    } else {
        format!("analysis_{}.docx", words.join("_"))
    }
}
