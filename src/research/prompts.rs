use crate::error::PromptTooLargeError;
use crate::store::types::Match;

use super::evidence::{group_by_table, source_tables};
use super::OutputFormat;

pub const ROLE_PROMPT: &str = "Act as an expert sinologist specialised in classical Chinese texts, \
their philology, commentaries and intellectual history.";

/// Everything the language model gets for one submission.
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    pub query: &'a str,
    pub request: &'a str,
    pub matches: &'a [Match],
    pub output_format: &'a OutputFormat,
    pub response_language: &'a str,
}

/// Render the prompt. Evidence is never cut; an oversized prompt is an error.
pub fn assemble_prompt(
    req: &PromptRequest<'_>,
    max_chars: usize,
) -> Result<String, PromptTooLargeError> {
    let mut out = String::new();

    out.push_str(ROLE_PROMPT);
    out.push_str("\n\n");

    out.push_str("TASK:\n");
    out.push_str(&format!(
        "Interpret the character(s) or phrase: \"{}\".\n",
        req.query
    ));
    out.push_str(&format!("User's specific request: \"{}\"\n\n", req.request));

    out.push_str("CONTEXT RETRIEVED FROM THE DATABASE (JSON, one row per line, grouped by source table):\n");
    for group in group_by_table(req.matches) {
        out.push_str(&format!(
            "\nSource table: {} ({} rows)\n```json\n",
            group.table,
            group.rows.len()
        ));
        for row in &group.rows {
            out.push_str(row);
            out.push('\n');
        }
        out.push_str("```\n");
    }
    out.push('\n');

    let mut instructions = vec![
        "Base your answer EXCLUSIVELY on the context provided above. \
         If the information is not in the JSON, say so explicitly."
            .to_string(),
    ];
    let tables = source_tables(req.matches);
    if tables.len() > 1 {
        instructions.push(format!(
            "The context comes from several sources ({}). Cite the source table for every passage you rely on.",
            tables.join(", ")
        ));
    }
    instructions.push(format!(
        "Desired output format: {}.",
        req.output_format.label()
    ));
    instructions.push(format!(
        "Language of the response: {}.",
        req.response_language
    ));

    out.push_str("INSTRUCTIONS:\n");
    for (i, line) in instructions.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, line));
    }

    let chars = out.chars().count();
    if chars > max_chars {
        return Err(PromptTooLargeError {
            chars,
            limit: max_chars,
        });
    }
    Ok(out)
}
