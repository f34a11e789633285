use poise::serenity_prelude as serenity;
use poise::CreateReply;
use tracing::{info, warn};

use crate::commands::send_chunked;
use crate::error::{report, ResearchError};
use crate::research::evidence::evidence_json;
use crate::research::export::{export_docx, export_filename};
use crate::research::{AnalysisResult, OutputFormat, Outcome, Submission};
use crate::state::Context;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum FormatChoice {
    #[name = "Brief explanation (dictionary)"]
    Brief,
    #[name = "Short academic essay"]
    Essay,
    #[name = "Detailed explanation of the request"]
    Detailed,
    #[name = "Other (describe in custom_format)"]
    Other,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum LanguageChoice {
    #[name = "Español"]
    Spanish,
    #[name = "English"]
    English,
    #[name = "中文"]
    Chinese,
    #[name = "Français"]
    French,
}

impl LanguageChoice {
    fn label(self) -> &'static str {
        match self {
            LanguageChoice::Spanish => "Español",
            LanguageChoice::English => "English",
            LanguageChoice::Chinese => "中文",
            LanguageChoice::French => "Français",
        }
    }
}

fn output_format(choice: FormatChoice, custom: Option<String>) -> OutputFormat {
    match choice {
        FormatChoice::Brief => OutputFormat::BriefDictionary,
        FormatChoice::Essay => OutputFormat::AcademicEssay,
        FormatChoice::Detailed => OutputFormat::DetailedExplanation,
        FormatChoice::Other => OutputFormat::Other(custom.unwrap_or_default()),
    }
}

fn parse_tables(raw: &str) -> Vec<String> {
    raw.split(',').map(|t| t.trim().to_string()).collect()
}

/// Search classical texts for a character and analyse the matches
#[poise::command(slash_command, guild_only)]
#[allow(clippy::too_many_arguments)]
pub async fn analyze(
    ctx: Context<'_>,
    #[description = "Character(s) or phrase to look for"] query: String,
    #[description = "What you want to know"] request: String,
    #[description = "Tables to search, comma-separated"]
    #[autocomplete = "autocomplete_tables"]
    tables: String,
    #[description = "Output format"] format: FormatChoice,
    #[description = "Custom output format (when format is Other)"] custom_format: Option<String>,
    #[description = "Response language (default Español)"] language: Option<LanguageChoice>,
    #[description = "Attach the rows used as evidence"] show_evidence: Option<bool>,
    #[description = "Attach the answer as a Word document"] export: Option<bool>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let submission = Submission {
        query,
        request,
        tables: parse_tables(&tables),
        format: output_format(format, custom_format),
        language: language.unwrap_or(LanguageChoice::Spanish).label().to_string(),
    };

    info!(
        user = ctx.author().name,
        query = submission.query,
        tables = ?submission.tables,
        "analysis requested"
    );

    let config = ctx.data().pipeline_config.read().await.clone();
    let outcome = ctx.data().engine.analyze(submission, &config).await;

    match outcome {
        Ok(Outcome::NotFound { query, tables }) => {
            ctx.say(format!(
                "No rows containing **{}** were found in: {}",
                query,
                tables.join(", ")
            ))
            .await?;
            Ok(())
        }
        Ok(Outcome::Answered(result)) => {
            present(
                &ctx,
                &result,
                show_evidence.unwrap_or(false),
                export.unwrap_or(false),
            )
            .await
        }
        Err(ResearchError::Validation(e)) => {
            ctx.say(format!("**Warning:** {}", e)).await?;
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "analysis failed");
            ctx.say(format!("**Error:** {}", report(&e))).await?;
            Ok(())
        }
    }
}

async fn present(
    ctx: &Context<'_>,
    result: &AnalysisResult,
    show_evidence: bool,
    export: bool,
) -> Result<(), anyhow::Error> {
    info!(
        matches = result.matches.len(),
        prompt_chars = result.prompt_chars,
        answer_len = result.answer.len(),
        "presenting analysis"
    );

    let header = format!(
        "**Analysis of {}** ({} matching rows)\n**Request:** {}\n\n",
        result.query,
        result.matches.len(),
        result.request
    );
    send_chunked(ctx, &format!("{}{}", header, result.answer)).await?;

    let mut reply = CreateReply::default();
    let mut attached = false;

    if show_evidence {
        let json = evidence_json(&result.matches)?;
        reply = reply.attachment(serenity::CreateAttachment::bytes(
            json.into_bytes(),
            "evidence.json",
        ));
        attached = true;
    }

    if export {
        let title = format!("Sinological analysis: {}", result.query);
        let subtitle = format!(
            "Request: {} ({})",
            result.request,
            result.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        match export_docx(&title, &subtitle, &result.answer) {
            Ok(bytes) => {
                let filename = export_filename(&result.query, &result.request);
                info!(filename, size = bytes.len(), "document exported");
                reply = reply.attachment(serenity::CreateAttachment::bytes(bytes, filename));
                attached = true;
            }
            Err(e) => {
                let e = ResearchError::from(e);
                warn!(error = %e, "export failed");
                ctx.say(format!("**Error:** {}", report(&e))).await?;
            }
        }
    }

    if attached {
        ctx.send(reply.content("Attachments:")).await?;
    }
    Ok(())
}

/// Autocomplete the last comma-separated entry from the configured tables.
async fn autocomplete_tables(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let (done, current) = match partial.rfind(',') {
        Some(i) => (&partial[..=i], partial[i + 1..].trim()),
        None => ("", partial.trim()),
    };
    let current = current.to_lowercase();

    ctx.data()
        .tables
        .iter()
        .filter(|t| t.to_lowercase().contains(&current))
        .map(|t| format!("{}{}", done, t))
        .take(25)
        .collect()
}
