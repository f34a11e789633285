use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Input problems caught before any remote call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("enter at least one character or phrase to search for")]
    EmptyQuery,
    #[error("select at least one table")]
    NoTables,
    #[error("a custom output format was selected but no description was given")]
    EmptyCustomFormat,
}

/// Failure reported by a [`crate::store::TableSource`] for a single table.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to the table store failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("table store answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("table store returned malformed rows: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("table '{table}' reported {expected} rows but {received} were received")]
    Incomplete {
        table: String,
        expected: usize,
        received: usize,
    },
    #[error("cannot build a table URL from '{0}'")]
    Url(String),
}

/// A table fetch failed. Matches gathered from earlier tables are discarded.
#[derive(Debug, Error)]
#[error("failed to read table '{table}'")]
pub struct RetrievalError {
    pub table: String,
    /// Tables that had been fetched successfully before the failure.
    pub scanned: Vec<String>,
    #[source]
    pub source: SourceError,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("prompt is {chars} characters, above the limit of {limit}; narrow the query or select fewer tables")]
pub struct PromptTooLargeError {
    pub chars: usize,
    pub limit: usize,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request to the language model failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("language model answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("language model returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("language model blocked the prompt: {0}")]
    Blocked(String),
    #[error("language model returned no text")]
    Empty,
    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
#[error("failed to build the document: {0}")]
pub struct ExportError(#[source] pub Box<dyn StdError + Send + Sync>);

/// Everything that can end a research run early.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    PromptTooLarge(#[from] PromptTooLargeError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Render an error with its full cause chain, one cause per line.
pub fn report(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        let text = inner.to_string();
        // `#[error(transparent)]` wrappers repeat their inner message.
        if !out.ends_with(&text) {
            out.push_str("\n  caused by: ");
            out.push_str(&text);
        }
        cause = inner.source();
    }
    out
}
