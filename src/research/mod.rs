pub mod evidence;
pub mod export;
pub mod prompts;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{GenerationError, ResearchError, RetrievalError, ValidationError};
use crate::llm::CompletionClient;
use crate::state::PipelineConfig;
use crate::store::types::{serialize_row, Match, Row};
use crate::store::TableSource;

use prompts::{assemble_prompt, PromptRequest};

/// How the answer should be shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    BriefDictionary,
    AcademicEssay,
    DetailedExplanation,
    /// Free-form format described by the user.
    Other(String),
}

impl OutputFormat {
    pub fn label(&self) -> &str {
        match self {
            OutputFormat::BriefDictionary => "Brief explanation (dictionary entry)",
            OutputFormat::AcademicEssay => "Short academic essay",
            OutputFormat::DetailedExplanation => "Detailed explanation of the request",
            OutputFormat::Other(custom) => custom.trim(),
        }
    }
}

/// One user submission, as collected by the command layer.
#[derive(Debug, Clone)]
pub struct Submission {
    pub query: String,
    pub request: String,
    pub tables: Vec<String>,
    pub format: OutputFormat,
    pub language: String,
}

impl Submission {
    /// Drop blank and repeated table names and reject what cannot run.
    /// The query is kept verbatim; surrounding whitespace is part of the match.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let mut tables: Vec<String> = Vec::with_capacity(self.tables.len());
        for t in self.tables.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tables.iter().any(|seen| seen == t) {
                tables.push(t.to_string());
            }
        }
        if tables.is_empty() {
            return Err(ValidationError::NoTables);
        }
        self.tables = tables;

        if let OutputFormat::Other(custom) = &self.format {
            if custom.trim().is_empty() {
                return Err(ValidationError::EmptyCustomFormat);
            }
        }
        Ok(self)
    }
}

/// The model's answer together with the evidence it was given.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub query: String,
    pub request: String,
    pub answer: String,
    pub matches: Vec<Match>,
    pub prompt_chars: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Outcome {
    /// No row in the selected tables contains the query.
    NotFound { query: String, tables: Vec<String> },
    Answered(AnalysisResult),
}

/// Keep the rows whose serialized text contains `query`, tagged with `table`.
pub fn filter_rows(table: &str, rows: Vec<Row>, query: &str) -> Vec<Match> {
    rows.into_iter()
        .filter(|row| serialize_row(row).contains(query))
        .map(|row| Match::new(table, row))
        .collect()
}

/// Full-table scan of every table, in order. All-or-nothing: the first
/// failing table aborts the whole retrieval.
pub async fn retrieve<S: TableSource>(
    source: &S,
    query: &str,
    tables: &[String],
    parallel: bool,
) -> Result<Vec<Match>, RetrievalError> {
    let mut matches = Vec::new();
    let mut scanned = Vec::new();

    if parallel {
        let fetched =
            futures::future::join_all(tables.iter().map(|t| source.fetch_all(t))).await;
        let mut failure = None;
        for (table, result) in tables.iter().zip(fetched) {
            match result {
                Ok(rows) => {
                    let found = filter_rows(table, rows, query);
                    debug!(table = %table, matches = found.len(), "table scanned");
                    matches.extend(found);
                    scanned.push(table.clone());
                }
                Err(source) if failure.is_none() => failure = Some((table.clone(), source)),
                Err(_) => {}
            }
        }
        if let Some((table, source)) = failure {
            return Err(RetrievalError {
                table,
                scanned,
                source,
            });
        }
        return Ok(matches);
    }

    for table in tables {
        let rows = match source.fetch_all(table).await {
            Ok(rows) => rows,
            Err(source) => {
                return Err(RetrievalError {
                    table: table.clone(),
                    scanned,
                    source,
                })
            }
        };
        let row_count = rows.len();
        let found = filter_rows(table, rows, query);
        debug!(table = %table, rows = row_count, matches = found.len(), "table scanned");
        matches.extend(found);
        scanned.push(table.clone());
    }
    Ok(matches)
}

pub struct ResearchEngine<S, C> {
    source: Arc<S>,
    llm: Arc<C>,
}

impl<S: TableSource, C: CompletionClient> ResearchEngine<S, C> {
    pub fn new(source: Arc<S>, llm: Arc<C>) -> Self {
        Self { source, llm }
    }

    /// Run one submission end to end: validate, retrieve, prompt, complete.
    pub async fn analyze(
        &self,
        submission: Submission,
        config: &PipelineConfig,
    ) -> Result<Outcome, ResearchError> {
        let submission = submission.validate()?;
        let Submission {
            query,
            request,
            tables,
            format,
            language,
        } = submission;

        info!(query, tables = ?tables, "retrieval started");
        let matches = retrieve(&*self.source, &query, &tables, config.parallel_fetch).await?;

        if matches.is_empty() {
            info!(query, "no matching rows");
            return Ok(Outcome::NotFound { query, tables });
        }
        info!(query, matches = matches.len(), "evidence found");

        let prompt = assemble_prompt(
            &PromptRequest {
                query: &query,
                request: &request,
                matches: &matches,
                output_format: &format,
                response_language: &language,
            },
            config.max_prompt_chars,
        )?;
        let prompt_chars = prompt.chars().count();
        debug!(prompt_chars, "prompt assembled");

        let timeout = config.generation_timeout;
        let answer = match tokio::time::timeout(timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(GenerationError::Request(e))) if e.is_timeout() => {
                warn!(?timeout, "language model request timed out");
                return Err(GenerationError::Timeout(timeout).into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(?timeout, "language model did not answer in time");
                return Err(GenerationError::Timeout(timeout).into());
            }
        };
        info!(answer_len = answer.len(), "analysis complete");

        Ok(Outcome::Answered(AnalysisResult {
            query,
            request,
            answer,
            matches,
            prompt_chars,
            generated_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySource {
        tables: HashMap<String, Vec<Row>>,
        fetched: Mutex<Vec<String>>,
    }

    impl MemorySource {
        fn with(mut self, table: &str, rows: Vec<Row>) -> Self {
            self.tables.insert(table.to_string(), rows);
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    impl TableSource for MemorySource {
        async fn fetch_all(&self, table: &str) -> Result<Vec<Row>, SourceError> {
            self.fetched.lock().unwrap().push(table.to_string());
            self.tables
                .get(table)
                .cloned()
                .ok_or_else(|| SourceError::UnknownTable(table.to_string()))
        }
    }

    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct FakeLlm {
        reply: Reply,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl FakeLlm {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CompletionClient for FakeLlm {
        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match self.reply {
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Fail => Err(GenerationError::Status {
                    status: reqwest::StatusCode::TOO_MANY_REQUESTS,
                    body: "quota exceeded".to_string(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn classics() -> MemorySource {
        MemorySource::default()
            .with(
                "Analects",
                vec![
                    json!({"id": 1, "text": "子曰：學而時習之，不亦說乎"}),
                    json!({"id": 2, "text": "有朋自遠方來"}),
                    json!({"id": 3, "text": "博學而篤志", "notes": {"commentary": "朱熹"}}),
                ],
            )
            .with(
                "Xunzi",
                vec![
                    json!({"id": 1, "text": "君子曰：學不可以已"}),
                    json!({"id": 2, "text": "青取之於藍"}),
                ],
            )
    }

    fn submission(query: &str, tables: &[&str]) -> Submission {
        Submission {
            query: query.to_string(),
            request: "Explain the character".to_string(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
            format: OutputFormat::BriefDictionary,
            language: "English".to_string(),
        }
    }

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    type Harness = (
        ResearchEngine<MemorySource, FakeLlm>,
        Arc<MemorySource>,
        Arc<FakeLlm>,
    );

    fn engine(source: MemorySource, llm: FakeLlm) -> Harness {
        let source = Arc::new(source);
        let llm = Arc::new(llm);
        (ResearchEngine::new(source.clone(), llm.clone()), source, llm)
    }

    #[test]
    fn test_filter_rows_scenario_analects() {
        let rows = vec![json!({"text": "子曰：學而時習之"})];
        let found = filter_rows("Analects", rows, "學");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].table, "Analects");
    }

    #[test]
    fn test_filter_rows_is_case_sensitive_and_checks_every_field() {
        let rows = vec![
            json!({"title": "Dao", "body": "x"}),
            json!({"title": "dao", "body": "x"}),
            json!({"meta": {"tags": ["Dao"]}}),
        ];
        let found = filter_rows("t", rows, "Dao");
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].row, json!({"meta": {"tags": ["Dao"]}}));
    }

    #[test]
    fn test_filter_rows_keeps_duplicates_in_order() {
        let rows = vec![json!({"t": "學"}), json!({"t": "習"}), json!({"t": "學"})];
        let found = filter_rows("t", rows, "學");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].row, found[1].row);
    }

    #[tokio::test]
    async fn test_retrieve_no_false_positives_or_negatives() {
        let source = classics();
        let found = retrieve(&source, "學", &tables(&["Analects", "Xunzi"]), false)
            .await
            .unwrap();

        let tagged: Vec<(&str, i64)> = found
            .iter()
            .map(|m| (m.table.as_str(), m.row["id"].as_i64().unwrap()))
            .collect();
        assert_eq!(tagged, vec![("Analects", 1), ("Analects", 3), ("Xunzi", 1)]);
    }

    #[tokio::test]
    async fn test_retrieve_parallel_matches_sequential_order() {
        let source = classics();
        let wanted = tables(&["Xunzi", "Analects"]);
        let sequential = retrieve(&source, "學", &wanted, false).await.unwrap();
        let parallel = retrieve(&source, "學", &wanted, true).await.unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(sequential[0].table, "Xunzi");
        // Stable across runs.
        assert_eq!(sequential, retrieve(&source, "學", &wanted, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_retrieve_empty_is_not_an_error() {
        let source = classics();
        let found = retrieve(&source, "龍", &tables(&["Analects"]), false)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_unknown_table_reports_progress() {
        let source = classics();
        let err = retrieve(&source, "學", &tables(&["Analects", "Laozi", "Xunzi"]), false)
            .await
            .unwrap_err();
        assert_eq!(err.table, "Laozi");
        assert_eq!(err.scanned, vec!["Analects".to_string()]);
        assert!(matches!(err.source, SourceError::UnknownTable(_)));
        // Sequential mode stops at the failing table.
        assert_eq!(source.fetched(), vec!["Analects", "Laozi"]);
    }

    #[tokio::test]
    async fn test_retrieve_parallel_unknown_table() {
        let source = classics();
        let err = retrieve(&source, "學", &tables(&["Analects", "Laozi", "Xunzi"]), true)
            .await
            .unwrap_err();
        assert_eq!(err.table, "Laozi");
        assert_eq!(err.scanned, tables(&["Analects", "Xunzi"]));
    }

    #[test]
    fn test_validate_dedups_tables() {
        let s = submission("  學 ", &["Analects", " Analects", "", "Xunzi"])
            .validate()
            .unwrap();
        assert_eq!(s.query, "  學 ");
        assert_eq!(s.tables, tables(&["Analects", "Xunzi"]));
    }

    #[tokio::test]
    async fn test_analyze_matches_query_whitespace_literally() {
        let (engine, _, llm) = engine(classics(), FakeLlm::new(Reply::Text("unused")));
        let outcome = engine
            .analyze(submission("學 ", &["Analects", "Xunzi"]), &PipelineConfig::default())
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::NotFound { ref query, .. } if query == "學 "));
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert_eq!(
            submission(" ", &["Analects"]).validate().unwrap_err(),
            ValidationError::EmptyQuery
        );
        assert_eq!(
            submission("學", &[" "]).validate().unwrap_err(),
            ValidationError::NoTables
        );
        let mut s = submission("學", &["Analects"]);
        s.format = OutputFormat::Other("  ".to_string());
        assert_eq!(s.validate().unwrap_err(), ValidationError::EmptyCustomFormat);
    }

    #[tokio::test]
    async fn test_analyze_answers_with_evidence() {
        let (engine, _, llm) = engine(classics(), FakeLlm::new(Reply::Text("學 means to learn.")));
        let outcome = engine
            .analyze(submission("學", &["Analects", "Xunzi"]), &PipelineConfig::default())
            .await
            .unwrap();

        let Outcome::Answered(result) = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(result.answer, "學 means to learn.");
        assert_eq!(result.matches.len(), 3);
        assert_eq!(llm.calls(), 1);

        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(result.prompt_chars, prompt.chars().count());
        assert!(prompt.contains("Source table: Analects (2 rows)"));
        assert!(prompt.contains("Source table: Xunzi (1 rows)"));
    }

    #[tokio::test]
    async fn test_analyze_not_found_skips_completion() {
        let (engine, _, llm) = engine(classics(), FakeLlm::new(Reply::Text("unused")));
        let outcome = engine
            .analyze(submission("龍", &["Analects"]), &PipelineConfig::default())
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::NotFound { ref query, .. } if query == "龍"));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_analyze_validation_happens_before_fetch() {
        let (engine, source, _) = engine(classics(), FakeLlm::new(Reply::Text("unused")));
        let err = engine
            .analyze(submission("學", &[]), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Validation(ValidationError::NoTables)));
        assert!(source.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_surfaces_generation_error() {
        let (engine, _, llm) = engine(classics(), FakeLlm::new(Reply::Fail));
        let err = engine
            .analyze(submission("學", &["Analects"]), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Generation(GenerationError::Status { .. })));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_analyze_times_out() {
        let (engine, _, _) = engine(classics(), FakeLlm::new(Reply::Hang));
        let config = PipelineConfig {
            generation_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        };
        let err = engine
            .analyze(submission("學", &["Analects"]), &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResearchError::Generation(GenerationError::Timeout(d)) if d == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn test_analyze_prompt_too_large_skips_completion() {
        let (engine, _, llm) = engine(classics(), FakeLlm::new(Reply::Text("unused")));
        let config = PipelineConfig {
            max_prompt_chars: 100,
            ..PipelineConfig::default()
        };
        let err = engine
            .analyze(submission("學", &["Analects"]), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::PromptTooLarge(_)));
        assert_eq!(llm.calls(), 0);
    }
}
