use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::llm::GeminiClient;
use crate::research::ResearchEngine;
use crate::store::SupabaseSource;

/// Pipeline tunables (admins can modify at runtime). Each run works on a copy.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_prompt_chars: usize,
    pub generation_timeout: Duration,
    pub parallel_fetch: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 400_000,
            generation_timeout: Duration::from_secs(120),
            parallel_fetch: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults, overridden by `MAX_PROMPT_CHARS`, `GENERATION_TIMEOUT_SECS` and `PARALLEL_FETCH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<usize>("MAX_PROMPT_CHARS") {
            config.max_prompt_chars = n;
        }
        if let Some(secs) = env_parse::<u64>("GENERATION_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Ok(flag) = dotenv::var("PARALLEL_FETCH") {
            config.parallel_fetch = matches!(flag.trim(), "1" | "true" | "yes");
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    dotenv::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

pub type Engine = ResearchEngine<SupabaseSource, GeminiClient>;

pub struct AppState {
    pub engine: Arc<Engine>,
    /// Tables offered to users (autocomplete and `/sinology tables`).
    pub tables: Vec<String>,
    pub admin_ids: HashSet<u64>,
    pub pipeline_config: Arc<RwLock<PipelineConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
