use std::time::Duration;

use url::Url;

use crate::fetch::{FetchSettings, ID_PLACEHOLDER};
use crate::retry::{JitterWindow, RetryConfig};
use crate::store::SupabaseConfig;
use crate::sync::SyncSettings;

/// Application configuration.
///
/// Everything is validated up front so the run loop never has to second-guess
/// its inputs.
pub struct Config {
    pub supabase_url: Url,
    pub supabase_key: String,
    pub rpc_function: String,
    pub cache_table: String,
    pub results_table: String,
    pub user_agent: String,
    pub upstream_endpoints: Vec<String>,

    pub item_delay: Duration,
    pub batch_pause: JitterWindow,
    pub fetch_jitter: JitterWindow,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub timeout: Duration,

    pub limit: u32,
    pub batch_size: u32,
    pub max_retries: u32,
    pub max_stalled_batches: u32,

    pub discovery_fallback: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("supabase_url", &self.supabase_url.as_str())
            .field("supabase_key", &"<redacted>")
            .field("cache_table", &self.cache_table)
            .field("limit", &self.limit)
            .field("batch_size", &self.batch_size)
            .field("upstream_endpoints", &self.upstream_endpoints)
            .finish_non_exhaustive()
    }
}

/// Pick the first non-blank value, trimmed.
fn required(value: Option<String>, name: &str, env: &str) -> anyhow::Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("{} is required (set {} or pass --{})", name, env, name),
    }
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> anyhow::Result<Self> {
        let raw_url = required(cli.supabase_url, "supabase-url", "SUPABASE_URL")?;
        let supabase_url = Url::parse(&raw_url)
            .map_err(|e| anyhow::anyhow!("Invalid SUPABASE_URL '{}': {}", raw_url, e))?;
        if !matches!(supabase_url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Invalid SUPABASE_URL '{}': expected an http(s) URL",
                raw_url
            );
        }
        let supabase_key = required(cli.supabase_key, "supabase-key", "SUPABASE_ANON_KEY")?;

        if cli.batch_size == 0 {
            anyhow::bail!("--batch-size must be at least 1");
        }
        if cli.max_retries == 0 {
            anyhow::bail!("--max-retries must be at least 1");
        }
        if cli.upstream_endpoints.is_empty() {
            anyhow::bail!("At least one --upstream-endpoint is required");
        }
        if let Some(bad) = cli
            .upstream_endpoints
            .iter()
            .find(|t| !t.contains(ID_PLACEHOLDER))
        {
            anyhow::bail!(
                "Upstream endpoint '{}' has no {} placeholder",
                bad,
                ID_PLACEHOLDER
            );
        }

        let batch_pause = JitterWindow::new(
            Duration::from_millis(cli.batch_pause_min_ms),
            Duration::from_millis(cli.batch_pause_max_ms),
        )
        .map_err(|e| anyhow::anyhow!("Invalid batch pause: {}", e))?;
        let fetch_jitter = JitterWindow::new(
            Duration::from_millis(cli.jitter_min_ms),
            Duration::from_millis(cli.jitter_max_ms),
        )
        .map_err(|e| anyhow::anyhow!("Invalid fetch jitter: {}", e))?;

        let retry_base_delay = Duration::from_secs(cli.retry_base_delay);
        let retry_max_delay = Duration::from_secs(cli.retry_max_delay);
        if retry_base_delay > retry_max_delay {
            anyhow::bail!(
                "--retry-base-delay ({}s) exceeds --retry-max-delay ({}s)",
                cli.retry_base_delay,
                cli.retry_max_delay
            );
        }

        Ok(Self {
            supabase_url,
            supabase_key,
            rpc_function: cli.rpc_function,
            cache_table: cli.cache_table,
            results_table: cli.results_table,
            user_agent: cli.user_agent,
            upstream_endpoints: cli.upstream_endpoints,
            item_delay: Duration::from_millis(cli.item_delay_ms),
            batch_pause,
            fetch_jitter,
            retry_base_delay,
            retry_max_delay,
            timeout: Duration::from_secs(cli.timeout.max(1)),
            limit: cli.limit,
            batch_size: cli.batch_size,
            max_retries: cli.max_retries,
            max_stalled_batches: cli.max_stalled_batches,
            discovery_fallback: cli.discovery_fallback,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    pub fn supabase(&self) -> SupabaseConfig {
        SupabaseConfig {
            base_url: self.supabase_url.clone(),
            api_key: self.supabase_key.clone(),
            rpc_function: self.rpc_function.clone(),
            cache_table: self.cache_table.clone(),
            results_table: self.results_table.clone(),
            discovery_fallback: self.discovery_fallback,
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            ..RetryConfig::default()
        }
    }

    pub fn fetch(&self) -> FetchSettings {
        FetchSettings {
            endpoints: self.upstream_endpoints.clone(),
            jitter: self.fetch_jitter,
            retry: self.retry(),
        }
    }

    pub fn sync(&self) -> SyncSettings {
        SyncSettings {
            limit: self.limit,
            batch_size: self.batch_size,
            item_delay: self.item_delay,
            batch_pause: self.batch_pause,
            max_stalled_batches: self.max_stalled_batches,
            no_progress_bar: self.no_progress_bar,
        }
    }
}
