use clap::Parser;

use crate::fetch::DEFAULT_ENDPOINTS;
use crate::types::LogLevel;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

#[derive(Parser, Debug)]
#[command(
    name = "decksync-rs",
    version,
    about = "Sync missing decklists from MTGGoldfish into the Supabase deck cache"
)]
pub struct Cli {
    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase API key.
    /// WARNING: passing via --supabase-key is visible in process listings.
    /// Prefer the SUPABASE_ANON_KEY environment variable instead.
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// RPC returning deck IDs present in the results table but not cached
    #[arg(long, env = "MISSING_IDS_RPC", default_value = "get_missing_deck_ids")]
    pub rpc_function: String,

    /// Cache table receiving synced decks
    #[arg(long, env = "DECK_CACHE_TABLE", default_value = "deck_cache_view")]
    pub cache_table: String,

    /// Authoritative results table (only read by --discovery-fallback)
    #[arg(long, env = "RESULTS_TABLE", default_value = "pauper_league_results")]
    pub results_table: String,

    /// If the RPC fails, compute missing IDs by scanning both tables
    #[arg(long, env = "DISCOVERY_FALLBACK")]
    pub discovery_fallback: bool,

    /// Maximum decks to process this run (0 = drain the whole backlog)
    #[arg(long, env = "MAX_DECKS_PER_RUN", default_value_t = 100)]
    pub limit: u32,

    /// IDs requested per batch when --limit is 0
    #[arg(long, env = "SYNC_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: u32,

    /// Delay between decks, in milliseconds
    #[arg(long, env = "RATE_LIMIT_DELAY_MS", default_value_t = 500)]
    pub item_delay_ms: u64,

    /// Minimum pause between batches, in milliseconds
    #[arg(long, env = "BATCH_PAUSE_MIN_MS", default_value_t = 2000)]
    pub batch_pause_min_ms: u64,

    /// Maximum pause between batches, in milliseconds
    #[arg(long, env = "BATCH_PAUSE_MAX_MS", default_value_t = 5000)]
    pub batch_pause_max_ms: u64,

    /// Minimum random pause before each deck fetch, in milliseconds
    #[arg(long, env = "FETCH_JITTER_MIN_MS", default_value_t = 1000)]
    pub jitter_min_ms: u64,

    /// Maximum random pause before each deck fetch, in milliseconds
    #[arg(long, env = "FETCH_JITTER_MAX_MS", default_value_t = 3000)]
    pub jitter_max_ms: u64,

    /// Attempts per upstream endpoint before moving on
    #[arg(long, env = "UPSTREAM_MAX_RETRIES", default_value_t = 7)]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in seconds
    #[arg(long, env = "UPSTREAM_RETRY_BASE_SECS", default_value_t = 2)]
    pub retry_base_delay: u64,

    /// Longest single backoff wait, in seconds
    #[arg(long, env = "UPSTREAM_RETRY_MAX_SECS", default_value_t = 120)]
    pub retry_max_delay: u64,

    /// Per-request timeout for upstream and Supabase calls, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 20)]
    pub timeout: u64,

    /// User-Agent sent to the upstream
    #[arg(long, env = "UPSTREAM_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Upstream URL template(s), tried in order; `{id}` is the deck ID
    #[arg(long = "upstream-endpoint", default_values_t = DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
    pub upstream_endpoints: Vec<String>,

    /// Consecutive batches with no synced deck before giving up
    /// (0 disables the guard for bounded runs; unbounded runs always stop after 1)
    #[arg(long, env = "MAX_STALLED_BATCHES", default_value_t = 1)]
    pub max_stalled_batches: u32,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}
