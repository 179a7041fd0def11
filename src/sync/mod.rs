//! Batch sync loop: discover missing decks, fetch, parse, enrich, write,
//! repeat until the delta source runs dry.
//!
//! Decks are processed strictly one after another. Parallel requests would
//! make the upstream's bot filter trip much sooner, and a single cache row
//! per deck means an interrupted run never leaves partial state behind.

pub mod types;

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::decklist;
use crate::fetch::Fetcher;
use crate::retry::{JitterWindow, Sleeper};
use crate::scryfall;
use crate::store::{CacheRow, CacheWriter, DeltaSource, StoreError, WriteOutcome};
use crate::types::DeckId;

pub use types::{BatchStats, StopReason, SyncReport};

/// Subset of application config consumed by the sync loop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Decks per run; 0 drains the whole backlog in `batch_size` rounds.
    pub limit: u32,
    pub batch_size: u32,
    pub item_delay: Duration,
    /// Pause before every discovery call after the first.
    pub batch_pause: JitterWindow,
    /// Consecutive no-progress batches tolerated before stopping.
    pub max_stalled_batches: u32,
    pub no_progress_bar: bool,
}

impl SyncSettings {
    pub fn is_unbounded(&self) -> bool {
        self.limit == 0
    }

    /// Batches without a single success before the run gives up, if ever.
    /// Draining an unbounded backlog always keeps the guard: failed decks
    /// stay in the delta and would be handed back forever.
    fn stall_threshold(&self) -> Option<u32> {
        match (self.is_unbounded(), self.max_stalled_batches) {
            (true, n) => Some(n.max(1)),
            (false, 0) => None,
            (false, n) => Some(n),
        }
    }

    /// How many IDs to ask for next, or `None` once the run limit is spent.
    /// No single request exceeds `batch_size`.
    fn next_request(&self, attempted: u64) -> Option<u32> {
        if self.is_unbounded() {
            return Some(self.batch_size);
        }
        let remaining = u64::from(self.limit).saturating_sub(attempted);
        if remaining == 0 {
            None
        } else {
            Some(remaining.min(u64::from(self.batch_size)) as u32)
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Discovering missing decks failed: {0}")]
    Discovery(#[from] StoreError),
}

/// Why one deck did not make it into the cache.
#[derive(Debug, Error)]
enum ItemError {
    #[error("decklist unavailable from every endpoint")]
    Unavailable,

    #[error(transparent)]
    Write(#[from] StoreError),
}

fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

pub struct SyncEngine {
    source: Arc<dyn DeltaSource>,
    writer: Arc<dyn CacheWriter>,
    fetcher: Fetcher,
    sleeper: Arc<dyn Sleeper>,
    settings: SyncSettings,
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn DeltaSource>,
        writer: Arc<dyn CacheWriter>,
        fetcher: Fetcher,
        sleeper: Arc<dyn Sleeper>,
        settings: SyncSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            writer,
            fetcher,
            sleeper,
            settings,
            shutdown,
        }
    }

    /// Run discovery/processing rounds until the backlog is drained, the
    /// run limit is spent, progress stalls, or shutdown is requested.
    ///
    /// Only a discovery failure is an error; per-deck failures are counted.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut totals = BatchStats::default();
        let mut batches = 0u32;
        let mut discovered = 0u64;
        let mut stalled_batches = 0u32;

        let stop_reason = loop {
            if self.shutdown.is_cancelled() {
                break StopReason::Shutdown;
            }
            let Some(request) = self.settings.next_request(totals.attempted()) else {
                break StopReason::BudgetExhausted;
            };

            if batches > 0 {
                let pause = self.settings.batch_pause.sample();
                tracing::debug!("Pausing {:.1}s before the next batch", pause.as_secs_f64());
                self.sleeper.sleep(pause).await;
            }

            tracing::info!("Fetching up to {} missing deck IDs...", request);
            let mut ids = self.source.missing_ids(request).await?;
            if ids.is_empty() {
                if batches == 0 {
                    tracing::info!("No missing decks to import. Cache is up to date!");
                }
                break StopReason::Drained;
            }
            if ids.len() > request as usize {
                tracing::warn!(
                    "Delta source returned {} IDs for a request of {}, truncating",
                    ids.len(),
                    request
                );
                ids.truncate(request as usize);
            }

            batches += 1;
            discovered += ids.len() as u64;
            tracing::info!("── Batch {}: processing {} decks ──", batches, ids.len());

            let stats = self.process_batch(&ids).await;
            totals.merge(&stats);
            tracing::info!(
                "Batch {} done: {} synced, {} failed, {} skipped",
                batches,
                stats.success,
                stats.failed,
                stats.skipped
            );

            if self.shutdown.is_cancelled() {
                break StopReason::Shutdown;
            }

            if stats.is_stalled() {
                stalled_batches += 1;
                if let Some(threshold) = self.settings.stall_threshold() {
                    if stalled_batches >= threshold {
                        tracing::warn!(
                            "No deck synced in {} consecutive batch(es); stopping so the same \
                             failing decks are not retried forever",
                            stalled_batches
                        );
                        break StopReason::Stalled;
                    }
                }
            } else if stats.success > 0 {
                stalled_batches = 0;
            }
        };

        Ok(SyncReport {
            totals,
            batches,
            discovered,
            stop_reason,
            elapsed: started.elapsed(),
        })
    }

    async fn process_batch(&self, ids: &[DeckId]) -> BatchStats {
        let mut stats = BatchStats::default();
        let total = ids.len();
        let pb = create_progress_bar(self.settings.no_progress_bar, total as u64);

        for (i, &id) in ids.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                let remaining = total - i;
                stats.skipped += remaining as u64;
                pb.suspend(|| {
                    tracing::info!("Shutdown requested, skipping {} remaining decks", remaining)
                });
                break;
            }
            if i > 0 && !self.settings.item_delay.is_zero() {
                self.sleeper.sleep(self.settings.item_delay).await;
            }

            pb.set_message(format!("deck {}", id));
            pb.suspend(|| tracing::info!("[{}/{}] Processing deck {}...", i + 1, total, id));

            match self.process_deck(id).await {
                Ok(WriteOutcome::Written) => {
                    stats.success += 1;
                    pb.suspend(|| tracing::info!("Successfully saved deck {}", id));
                }
                Ok(WriteOutcome::AlreadyExists) => {
                    stats.success += 1;
                    pb.suspend(|| tracing::warn!("Deck {} already exists", id));
                }
                Err(e) => {
                    stats.failed += 1;
                    pb.suspend(|| tracing::warn!("Could not sync deck {}: {}", id, e));
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        stats
    }

    async fn process_deck(&self, id: DeckId) -> Result<WriteOutcome, ItemError> {
        let raw = self
            .fetcher
            .fetch_raw(id)
            .await
            .ok_or(ItemError::Unavailable)?;

        let deck = decklist::parse(&raw);
        tracing::debug!(
            deck_id = %id,
            cards = deck.card_count(),
            main = deck.main.len(),
            side = deck.side.len(),
            "parsed decklist"
        );

        let row = CacheRow {
            deck_id: id,
            decklist: deck.to_text(),
            cards: scryfall::enrich(&deck),
        };
        Ok(self.writer.write(&row).await?)
    }
}
