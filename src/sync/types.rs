//! Statistics and outcome types for a sync run.

use std::time::Duration;

/// Per-batch (and per-run) counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub success: u64,
    pub failed: u64,
    /// Decks discovered but not attempted (shutdown mid-batch).
    pub skipped: u64,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn attempted(&self) -> u64 {
        self.success + self.failed
    }

    /// Nothing got through, but something was tried.
    pub fn is_stalled(&self) -> bool {
        self.success == 0 && self.failed > 0
    }
}

/// Why the run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Discovery returned no identifiers; the cache is up to date.
    Drained,
    /// The per-run limit has been spent.
    BudgetExhausted,
    /// Consecutive batches made no progress.
    Stalled,
    /// A shutdown signal arrived.
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drained => "cache up to date",
            Self::BudgetExhausted => "run limit reached",
            Self::Stalled => "stalled, no deck synced in the last batch",
            Self::Shutdown => "shutdown requested",
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub totals: BatchStats,
    pub batches: u32,
    /// Identifiers handed out by the delta source, duplicates included.
    pub discovered: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl SyncReport {
    /// A run succeeds when there was nothing to do, or when at least one deck
    /// made it into the cache.
    pub fn is_success(&self) -> bool {
        self.discovered == 0 || self.totals.success > 0
    }

    pub fn success_rate(&self) -> Option<f64> {
        let attempted = self.totals.attempted();
        if attempted == 0 {
            return None;
        }
        Some(self.totals.success as f64 / attempted as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(discovered: u64, success: u64, failed: u64) -> SyncReport {
        SyncReport {
            totals: BatchStats {
                success,
                failed,
                skipped: 0,
            },
            batches: 1,
            discovered,
            stop_reason: StopReason::Drained,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_merge() {
        let mut total = BatchStats::default();
        total.merge(&BatchStats {
            success: 2,
            failed: 1,
            skipped: 0,
        });
        total.merge(&BatchStats {
            success: 1,
            failed: 0,
            skipped: 4,
        });
        assert_eq!(
            total,
            BatchStats {
                success: 3,
                failed: 1,
                skipped: 4
            }
        );
        assert_eq!(total.attempted(), 4);
    }

    #[test]
    fn test_is_stalled() {
        assert!(BatchStats {
            success: 0,
            failed: 3,
            skipped: 0
        }
        .is_stalled());
        assert!(!BatchStats::default().is_stalled());
        assert!(!BatchStats {
            success: 1,
            failed: 3,
            skipped: 0
        }
        .is_stalled());
    }

    #[test]
    fn test_success_rules() {
        assert!(report(0, 0, 0).is_success());
        assert!(report(10, 1, 9).is_success());
        assert!(!report(10, 0, 10).is_success());
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(report(0, 0, 0).success_rate(), None);
        assert_eq!(report(4, 3, 1).success_rate(), Some(75.0));
    }
}
