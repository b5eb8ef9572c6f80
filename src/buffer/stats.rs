//! Page cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the page cache counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// A lookup found the block resident.
    Hit,
    /// A lookup had to claim a free or evicted frame.
    Miss,
    /// A block was read from the data file.
    Read,
    /// A frame was reclaimed from the LRU victim.
    Eviction,
    /// A dirty page reached the data file.
    Write,
    /// The write-back hook vetoed a write because the block was free.
    SkippedWrite,
}

const EVENTS: usize = 6;

impl CacheEvent {
    #[inline]
    fn slot(self) -> usize {
        match self {
            CacheEvent::Hit => 0,
            CacheEvent::Miss => 1,
            CacheEvent::Read => 2,
            CacheEvent::Eviction => 3,
            CacheEvent::Write => 4,
            CacheEvent::SkippedWrite => 5,
        }
    }
}

/// Counters kept by the page cache.
///
/// Each counter is updated on its own with `Relaxed` ordering, so a
/// snapshot taken under load can mix slightly different instants.
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: [AtomicU64; EVENTS],
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self, event: CacheEvent) {
        self.counters[event.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, event: CacheEvent) -> u64 {
        self.counters[event.slot()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.get(CacheEvent::Hit),
            cache_misses: self.get(CacheEvent::Miss),
            pages_read: self.get(CacheEvent::Read),
            evictions: self.get(CacheEvent::Eviction),
            pages_written: self.get(CacheEvent::Write),
            writes_skipped: self.get(CacheEvent::SkippedWrite),
        }
    }
}

/// Plain copy of the cache counters at one point in time.
///
/// # Example
/// ```
/// use blinkdb::buffer::{CacheEvent, CacheStats};
///
/// let stats = CacheStats::new();
/// stats.record(CacheEvent::Hit);
/// stats.record(CacheEvent::Miss);
/// let before = stats.snapshot();
/// stats.record(CacheEvent::Hit);
///
/// let delta = stats.snapshot().since(&before);
/// assert_eq!(delta.cache_hits, 1);
/// assert_eq!(delta.cache_misses, 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub pages_read: u64,
    pub evictions: u64,
    pub pages_written: u64,
    pub writes_skipped: u64,
}

impl StatsSnapshot {
    /// Fraction of lookups served without claiming a frame, 0.0 when idle.
    pub fn hit_rate(&self) -> f64 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            lookups => self.cache_hits as f64 / lookups as f64,
        }
    }

    /// Counts accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.saturating_sub(earlier.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(earlier.cache_misses),
            pages_read: self.pages_read.saturating_sub(earlier.pages_read),
            evictions: self.evictions.saturating_sub(earlier.evictions),
            pages_written: self.pages_written.saturating_sub(earlier.pages_written),
            writes_skipped: self.writes_skipped.saturating_sub(earlier.writes_skipped),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} reads={} evictions={} writes={} skipped={} ({:.1}% hit)",
            self.cache_hits,
            self.cache_misses,
            self.pages_read,
            self.evictions,
            self.pages_written,
            self.writes_skipped,
            self.hit_rate() * 100.0
        )
    }
}
