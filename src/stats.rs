//! Time-bucketed statistics for resource pools
//!
//! Every event is applied to six buckets at once: the current minute, hour,
//! day, month and year, plus one all-time bucket. The minute, hour, day and
//! month buckets only ever hold their current period; when the period rolls
//! over the bucket is replaced by a fresh one. The year and all-time buckets
//! keep accumulating for the life of the collector.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use parking_lot::RwLock;

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Width of a statistics bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
#[cfg_attr(feature = "metrics", serde(rename_all = "snake_case"))]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
    Year,
    AllTime,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
        Granularity::Year,
        Granularity::AllTime,
    ];

    fn index(self) -> usize {
        match self {
            Granularity::Minute => 0,
            Granularity::Hour => 1,
            Granularity::Day => 2,
            Granularity::Month => 3,
            Granularity::Year => 4,
            Granularity::AllTime => 5,
        }
    }

    /// Whether the bucket is replaced when its period ends
    pub fn rolls_over(self) -> bool {
        !matches!(self, Granularity::Year | Granularity::AllTime)
    }

    /// Start of the period containing `now`; `None` for the all-time bucket,
    /// which never rolls over.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use esox_resourcepool::Granularity;
    ///
    /// let now = Utc.with_ymd_and_hms(2024, 5, 17, 13, 42, 9).unwrap();
    /// let start = Granularity::Hour.period_start(now).unwrap();
    /// assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 17, 13, 0, 0).unwrap());
    /// assert!(Granularity::AllTime.period_start(now).is_none());
    /// ```
    pub fn period_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = now.date_naive();
        let start = match self {
            Granularity::Minute => date.and_hms_opt(now.hour(), now.minute(), 0),
            Granularity::Hour => date.and_hms_opt(now.hour(), 0, 0),
            Granularity::Day => date.and_hms_opt(0, 0, 0),
            Granularity::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            Granularity::Year => {
                NaiveDate::from_ymd_opt(now.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            Granularity::AllTime => return None,
        };
        start.map(|s| s.and_utc())
    }
}

/// Event observed by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatEvent {
    Request { hit: bool },
    Return,
    Purge(usize),
    Wait,
    Timeout,
    Error,
    Disposed,
    SizeChange(usize),
}

/// Counters for one bucket
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolStatsPeriod {
    pub granularity: Granularity,

    /// Start of the period; process start for the all-time bucket
    pub period_start: DateTime<Utc>,

    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,

    /// In-use entries reclaimed by purge passes
    pub purges: u64,
    pub waits: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub disposed: u64,
    pub size_change_events: u64,

    /// Smallest pool size observed during the period
    pub min_size: Option<usize>,

    /// Largest pool size observed during the period
    pub max_size: Option<usize>,

    pub first_size_change: Option<DateTime<Utc>>,
    pub last_size_change: Option<DateTime<Utc>>,
}

impl PoolStatsPeriod {
    fn new(granularity: Granularity, period_start: DateTime<Utc>, size: Option<usize>) -> Self {
        Self {
            granularity,
            period_start,
            requests: 0,
            hits: 0,
            misses: 0,
            returns: 0,
            purges: 0,
            waits: 0,
            timeouts: 0,
            errors: 0,
            disposed: 0,
            size_change_events: 0,
            min_size: size,
            max_size: size,
            first_size_change: None,
            last_size_change: None,
        }
    }

    fn apply(&mut self, event: StatEvent, now: DateTime<Utc>) {
        match event {
            StatEvent::Request { hit } => {
                self.requests += 1;
                if hit {
                    self.hits += 1;
                } else {
                    self.misses += 1;
                }
            }
            StatEvent::Return => self.returns += 1,
            StatEvent::Purge(reclaimed) => self.purges += reclaimed as u64,
            StatEvent::Wait => self.waits += 1,
            StatEvent::Timeout => self.timeouts += 1,
            StatEvent::Error => self.errors += 1,
            StatEvent::Disposed => self.disposed += 1,
            StatEvent::SizeChange(size) => {
                self.size_change_events += 1;
                self.min_size = Some(self.min_size.map_or(size, |m| m.min(size)));
                self.max_size = Some(self.max_size.map_or(size, |m| m.max(size)));
                self.first_size_change.get_or_insert(now);
                self.last_size_change = Some(now);
            }
        }
    }

    fn ratio(&self, count: u64) -> f64 {
        count as f64 / self.requests.max(1) as f64
    }

    pub fn hit_ratio(&self) -> f64 {
        self.ratio(self.hits)
    }

    pub fn miss_ratio(&self) -> f64 {
        self.ratio(self.misses)
    }

    pub fn return_ratio(&self) -> f64 {
        self.ratio(self.returns)
    }

    pub fn error_ratio(&self) -> f64 {
        self.ratio(self.errors)
    }

    pub fn purge_ratio(&self) -> f64 {
        self.ratio(self.purges)
    }

    pub fn wait_ratio(&self) -> f64 {
        self.ratio(self.waits)
    }

    pub fn timeout_ratio(&self) -> f64 {
        self.ratio(self.timeouts)
    }

    pub fn disposed_ratio(&self) -> f64 {
        self.ratio(self.disposed)
    }

    pub fn size_change_events_ratio(&self) -> f64 {
        self.ratio(self.size_change_events)
    }

    /// Size-change events per minute over the span between the first and
    /// last recorded size change. With a single timestamp the span counts as
    /// one minute.
    pub fn size_change_events_per_minute(&self) -> f64 {
        let (Some(first), Some(last)) = (self.first_size_change, self.last_size_change) else {
            return 0.0;
        };
        let span = (last - first).to_std().unwrap_or_default();
        let minutes = if span.is_zero() { 1.0 } else { span.as_secs_f64() / 60.0 };
        self.size_change_events as f64 / minutes
    }
}

/// Point-in-time copy of every bucket
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolStatsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub current_size: Option<usize>,
    pub periods: Vec<PoolStatsPeriod>,
}

impl PoolStatsSnapshot {
    pub fn period(&self, granularity: Granularity) -> Option<&PoolStatsPeriod> {
        self.periods.iter().find(|p| p.granularity == granularity)
    }
}

struct Buckets {
    periods: Vec<PoolStatsPeriod>,
    current_size: Option<usize>,
}

impl Buckets {
    /// The bucket for `granularity` as of `now`; a bucket whose period has
    /// already ended reads as an empty one.
    fn current(&self, granularity: Granularity, now: DateTime<Utc>) -> PoolStatsPeriod {
        let period = &self.periods[granularity.index()];
        if !granularity.rolls_over() {
            return period.clone();
        }
        match granularity.period_start(now) {
            Some(start) if start != period.period_start => {
                PoolStatsPeriod::new(granularity, start, self.current_size)
            }
            _ => period.clone(),
        }
    }
}

/// Statistics collector shared by a pool and its observers
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{Granularity, PoolStats};
///
/// let stats = PoolStats::new();
/// stats.record_request(true);
/// stats.record_request(false);
///
/// let all_time = stats.period(Granularity::AllTime);
/// assert_eq!(all_time.hit_ratio(), 0.5);
/// ```
pub struct PoolStats {
    buckets: RwLock<Buckets>,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub(crate) fn starting_at(now: DateTime<Utc>) -> Self {
        let periods = Granularity::ALL
            .iter()
            .map(|g| PoolStatsPeriod::new(*g, g.period_start(now).unwrap_or(now), None))
            .collect();
        Self {
            buckets: RwLock::new(Buckets {
                periods,
                current_size: None,
            }),
        }
    }

    /// Record a borrow request that was (`hit`) or was not served from the
    /// available queue
    pub fn record_request(&self, hit: bool) {
        self.record(StatEvent::Request { hit });
    }

    pub fn record_return(&self) {
        self.record(StatEvent::Return);
    }

    /// Record a purge pass that reclaimed `reclaimed` in-use entries
    pub fn record_purge(&self, reclaimed: usize) {
        self.record(StatEvent::Purge(reclaimed));
    }

    pub fn record_wait(&self) {
        self.record(StatEvent::Wait);
    }

    pub fn record_timeout(&self) {
        self.record(StatEvent::Timeout);
    }

    pub fn record_error(&self) {
        self.record(StatEvent::Error);
    }

    pub fn record_disposed(&self) {
        self.record(StatEvent::Disposed);
    }

    /// Record that the pool now holds `size` resources
    pub fn record_size_change(&self, size: usize) {
        self.record(StatEvent::SizeChange(size));
    }

    fn record(&self, event: StatEvent) {
        self.record_at(event, Utc::now());
    }

    pub(crate) fn record_at(&self, event: StatEvent, now: DateTime<Utc>) {
        let mut guard = self.buckets.write();
        let buckets = &mut *guard;
        let seed = buckets.current_size;

        for period in buckets.periods.iter_mut() {
            if period.granularity.rolls_over()
                && let Some(start) = period.granularity.period_start(now)
                && start != period.period_start
            {
                *period = PoolStatsPeriod::new(period.granularity, start, seed);
            }
            period.apply(event, now);
        }

        if let StatEvent::SizeChange(size) = event {
            buckets.current_size = Some(size);
        }
    }

    /// Copy of the current bucket for `granularity`
    pub fn period(&self, granularity: Granularity) -> PoolStatsPeriod {
        self.period_at(granularity, Utc::now())
    }

    pub(crate) fn period_at(&self, granularity: Granularity, now: DateTime<Utc>) -> PoolStatsPeriod {
        self.buckets.read().current(granularity, now)
    }

    /// Timeout ratio over the current minute
    pub fn recent_timeout_ratio(&self) -> f64 {
        self.period(Granularity::Minute).timeout_ratio()
    }

    /// Copy every bucket for export
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        let now = Utc::now();
        let buckets = self.buckets.read();
        PoolStatsSnapshot {
            taken_at: now,
            current_size: buckets.current_size,
            periods: Granularity::ALL
                .iter()
                .map(|g| buckets.current(*g, now))
                .collect(),
        }
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.read();
        f.debug_struct("PoolStats")
            .field("current_size", &buckets.current_size)
            .field("all_time", &buckets.periods[Granularity::AllTime.index()])
            .finish()
    }
}
