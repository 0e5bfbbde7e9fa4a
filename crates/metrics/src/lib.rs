//! Counters and freshness tracking for a running depth feed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

/// Events counted by [`FeedMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Text frame from either subscription.
    Frame,
    DepthUpdate,
    Trade,
    ParseError,
    /// Price level discarded by the parser or the book.
    DroppedLevel,
    TransportError,
    ReconnectAttempt,
    ReconnectSuccess,
    SnapshotFetched,
    SnapshotFailed,
}

impl Counter {
    const COUNT: usize = 10;

    fn slot(self) -> usize {
        self as usize
    }

    fn marks(self) -> Option<Mark> {
        match self {
            Counter::Frame => Some(Mark::Frame),
            Counter::ParseError | Counter::TransportError | Counter::SnapshotFailed => {
                Some(Mark::Error)
            }
            Counter::ReconnectAttempt => Some(Mark::Reconnect),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Mark {
    Frame,
    Error,
    Reconnect,
}

#[derive(Debug)]
struct Marks {
    started: Instant,
    frame: Option<Instant>,
    error: Option<Instant>,
    reconnect: Option<Instant>,
}

/// Thread-safe metrics shared by the feed links and the applier.
#[derive(Debug)]
pub struct FeedMetrics {
    counts: [AtomicU64; Counter::COUNT],
    marks: RwLock<Marks>,
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn since(mark: Option<Instant>) -> Option<f64> {
    mark.map(|t| t.elapsed().as_secs_f64())
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            counts: Default::default(),
            marks: RwLock::new(Marks {
                started: Instant::now(),
                frame: None,
                error: None,
                reconnect: None,
            }),
        }
    }

    pub fn record(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Add `n` to a counter. Zero is a no-op and leaves timestamps alone.
    pub fn add(&self, counter: Counter, n: u64) {
        if n == 0 {
            return;
        }
        self.counts[counter.slot()].fetch_add(n, Ordering::Relaxed);
        if let Some(mark) = counter.marks() {
            let now = Some(Instant::now());
            let mut marks = self.marks.write();
            match mark {
                Mark::Frame => marks.frame = now,
                Mark::Error => marks.error = now,
                Mark::Reconnect => marks.reconnect = now,
            }
        }
    }

    pub fn count(&self, counter: Counter) -> u64 {
        self.counts[counter.slot()].load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.marks.read().started.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_frame(&self) -> Option<f64> {
        since(self.marks.read().frame)
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        since(self.marks.read().error)
    }

    pub fn secs_since_last_reconnect(&self) -> Option<f64> {
        since(self.marks.read().reconnect)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let marks = self.marks.read();
        MetricsSnapshot {
            frames_received: self.count(Counter::Frame),
            depth_updates: self.count(Counter::DepthUpdate),
            trades_received: self.count(Counter::Trade),
            parse_errors: self.count(Counter::ParseError),
            dropped_levels: self.count(Counter::DroppedLevel),
            transport_errors: self.count(Counter::TransportError),
            reconnect_attempts: self.count(Counter::ReconnectAttempt),
            reconnect_successes: self.count(Counter::ReconnectSuccess),
            snapshots_fetched: self.count(Counter::SnapshotFetched),
            snapshots_failed: self.count(Counter::SnapshotFailed),
            uptime_secs: marks.started.elapsed().as_secs_f64(),
            secs_since_last_frame: since(marks.frame),
            secs_since_last_error: since(marks.error),
        }
    }
}

/// Point-in-time copy of the counters, logged periodically and on exit.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub depth_updates: u64,
    pub trades_received: u64,
    pub parse_errors: u64,
    pub dropped_levels: u64,
    pub transport_errors: u64,
    pub reconnect_attempts: u64,
    pub reconnect_successes: u64,
    pub snapshots_fetched: u64,
    pub snapshots_failed: u64,
    pub uptime_secs: f64,
    pub secs_since_last_frame: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Feed health, judged by data freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// No frame for more than 30 s.
    Degraded,
    /// No frame for more than 60 s.
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
        })
    }
}

const DEGRADED_AFTER_SECS: f64 = 30.0;
const UNHEALTHY_AFTER_SECS: f64 = 60.0;

impl MetricsSnapshot {
    pub fn health_status(&self) -> HealthStatus {
        // Before the first frame, judge by how long we have been waiting
        let idle = self.secs_since_last_frame.unwrap_or(self.uptime_secs);
        if idle > UNHEALTHY_AFTER_SECS {
            HealthStatus::Unhealthy
        } else if idle > DEGRADED_AFTER_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, String); 8] = [
            ("uptime", format!("{:.1}s", self.uptime_secs)),
            ("frames", self.frames_received.to_string()),
            (
                "depth / trades",
                format!("{} / {}", self.depth_updates, self.trades_received),
            ),
            ("parse errors", self.parse_errors.to_string()),
            ("dropped levels", self.dropped_levels.to_string()),
            ("transport errors", self.transport_errors.to_string()),
            (
                "reconnects",
                format!(
                    "{} attempted / {} ok",
                    self.reconnect_attempts, self.reconnect_successes
                ),
            ),
            (
                "snapshots",
                format!(
                    "{} ok / {} failed",
                    self.snapshots_fetched, self.snapshots_failed
                ),
            ),
        ];
        writeln!(f, "feed metrics ({})", self.health_status())?;
        for (label, value) in rows {
            writeln!(f, "  {label:<17} {value}")?;
        }
        if let Some(secs) = self.secs_since_last_frame {
            writeln!(f, "  {:<17} {secs:.1}s ago", "last frame")?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "  {:<17} {secs:.1}s ago", "last error")?;
        }
        Ok(())
    }
}

pub type SharedMetrics = Arc<FeedMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(FeedMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(uptime_secs: f64, secs_since_last_frame: Option<f64>) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs,
            secs_since_last_frame,
            ..MetricsSnapshot::default()
        }
    }

    #[test]
    fn test_counters_are_independent() {
        let metrics = FeedMetrics::new();

        metrics.record(Counter::Frame);
        metrics.record(Counter::Frame);
        metrics.record(Counter::DepthUpdate);
        metrics.add(Counter::DroppedLevel, 3);
        metrics.add(Counter::DroppedLevel, 0);

        assert_eq!(metrics.count(Counter::Frame), 2);
        assert_eq!(metrics.count(Counter::DepthUpdate), 1);
        assert_eq!(metrics.count(Counter::DroppedLevel), 3);
        assert_eq!(metrics.count(Counter::Trade), 0);
        assert_eq!(metrics.count(Counter::SnapshotFailed), 0);
    }

    #[test]
    fn test_counter_slots_fit() {
        assert_eq!(Counter::SnapshotFailed.slot(), Counter::COUNT - 1);
    }

    #[test]
    fn test_errors_and_reconnects_mark_time() {
        let metrics = FeedMetrics::new();
        assert!(metrics.secs_since_last_error().is_none());

        metrics.record(Counter::ReconnectSuccess);
        assert!(metrics.secs_since_last_reconnect().is_none());

        metrics.record(Counter::SnapshotFailed);
        metrics.record(Counter::ReconnectAttempt);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.snapshots_failed, 1);
        assert_eq!(snapshot.reconnect_attempts, 1);
        assert_eq!(snapshot.reconnect_successes, 1);
        assert!(snapshot.secs_since_last_error.is_some());
        assert!(metrics.secs_since_last_reconnect().is_some());
    }

    #[test]
    fn test_frame_marks_freshness() {
        let metrics = FeedMetrics::new();
        assert!(metrics.secs_since_last_frame().is_none());

        metrics.record(Counter::Frame);

        assert!(matches!(metrics.secs_since_last_frame(), Some(secs) if secs < 1.0));
    }

    #[test]
    fn test_health_during_startup() {
        assert_eq!(idle(10.0, None).health_status(), HealthStatus::Healthy);
        assert_eq!(idle(45.0, None).health_status(), HealthStatus::Degraded);
        assert_eq!(idle(120.0, None).health_status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_follows_last_frame() {
        assert_eq!(idle(120.0, Some(5.0)).health_status(), HealthStatus::Healthy);
        assert_eq!(idle(120.0, Some(45.0)).health_status(), HealthStatus::Degraded);
        assert_eq!(idle(300.0, Some(90.0)).health_status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_thresholds_exclusive() {
        assert_eq!(idle(120.0, Some(30.0)).health_status(), HealthStatus::Healthy);
        assert_eq!(idle(120.0, Some(60.0)).health_status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_display_lists_counters() {
        let metrics = FeedMetrics::new();
        metrics.record(Counter::SnapshotFetched);

        let text = metrics.snapshot().to_string();

        assert!(text.starts_with("feed metrics (HEALTHY)"));
        assert!(text.contains("snapshots         1 ok / 0 failed"));
    }
}
