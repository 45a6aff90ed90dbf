use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Counters and timing for one compile run.
///
/// Owned by the orchestrator and mutated only by its compile stage.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    scripts_count: usize,
    command_count: usize,
    success_count: usize,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    finished_wall: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub scripts_count: usize,
    pub command_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub elapsed_secs: f64,
    pub average_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn new(scripts_count: usize) -> Self {
        Self {
            scripts_count,
            ..Self::default()
        }
    }

    pub fn begin(&mut self, command_count: usize) {
        self.command_count = command_count;
        self.success_count = 0;
        self.started_at = Some(Instant::now());
        self.started_wall = Some(Utc::now());
        self.finished_at = None;
        self.finished_wall = None;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
        self.finished_wall = Some(Utc::now());
    }

    /// Adds `successes` to the success counter, never past the command count.
    pub fn record_successes(&mut self, successes: usize) {
        self.success_count = (self.success_count + successes).min(self.command_count);
    }

    pub fn scripts_count(&self) -> usize {
        self.scripts_count
    }

    pub fn command_count(&self) -> usize {
        self.command_count
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failed_count(&self) -> usize {
        self.command_count - self.success_count
    }

    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Elapsed time per successful command. With no successes the whole
    /// elapsed time is reported instead of dividing by zero.
    pub fn average(&self) -> Duration {
        let elapsed = self.elapsed();
        match u32::try_from(self.success_count) {
            Ok(0) => elapsed,
            Ok(count) => elapsed / count,
            Err(_) => elapsed.div_f64(self.success_count as f64),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Compilation time: {:.3}s ({:.3}s/script) - {} succeeded, {} failed ({} scripts)",
            self.elapsed().as_secs_f64(),
            self.average().as_secs_f64(),
            self.success_count,
            self.failed_count(),
            self.scripts_count
        )
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scripts_count: self.scripts_count,
            command_count: self.command_count,
            success_count: self.success_count,
            failed_count: self.failed_count(),
            elapsed_secs: self.elapsed().as_secs_f64(),
            average_secs: self.average().as_secs_f64(),
            started_at: self.started_wall,
            finished_at: self.finished_wall,
        }
    }
}

pub fn log_snapshot(snapshot: &StatsSnapshot) {
    info!(
        scripts = snapshot.scripts_count,
        commands = snapshot.command_count,
        succeeded = snapshot.success_count,
        failed = snapshot.failed_count,
        elapsed_secs = snapshot.elapsed_secs,
        average_secs = snapshot.average_secs,
        "Compile statistics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_elapsed(elapsed: Duration, commands: usize, successes: usize) -> RunStats {
        let start = Instant::now();
        let mut stats = RunStats::new(3);
        stats.command_count = commands;
        stats.success_count = successes;
        stats.started_at = Some(start);
        stats.finished_at = Some(start + elapsed);
        stats
    }

    #[test]
    fn average_falls_back_to_elapsed_without_successes() {
        let stats = stats_with_elapsed(Duration::from_millis(4200), 2, 0);
        assert_eq!(stats.average(), Duration::from_millis(4200));
        assert_eq!(stats.failed_count(), 2);
    }

    #[test]
    fn average_divides_by_successes() {
        let stats = stats_with_elapsed(Duration::from_millis(3000), 3, 2);
        assert_eq!(stats.average(), Duration::from_millis(1500));
    }

    #[test]
    fn summary_uses_three_decimals() {
        let stats = stats_with_elapsed(Duration::from_millis(1500), 3, 2);
        assert_eq!(
            stats.summary(),
            "Compilation time: 1.500s (0.750s/script) - 2 succeeded, 1 failed (3 scripts)"
        );
    }

    #[test]
    fn successes_never_exceed_commands() {
        let mut stats = RunStats::new(1);
        stats.begin(2);
        stats.record_successes(5);
        stats.finish();
        assert_eq!(stats.success_count(), 2);
        assert_eq!(stats.failed_count(), 0);
    }

    #[test]
    fn begin_resets_previous_counts() {
        let mut stats = RunStats::new(1);
        stats.begin(4);
        stats.record_successes(3);
        stats.begin(1);
        assert_eq!(stats.command_count(), 1);
        assert_eq!(stats.success_count(), 0);
    }
}
