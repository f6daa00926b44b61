//! Random single-row selection policy.
//!
//! Ordering a whole table by `random()` is a full scan plus a sort. Above a
//! row-count threshold Postgres picks a block sample (`TABLESAMPLE SYSTEM`)
//! sized to yield roughly [`SAMPLE_TARGET_ROWS`] rows and only those are
//! ordered.

/// Planner row estimate above which block sampling is used.
pub const DEFAULT_SAMPLE_THRESHOLD: i64 = 10_000;

/// Rows a block sample should return on average.
pub const SAMPLE_TARGET_ROWS: f64 = 100.0;

/// Smallest percentage `TABLESAMPLE SYSTEM` is asked for.
const MIN_SAMPLE_PERCENT: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingPlan {
    /// `ORDER BY random() LIMIT 1` over the whole table.
    FullScan,
    /// `TABLESAMPLE SYSTEM (percent)` then order the sample.
    SystemSample { percent: f64 },
}

impl SamplingPlan {
    /// Picks a plan from the planner's row estimate.
    ///
    /// Postgres reports `-1` for tables that were never analyzed; any
    /// non-positive estimate is treated as "small".
    pub fn for_estimate(estimated_rows: i64, threshold: i64) -> Self {
        if estimated_rows <= 0 || estimated_rows <= threshold {
            return SamplingPlan::FullScan;
        }
        let percent = (SAMPLE_TARGET_ROWS * 100.0 / estimated_rows as f64).clamp(MIN_SAMPLE_PERCENT, 100.0);
        SamplingPlan::SystemSample { percent }
    }
}
