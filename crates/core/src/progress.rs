//! Aggregate progress across a batch of jobs.

use crate::job::JobStatus;

/// Overall completion percentage of a batch.
///
/// Sums the percent of every job that has reported a progress record and
/// divides by the *total* number of jobs, so jobs that have not reported
/// yet pull the average down. An empty batch is 0% complete.
pub fn aggregate_percent<'a, I>(statuses: I, total_jobs: usize) -> u8
where
    I: IntoIterator<Item = &'a JobStatus>,
{
    if total_jobs == 0 {
        return 0;
    }

    let sum: u64 = statuses
        .into_iter()
        .filter_map(|s| s.progress.as_ref())
        .map(|p| u64::from(p.percent))
        .sum();

    let mean = (sum as f64 / total_jobs as f64).round();
    mean.clamp(0.0, 100.0) as u8
}
