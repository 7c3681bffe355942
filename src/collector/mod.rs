use std::collections::HashMap;

use crate::flow_generator::TIME_BUCKETS;

/// Accumulated totals for one fingerprint. Latency samples land in random
/// slots of a fixed array, giving a coarse percentile estimate without
/// unbounded growth.
pub struct QueryStats {
    pub count: u64,
    pub total_bytes: u64,
    times: Box<[u64]>,
}

impl QueryStats {
    fn new() -> Self {
        Self {
            count: 0,
            total_bytes: 0,
            times: vec![0u64; TIME_BUCKETS].into_boxed_slice(),
        }
    }
}

/// Summary aggregation over all fingerprints seen by the pipeline. Not on
/// the publish path; dumped to the log on demand and at shutdown.
#[derive(Default)]
pub struct QueryStatsMap {
    buckets: HashMap<String, QueryStats>,
}

impl QueryStatsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(&mut self, fingerprint: &str, body_len: usize) {
        let bucket = self
            .buckets
            .entry(fingerprint.to_string())
            .or_insert_with(QueryStats::new);
        bucket.count += 1;
        bucket.total_bytes += body_len as u64;
    }

    pub fn on_response(&mut self, fingerprint: &str, payload_len: usize, slot: usize, latency_ns: u64) {
        if let Some(bucket) = self.buckets.get_mut(fingerprint) {
            bucket.total_bytes += payload_len as u64;
            bucket.times[slot] = latency_ns;
        }
    }

    /// Adds stray response bytes to an existing bucket, for responses that
    /// arrive when no request is pending.
    pub fn on_orphan_response(&mut self, fingerprint: &str, payload_len: usize) {
        if let Some(bucket) = self.buckets.get_mut(fingerprint) {
            bucket.total_bytes += payload_len as u64;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Renders one line per fingerprint, busiest first.
    pub fn report(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &QueryStats)> = self.buckets.iter().collect();
        entries.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        entries
            .iter()
            .map(|(fingerprint, stats)| {
                let mut samples: Vec<u64> =
                    stats.times.iter().copied().filter(|&t| t > 0).collect();
                samples.sort_unstable();
                format!(
                    "count={} bytes={} p50={:.1}us p95={:.1}us p99={:.1}us {}",
                    stats.count,
                    stats.total_bytes,
                    percentile(&samples, 0.50) as f64 / 1000.0,
                    percentile(&samples, 0.95) as f64 / 1000.0,
                    percentile(&samples, 0.99) as f64 / 1000.0,
                    fingerprint,
                )
            })
            .collect()
    }
}

/// Percentile line over the non-empty slots of a latency array, or `None`
/// when nothing was sampled.
pub fn summarize_latency(times: &[u64]) -> Option<String> {
    let mut samples: Vec<u64> = times.iter().copied().filter(|&t| t > 0).collect();
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    Some(format!(
        "p50={:.1}us p95={:.1}us p99={:.1}us",
        percentile(&samples, 0.50) as f64 / 1000.0,
        percentile(&samples, 0.95) as f64 / 1000.0,
        percentile(&samples, 0.99) as f64 / 1000.0,
    ))
}

fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
