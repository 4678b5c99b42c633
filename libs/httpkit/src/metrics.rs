use std::time::Duration;

use crate::fsio::format_bytes;

/// Counters for one client call, summed over retries and redirect passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferMetrics {
    /// Exchanges executed, first attempts and retries alike.
    pub attempts: u32,
    /// Exchanges repeated after a transient failure.
    pub retries: u32,
    /// Redirect passes followed.
    pub redirects: u32,
    /// Time spent inside the transport.
    pub elapsed: Duration,
    pub upload_bytes: u64,
    pub download_bytes: u64,
}

impl TransferMetrics {
    pub(crate) fn record(&mut self, elapsed: Duration, upload_bytes: u64, download_bytes: u64) {
        self.attempts += 1;
        self.elapsed += elapsed;
        self.upload_bytes += upload_bytes;
        self.download_bytes += download_bytes;
    }

    /// Average upload speed in bytes per second.
    #[must_use]
    pub fn upload_speed(&self) -> u64 {
        speed(self.upload_bytes, self.elapsed)
    }

    /// Average download speed in bytes per second.
    #[must_use]
    pub fn download_speed(&self) -> u64 {
        speed(self.download_bytes, self.elapsed)
    }

    /// One-line human readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "attempts={} retries={} redirects={} elapsed={}ms up={} ({}/s) down={} ({}/s)",
            self.attempts,
            self.retries,
            self.redirects,
            self.elapsed.as_millis(),
            format_bytes(self.upload_bytes),
            format_bytes(self.upload_speed()),
            format_bytes(self.download_bytes),
            format_bytes(self.download_speed()),
        )
    }
}

fn speed(bytes: u64, elapsed: Duration) -> u64 {
    (u128::from(bytes) * 1_000_000)
        .checked_div(elapsed.as_micros())
        .map_or(0, |per_sec| u64::try_from(per_sec).unwrap_or(u64::MAX))
}
