use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// What the transfer is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProgressAction {
    #[default]
    None,
    Uploading,
    Downloading,
}

impl ProgressAction {
    const fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Uploading => 1,
            Self::Downloading => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Uploading,
            2 => Self::Downloading,
            _ => Self::None,
        }
    }
}

/// Returned by the progress hooks once [`Progress::stop`] has been called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transfer stopped by user")]
pub struct Cancelled;

/// Live transfer counters shared between a client and other threads.
///
/// The transport updates the counters while an exchange runs and checks the
/// stop flag on every update, so cancellation takes effect at the next
/// progress tick rather than immediately.
#[derive(Debug, Default)]
pub struct Progress {
    action: AtomicU8,
    cur_upload: AtomicU64,
    total_upload: AtomicU64,
    cur_download: AtomicU64,
    total_download: AtomicU64,
    force_stop: AtomicBool,
}

/// Point-in-time copy of [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub action: ProgressAction,
    pub cur_upload: u64,
    pub total_upload: u64,
    pub cur_download: u64,
    pub total_download: u64,
    pub force_stop: bool,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running transfer to abort.
    pub fn stop(&self) {
        self.force_stop.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.force_stop.load(Ordering::SeqCst)
    }

    /// Zero every counter and clear the stop flag.
    pub fn reset(&self) {
        self.action.store(ProgressAction::None.as_u8(), Ordering::SeqCst);
        self.cur_upload.store(0, Ordering::SeqCst);
        self.total_upload.store(0, Ordering::SeqCst);
        self.cur_download.store(0, Ordering::SeqCst);
        self.total_download.store(0, Ordering::SeqCst);
        self.force_stop.store(false, Ordering::SeqCst);
    }

    /// Check the stop flag without touching counters.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once [`stop`](Self::stop) has been called.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_stopped() { Err(Cancelled) } else { Ok(()) }
    }

    /// Record upload progress. `total` is zero when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once [`stop`](Self::stop) has been called.
    pub fn upload(&self, current: u64, total: u64) -> Result<(), Cancelled> {
        self.action
            .store(ProgressAction::Uploading.as_u8(), Ordering::SeqCst);
        self.cur_upload.store(current, Ordering::SeqCst);
        self.total_upload.store(total, Ordering::SeqCst);
        self.check()
    }

    /// Record download progress. `total` is zero when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once [`stop`](Self::stop) has been called.
    pub fn download(&self, current: u64, total: u64) -> Result<(), Cancelled> {
        self.action
            .store(ProgressAction::Downloading.as_u8(), Ordering::SeqCst);
        self.cur_download.store(current, Ordering::SeqCst);
        self.total_download.store(total, Ordering::SeqCst);
        self.check()
    }

    /// Mark the transfer as idle, keeping the counters.
    pub fn finish(&self) {
        self.action.store(ProgressAction::None.as_u8(), Ordering::SeqCst);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            action: ProgressAction::from_u8(self.action.load(Ordering::SeqCst)),
            cur_upload: self.cur_upload.load(Ordering::SeqCst),
            total_upload: self.total_upload.load(Ordering::SeqCst),
            cur_download: self.cur_download.load(Ordering::SeqCst),
            total_download: self.total_download.load(Ordering::SeqCst),
            force_stop: self.is_stopped(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_updates_are_visible_in_snapshot() {
        let progress = Progress::new();
        progress.upload(10, 100).unwrap();
        let snap = progress.snapshot();
        assert_eq!(snap.action, ProgressAction::Uploading);
        assert_eq!((snap.cur_upload, snap.total_upload), (10, 100));

        progress.download(5, 0).unwrap();
        assert_eq!(progress.snapshot().action, ProgressAction::Downloading);
        progress.finish();
        assert_eq!(progress.snapshot().action, ProgressAction::None);
        assert_eq!(progress.snapshot().cur_download, 5);
    }

    #[test]
    fn test_stop_from_other_thread_cancels_next_tick() {
        let progress = Arc::new(Progress::new());
        let remote = Arc::clone(&progress);
        std::thread::spawn(move || remote.stop()).join().unwrap();

        assert_eq!(progress.download(1, 2), Err(Cancelled));
        assert!(progress.snapshot().force_stop);
    }

    #[test]
    fn test_reset_clears_stop_flag() {
        let progress = Progress::new();
        progress.upload(3, 3).unwrap();
        progress.stop();
        progress.reset();
        assert_eq!(progress.snapshot(), ProgressSnapshot::default());
        assert!(progress.check().is_ok());
    }
}
