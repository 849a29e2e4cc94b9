// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Quota Coordinator
//!
//! Tracks storage usage for the server's upload directory and gates new
//! uploads against a total-byte quota and a per-file size limit. A
//! transfer reserves space before it starts receiving chunks, commits the
//! reservation once the file lands on disk, and releases it if the
//! transfer is cancelled or fails - so concurrent uploads can't
//! collectively overrun the quota between the check and the write.

use std::collections::HashSet;

use parking_lot::Mutex;

use transfer_domain::TransferError;

/// Storage usage as of the last mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaUsage {
    pub used_bytes: u64,
    pub reserved_bytes: u64,
    pub total_quota: u64,
    pub file_count: u64,
    pub usage_percent: f64,
}

impl QuotaUsage {
    pub fn available_bytes(&self) -> u64 {
        if self.total_quota == 0 {
            u64::MAX
        } else {
            self.total_quota
                .saturating_sub(self.used_bytes)
                .saturating_sub(self.reserved_bytes)
        }
    }
}

struct QuotaState {
    used_bytes: u64,
    reserved_bytes: u64,
    file_count: u64,
    /// Thresholds (0.0-100.0) whose callback has already fired since the
    /// last `reset_threshold_triggers`.
    triggered: HashSet<u64>,
}

pub type WarningCallback = Box<dyn Fn(QuotaUsage) + Send + Sync>;

pub struct QuotaCoordinator {
    total_quota: u64,
    max_file_size: u64,
    warning_thresholds: Mutex<Vec<f64>>,
    state: Mutex<QuotaState>,
    on_warning: Mutex<Option<WarningCallback>>,
}

impl QuotaCoordinator {
    /// `total_quota_bytes == 0` means unlimited.
    pub fn new(total_quota_bytes: u64, max_file_size_bytes: u64) -> Self {
        Self {
            total_quota: total_quota_bytes,
            max_file_size: max_file_size_bytes,
            warning_thresholds: Mutex::new(vec![70.0, 85.0, 95.0]),
            state: Mutex::new(QuotaState {
                used_bytes: 0,
                reserved_bytes: 0,
                file_count: 0,
                triggered: HashSet::new(),
            }),
            on_warning: Mutex::new(None),
        }
    }

    pub fn set_warning_thresholds(&self, thresholds: Vec<f64>) {
        *self.warning_thresholds.lock() = thresholds;
    }

    pub fn on_warning(&self, callback: WarningCallback) {
        *self.on_warning.lock() = Some(callback);
    }

    /// Clears the once-per-crossing guard so thresholds already passed can
    /// fire their callback again on the next crossing.
    pub fn reset_threshold_triggers(&self) {
        self.state.lock().triggered.clear();
    }

    fn usage_locked(&self, state: &QuotaState) -> QuotaUsage {
        let usage_percent = if self.total_quota == 0 {
            0.0
        } else {
            (state.used_bytes as f64 / self.total_quota as f64) * 100.0
        };
        QuotaUsage {
            used_bytes: state.used_bytes,
            reserved_bytes: state.reserved_bytes,
            total_quota: self.total_quota,
            file_count: state.file_count,
            usage_percent,
        }
    }

    pub fn usage(&self) -> QuotaUsage {
        let state = self.state.lock();
        self.usage_locked(&state)
    }

    fn check_thresholds(&self, state: &mut QuotaState) {
        if self.total_quota == 0 {
            return;
        }
        let usage = self.usage_locked(state);
        let thresholds = self.warning_thresholds.lock();
        for &threshold in thresholds.iter() {
            let key = threshold.to_bits();
            if usage.usage_percent >= threshold && state.triggered.insert(key) {
                if let Some(callback) = self.on_warning.lock().as_ref() {
                    callback(usage);
                }
            }
        }
    }

    /// Validates a filename (no traversal, no NUL, no absolute path) and
    /// file size before a transfer is accepted. Does not reserve space -
    /// call [`QuotaCoordinator::reserve`] once the size is confirmed.
    pub fn check_incoming(&self, filename: &str, file_size: u64) -> Result<(), TransferError> {
        if filename.is_empty() || filename.contains("..") || filename.contains('\0') {
            return Err(TransferError::InvalidFilePath(format!("unsafe filename: {filename}")));
        }
        if std::path::Path::new(filename).is_absolute() {
            return Err(TransferError::InvalidFilePath(format!("absolute filename rejected: {filename}")));
        }
        if self.max_file_size > 0 && file_size > self.max_file_size {
            return Err(TransferError::FileTooLarge(format!(
                "{file_size} bytes exceeds the {max} byte limit",
                max = self.max_file_size
            )));
        }
        Ok(())
    }

    /// Reserves `bytes` against the quota ahead of actually writing them.
    /// Paired with `commit` (on success) or `release` (on cancel/failure).
    pub fn reserve(&self, bytes: u64) -> Result<(), TransferError> {
        let mut state = self.state.lock();
        if self.total_quota > 0 {
            let projected = state.used_bytes + state.reserved_bytes + bytes;
            if projected > self.total_quota {
                return Err(TransferError::QuotaExceeded(format!(
                    "{projected} bytes would exceed the {quota} byte quota",
                    quota = self.total_quota
                )));
            }
        }
        state.reserved_bytes += bytes;
        Ok(())
    }

    /// Moves `bytes` from reserved to used, as a completed transfer's
    /// final byte count (which may differ slightly from the reservation
    /// if the file's declared size and actual size disagree).
    pub fn commit(&self, reserved_bytes: u64, actual_bytes: u64) {
        let mut state = self.state.lock();
        state.reserved_bytes = state.reserved_bytes.saturating_sub(reserved_bytes);
        state.used_bytes += actual_bytes;
        state.file_count += 1;
        self.check_thresholds(&mut state);
    }

    /// Releases a reservation without ever writing the bytes (cancelled
    /// or failed transfer).
    pub fn release(&self, reserved_bytes: u64) {
        let mut state = self.state.lock();
        state.reserved_bytes = state.reserved_bytes.saturating_sub(reserved_bytes);
    }

    /// Accounts for a file removed from storage outside a reserve/commit
    /// pair (administrative deletion, expired resume state cleanup).
    pub fn record_bytes_removed(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.used_bytes = state.used_bytes.saturating_sub(bytes);
        state.file_count = state.file_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const KB: u64 = 1024;

    #[test]
    fn zero_quota_means_unlimited() {
        let quota = QuotaCoordinator::new(0, 0);
        assert!(quota.reserve(10 * 1024 * 1024 * 1024).is_ok());
    }

    #[test]
    fn reserve_fails_once_quota_would_be_exceeded() {
        let quota = QuotaCoordinator::new(100 * KB, 0);
        quota.reserve(80 * KB).unwrap();
        let err = quota.reserve(30 * KB).unwrap_err();
        assert!(matches!(err, TransferError::QuotaExceeded(_)));
    }

    #[test]
    fn check_incoming_rejects_oversize_files() {
        let quota = QuotaCoordinator::new(100 * KB, 10 * KB);
        let err = quota.check_incoming("report.bin", 15 * KB).unwrap_err();
        assert!(matches!(err, TransferError::FileTooLarge(_)));
    }

    #[test]
    fn check_incoming_rejects_path_traversal() {
        let quota = QuotaCoordinator::new(100 * KB, 0);
        let err = quota.check_incoming("../escape.bin", 1).unwrap_err();
        assert!(matches!(err, TransferError::InvalidFilePath(_)));
    }

    #[test]
    fn commit_moves_bytes_from_reserved_to_used() {
        let quota = QuotaCoordinator::new(100 * KB, 0);
        quota.reserve(30 * KB).unwrap();
        quota.commit(30 * KB, 30 * KB);
        let usage = quota.usage();
        assert_eq!(usage.used_bytes, 30 * KB);
        assert_eq!(usage.reserved_bytes, 0);
        assert_eq!(usage.file_count, 1);
    }

    #[test]
    fn release_frees_a_reservation_without_affecting_used_bytes() {
        let quota = QuotaCoordinator::new(100 * KB, 0);
        quota.reserve(30 * KB).unwrap();
        quota.release(30 * KB);
        let usage = quota.usage();
        assert_eq!(usage.used_bytes, 0);
        assert_eq!(usage.reserved_bytes, 0);
    }

    #[test]
    fn warning_callback_fires_once_per_threshold_crossing() {
        let quota = QuotaCoordinator::new(100 * KB, 0);
        quota.set_warning_thresholds(vec![50.0]);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        quota.on_warning(Box::new(move |_usage| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        quota.reserve(60 * KB).unwrap();
        quota.commit(60 * KB, 60 * KB);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        quota.reserve(5 * KB).unwrap();
        quota.commit(5 * KB, 5 * KB);
        assert_eq!(fired.load(Ordering::SeqCst), 1, "threshold already triggered should not fire again");

        quota.reset_threshold_triggers();
        quota.reserve(1 * KB).unwrap();
        quota.commit(1 * KB, 1 * KB);
        assert_eq!(fired.load(Ordering::SeqCst), 2, "reset should allow the threshold to fire again");
    }

    #[test]
    fn warning_callback_does_not_fire_below_threshold() {
        let quota = QuotaCoordinator::new(100 * KB, 0);
        quota.set_warning_thresholds(vec![80.0]);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        quota.on_warning(Box::new(move |_usage| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        quota.reserve(50 * KB).unwrap();
        quota.commit(50 * KB, 50 * KB);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
