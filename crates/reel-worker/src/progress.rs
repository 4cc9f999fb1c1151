//! Weighted multi-stage progress.
//!
//! | Stage                         | Range    |
//! |-------------------------------|----------|
//! | Fetch + build, per item       | 0-40     |
//! | Resolution normalization      | 40-60    |
//! | Concatenation                 | 60-70    |
//! | Encoding                      | 70-99    |
//!
//! 100 is never reported here; only job completion sets it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use reel_models::job::MAX_IN_FLIGHT_PROGRESS;
use reel_models::JobUpdate;
use reel_queue::StatusSender;

const ITEMS_END: u32 = 40;
const NORMALIZE_END: u8 = 60;
const ENCODE_START: u8 = 70;
const ENCODE_SPAN: f64 = 30.0;

/// Receives every accepted progress value.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: u8, message: &str);
}

impl ProgressObserver for StatusSender {
    fn on_progress(&self, progress: u8, message: &str) {
        self.send(JobUpdate::progress(progress, message));
    }
}

struct Inner {
    total_items: usize,
    last: AtomicU8,
    observer: Arc<dyn ProgressObserver>,
}

/// Maps pipeline stages onto one non-decreasing percentage.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

impl ProgressTracker {
    pub fn new(total_items: usize, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                total_items: total_items.max(1),
                last: AtomicU8::new(0),
                observer,
            }),
        }
    }

    /// Last reported value.
    pub fn current(&self) -> u8 {
        self.inner.last.load(Ordering::Acquire)
    }

    /// Report a value; anything below the last report is dropped.
    pub fn report(&self, progress: u8, message: &str) {
        let progress = progress.min(MAX_IN_FLIGHT_PROGRESS);
        let previous = self.inner.last.fetch_max(progress, Ordering::AcqRel);
        if progress >= previous {
            self.inner.observer.on_progress(progress, message);
        }
    }

    fn item_boundary(&self, index: usize) -> u8 {
        let n = self.inner.total_items as u32;
        (ITEMS_END * (index as u32).min(n) / n) as u8
    }

    pub fn item_started(&self, index: usize) {
        let message = format!("Processing media item {}/{}", index + 1, self.inner.total_items);
        self.report(self.item_boundary(index), &message);
    }

    pub fn item_finished(&self, index: usize) {
        let message = format!("Processed media item {}/{}", index + 1, self.inner.total_items);
        self.report(self.item_boundary(index + 1), &message);
    }

    pub fn normalizing(&self) {
        self.report(ITEMS_END as u8, "Normalizing clip resolutions");
    }

    pub fn normalized(&self) {
        self.report(NORMALIZE_END, "Clip resolutions normalized");
    }

    pub fn concatenating(&self) {
        self.report(NORMALIZE_END, "Concatenating clips");
    }

    pub fn encoding_started(&self) {
        self.report(ENCODE_START, "Encoding final video");
    }

    /// Encoder progress as a fraction of the timeline.
    pub fn encoding(&self, fraction: f64) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let value = ENCODE_START as f64 + (ENCODE_SPAN * fraction).floor();
        self.report(value as u8, "Encoding final video");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<u8>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, progress: u8, _message: &str) {
            self.values.lock().unwrap().push(progress);
        }
    }

    fn tracker(n: usize) -> (ProgressTracker, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (ProgressTracker::new(n, recorder.clone()), recorder)
    }

    #[test]
    fn test_item_boundaries() {
        let (t, rec) = tracker(3);
        for i in 0..3 {
            t.item_started(i);
            t.item_finished(i);
        }
        assert_eq!(*rec.values.lock().unwrap(), vec![0, 13, 13, 26, 26, 40]);
    }

    #[test]
    fn test_full_run_is_monotonic_and_capped() {
        let (t, rec) = tracker(2);
        t.item_started(0);
        t.item_finished(0);
        t.item_started(1);
        t.item_finished(1);
        t.normalizing();
        t.normalized();
        t.concatenating();
        t.encoding_started();
        for f in [0.0, 0.25, 0.5, 0.9, 1.0] {
            t.encoding(f);
        }

        let values = rec.values.lock().unwrap().clone();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(values.last(), Some(&99));
        assert!(values.contains(&40) && values.contains(&60) && values.contains(&70));
        assert!(!values.contains(&100));
    }

    #[test]
    fn test_stale_reports_are_dropped() {
        let (t, rec) = tracker(1);
        t.encoding_started();
        t.item_finished(0);
        t.encoding(0.5);
        assert_eq!(*rec.values.lock().unwrap(), vec![70, 85]);
        assert_eq!(t.current(), 85);
    }

    #[test]
    fn test_bad_fraction_is_ignored() {
        let (t, rec) = tracker(1);
        t.encoding(f64::NAN);
        t.encoding(7.0);
        assert_eq!(*rec.values.lock().unwrap(), vec![70, 99]);
    }
}
