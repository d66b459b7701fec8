/// Receives fractional progress reports during a chunked download.
///
/// The downloader reports once per network chunk, after the chunk has been
/// copied into the buffer. Fractions are in `[0.0, 1.0]` and never decrease
/// over the lifetime of one download.
pub trait ProgressObserver: Send + Sync {
    fn progress(&self, fraction: f64);
}

impl<F> ProgressObserver for F
where
    F: Fn(f64) + Send + Sync,
{
    fn progress(&self, fraction: f64) {
        self(fraction)
    }
}

/// Observer that discards every report, for callers that don't track
/// progress.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn progress(&self, _fraction: f64) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ProgressObserver;
    use std::sync::Mutex;

    /// Records every reported fraction, for asserting on sequences.
    #[derive(Default)]
    pub struct RecordingObserver {
        reports: Mutex<Vec<f64>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<f64> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl ProgressObserver for RecordingObserver {
        fn progress(&self, fraction: f64) {
            self.reports.lock().unwrap().push(fraction);
        }
    }
}
