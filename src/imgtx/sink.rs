//! Progress reporting for an in-flight image transfer. Replaces
//! `imageviewer.imageviewer`'s pygame GUI with a plain callback surface: a
//! host binary can render progress however it likes (terminal bar, GUI
//! window, nothing at all) without the engine depending on any particular
//! display stack.

use image::DynamicImage;

/// Notified as an image transfer progresses. Mirrors the subset of
/// `imageviewer`'s public methods that carry transfer state rather than
/// window-management concerns (`updateImage`, `updateBar`, the timer).
pub trait ProgressSink: Send + Sync {
    /// A newer (partial or complete) decode of the image became available.
    fn update_image(&self, _image: &DynamicImage) {}

    /// `received`/`total` packets have been accounted for so far.
    fn update_progress(&self, _received: usize, _total: usize) {}

    /// The transfer finished, successfully or not.
    fn finished(&self, _success: bool) {}
}

/// A [ProgressSink] that discards every notification, for headless use.
#[derive(Default)]
pub struct NullSink;

impl ProgressSink for NullSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_all_calls_without_panicking() {
        let sink = NullSink;
        sink.update_progress(1, 10);
        sink.finished(true);
    }
}
