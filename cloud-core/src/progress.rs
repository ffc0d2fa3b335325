/// Progress reporting for long-running operations.
///
/// Implementors receive percentage updates and may request cancellation;
/// the octree build polls `is_cancel_requested` between batches and aborts
/// as soon as it returns true.
pub trait ProgressCallback {
    fn update(&mut self, percent: f32);

    fn is_cancel_requested(&self) -> bool {
        false
    }
}

/// Callback that swallows every notification and never cancels.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn update(&mut self, _percent: f32) {}
}
