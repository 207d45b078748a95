/// Receives download progress while a body is hashed.
pub trait DownloadObserver {
    /// Called once the response is accepted, before the first byte is read.
    /// `declared` is the server's `Content-Length`, if any.
    fn on_start(&self, declared: Option<u64>);

    fn on_bytes(&self, n: u64);
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadObserver for NoProgress {
    fn on_start(&self, _declared: Option<u64>) {}

    fn on_bytes(&self, _n: u64) {}
}
