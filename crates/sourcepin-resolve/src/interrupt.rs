//! Blocking network I/O that gives way to run cancellation.
//!
//! ureq blocks until its own timeout, so requests and body reads run on a
//! helper thread while the worker waits on it and polls the cancel token.
//! A helper left behind by a cancelled worker finishes on its own when the
//! request timeout hits or its result can no longer be delivered.

use crate::context::ResolveContext;
use crate::FatalError;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// How often a waiting worker checks for cancellation.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Chunks buffered ahead of the hasher.
const READ_AHEAD: usize = 4;

/// Run `f` on a helper thread and wait for its result, giving up with
/// [`FatalError::Cancelled`] once `ctx` is cancelled. A panic in `f` is
/// resumed on the calling thread.
pub(crate) fn interruptible<T, F>(ctx: &ResolveContext, f: F) -> Result<T, FatalError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let handle = std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(value) => return Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                if ctx.is_cancelled() {
                    return Err(FatalError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
                unreachable!("helper thread exited without sending a result");
            }
        }
    }
}

/// One step of a [`ChunkStream`].
#[derive(Debug)]
pub(crate) enum Next {
    Chunk(Vec<u8>),
    End,
    Failed(std::io::Error),
    Cancelled,
}

/// A reader drained on a helper thread, chunk by chunk.
pub(crate) struct ChunkStream {
    rx: Receiver<std::io::Result<Option<Vec<u8>>>>,
}

impl ChunkStream {
    pub(crate) fn spawn<R>(mut reader: R, chunk_size: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(READ_AHEAD);
        std::thread::spawn(move || {
            let mut buf = vec![0u8; chunk_size];
            loop {
                let item = match reader.read(&mut buf) {
                    Ok(0) => Ok(None),
                    Ok(n) => Ok(Some(buf[..n].to_vec())),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let last = !matches!(item, Ok(Some(_)));
                // A closed channel means the consumer gave up.
                if tx.send(item).is_err() || last {
                    return;
                }
            }
        });
        Self { rx }
    }

    pub(crate) fn next(&self, ctx: &ResolveContext) -> Next {
        loop {
            if ctx.is_cancelled() {
                return Next::Cancelled;
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(Some(chunk))) => return Next::Chunk(chunk),
                Ok(Ok(None)) => return Next::End,
                Ok(Err(e)) => return Next::Failed(e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Next::Failed(std::io::Error::other("body reader stopped"))
                }
            }
        }
    }
}
