// src/control/capture.rs

//! Non-blocking capture of a child's output streams.
//!
//! Each stream gets its own reader task. The task owns the stream, reads it
//! line by line until EOF and hands every line to a single consumer over an
//! unbounded channel. The supervising loop never touches the lines while the
//! reader runs; it joins the reader (bounded) and then drains the channel.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default bound on how long to wait for a reader to flush after the
/// process is gone.
pub const DEFAULT_READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running stream reader.
#[derive(Debug)]
pub struct StreamCapture {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Start draining `stream` in the background.
///
/// A missing stream produces an empty capture.
pub fn spawn_reader<R>(name: &'static str, stream: Option<R>) -> StreamCapture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = stream.map(|stream| {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(stream = name, error = %e, "stream read failed; stopping reader");
                        break;
                    }
                }
            }
        })
    });

    StreamCapture { name, handle, rx }
}

impl StreamCapture {
    /// Join the reader (bounded by `join_timeout`) and return all captured
    /// text in arrival order.
    ///
    /// If the reader does not finish in time it is aborted and whatever it
    /// already delivered is returned.
    pub async fn finish(mut self, join_timeout: Duration) -> String {
        if let Some(mut handle) = self.handle.take() {
            match tokio::time::timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(stream = self.name, error = %e, "reader task failed"),
                Err(_) => {
                    warn!(
                        stream = self.name,
                        timeout_ms = join_timeout.as_millis() as u64,
                        "reader did not reach EOF in time; keeping partial output"
                    );
                    handle.abort();
                }
            }
        }

        let mut out = String::new();
        while let Ok(line) = self.rx.try_recv() {
            out.push_str(&line);
        }
        out
    }
}

/// Finish a stdout/stderr pair concurrently.
pub async fn finish_pair(
    stdout: StreamCapture,
    stderr: StreamCapture,
    join_timeout: Duration,
) -> (String, String) {
    tokio::join!(stdout.finish(join_timeout), stderr.finish(join_timeout))
}
