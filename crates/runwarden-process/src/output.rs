//! Output pipes: line decoding with a per-read deadline, stderr tail capture

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use encoding_rs::Encoding;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::DEFAULT_MAX_LINE_BYTES;
use crate::error::{ProcessError, Result};

/// Chunk size for draining stderr
const STDERR_CHUNK_SIZE: usize = 4096;

/// The pipe a run's lines are read from
pub enum OutputSource {
    /// Plain stdout; stderr is captured separately or discarded
    Stdout(ChildStdout),
    /// One pipe shared by stdout and stderr
    #[cfg(unix)]
    Merged(tokio::net::unix::pipe::Receiver),
}

impl OutputSource {
    /// Point both stdout and stderr of `cmd` at a single fresh pipe.
    ///
    /// The parent's write ends live inside `cmd`; it must be dropped after
    /// spawning or the reader never sees EOF.
    #[cfg(unix)]
    pub(crate) fn merge_into(cmd: &mut Command) -> Result<Self> {
        use std::os::fd::OwnedFd;

        let (reader, writer) = io::pipe()?;
        cmd.stderr(writer.try_clone()?);
        cmd.stdout(writer);
        let receiver = tokio::net::unix::pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
        Ok(OutputSource::Merged(receiver))
    }

    #[cfg(not(unix))]
    pub(crate) fn merge_into(_cmd: &mut Command) -> Result<Self> {
        Err(ProcessError::InvalidConfig(
            "merging stderr into stdout is only supported on unix".to_string(),
        ))
    }
}

impl AsyncRead for OutputSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutputSource::Stdout(stdout) => Pin::new(stdout).poll_read(cx, buf),
            #[cfg(unix)]
            OutputSource::Merged(receiver) => Pin::new(receiver).poll_read(cx, buf),
        }
    }
}

/// Splits a byte stream into decoded lines.
///
/// Every call to [`LineReader::next_line`] waits at most `read_timeout` for a
/// complete line. Malformed byte sequences decode to U+FFFD. A line longer
/// than `max_line_bytes` is handed out in pieces of at most that size.
pub struct LineReader<R> {
    inner: BufReader<R>,
    encoding: &'static Encoding,
    read_timeout: Duration,
    max_line_bytes: usize,
    buf: Vec<u8>,
    // The last line was cut at the cap; a bare terminator next belongs to it.
    split: bool,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, encoding: &'static Encoding, read_timeout: Duration) -> Self {
        Self {
            inner: BufReader::new(reader),
            encoding,
            read_timeout,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            buf: Vec::new(),
            split: false,
            eof: false,
        }
    }

    /// Cap the bytes buffered for one line
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes.max(1);
        self
    }

    /// Next line without its terminator, `None` at end of stream
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.eof {
            return Ok(None);
        }

        loop {
            // Bytes of a line interrupted by a dropped call stay in `buf`.
            let limit = self.max_line_bytes.saturating_sub(self.buf.len()) as u64;
            let read = tokio::time::timeout(
                self.read_timeout,
                (&mut self.inner).take(limit).read_until(b'\n', &mut self.buf),
            )
            .await;

            match read {
                Err(_) => {
                    debug!(timeout_ms = %self.read_timeout.as_millis(), "Stream read timeout");
                    return Err(ProcessError::ReadTimeout {
                        timeout: self.read_timeout,
                    });
                }
                Ok(Err(e)) => return Err(ProcessError::ReadFailed(e.to_string())),
                Ok(Ok(0)) if self.buf.is_empty() => {
                    self.eof = true;
                    return Ok(None);
                }
                Ok(Ok(_)) => {}
            }

            let terminated = self.buf.last() == Some(&b'\n');
            if !terminated && self.buf.len() >= self.max_line_bytes {
                debug!(max_line_bytes = self.max_line_bytes, "Splitting overlong line");
                let line = decode_line(self.encoding, &self.buf);
                self.buf.clear();
                self.split = true;
                return Ok(Some(line));
            }

            if std::mem::take(&mut self.split) && matches!(self.buf.as_slice(), b"\n" | b"\r\n") {
                self.buf.clear();
                continue;
            }

            let line = decode_line(self.encoding, &self.buf);
            self.buf.clear();
            return Ok(Some(line));
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Decode one raw line, dropping any trailing `\r` and `\n` bytes
pub fn decode_line(encoding: &'static Encoding, raw: &[u8]) -> String {
    let end = raw
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map_or(0, |last| last + 1);
    let (text, _) = encoding.decode_without_bom_handling(&raw[..end]);
    text.into_owned()
}

/// Background drain of a separate stderr pipe.
///
/// Keeps only the last `capacity` bytes so a noisy child can neither block on
/// a full pipe nor grow memory without bound.
pub struct StderrTail {
    tail: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
    encoding: &'static Encoding,
}

impl StderrTail {
    pub fn spawn<R>(reader: R, capacity: usize, encoding: &'static Encoding) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&tail);
        let task = tokio::spawn(async move {
            let mut reader = reader;
            let mut chunk = [0u8; STDERR_CHUNK_SIZE];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut tail = sink.lock();
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > capacity {
                            let excess = tail.len() - capacity;
                            tail.drain(..excess);
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Stopped reading stderr");
                        break;
                    }
                }
            }
        });

        Self {
            tail,
            task,
            encoding,
        }
    }

    /// Wait up to `grace` for stderr to close, then decode what was captured
    pub async fn excerpt(mut self, grace: Duration) -> Option<String> {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            debug!(grace_ms = %grace.as_millis(), "Stderr still open, using partial capture");
        }
        let tail = self.tail.lock();
        let (text, _) = self.encoding.decode_without_bom_handling(&tail);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

impl Drop for StderrTail {
    fn drop(&mut self) {
        self.task.abort();
    }
}
