//! Pipe transport for host-helper IPC.
//!
//! Two channels:
//! - **Request/response pipes**: private pipe pair whose helper-facing ends are
//!   passed to the helper by descriptor number. Carries the protocol.
//! - **Helper stdio**: the helper's own stdout/stderr. Never part of the
//!   protocol; captured by background tasks purely for diagnostics.

use std::io;
use std::os::fd::OwnedFd;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::unix::pipe;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::HelperCodec;
use super::protocol::Request;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Stdout,
    Stderr,
}

/// Unsolicited output read from one of the helper's standard streams.
#[derive(Debug, Clone)]
pub struct StrayChunk {
    pub source: LogSource,
    pub data: String,
}

/// Host side of the helper connection.
pub struct HelperTransport {
    writer: FramedWrite<pipe::Sender, HelperCodec>,
    reader: FramedRead<pipe::Receiver, HelperCodec>,
    stray_rx: mpsc::UnboundedReceiver<StrayChunk>,
    capture_tasks: Vec<JoinHandle<()>>,
}

impl HelperTransport {
    /// Wrap the host ends of the pipe pair and start capturing helper stdio.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        request_write: OwnedFd,
        response_read: OwnedFd,
        stdout: ChildStdout,
        stderr: ChildStderr,
        max_line_length: usize,
    ) -> io::Result<Self> {
        let sender = pipe::Sender::from_owned_fd(request_write)?;
        let receiver = pipe::Receiver::from_owned_fd(response_read)?;

        let (stray_tx, stray_rx) = mpsc::unbounded_channel();
        let capture_tasks = vec![
            tokio::spawn(capture(stdout, LogSource::Stdout, stray_tx.clone())),
            tokio::spawn(capture(stderr, LogSource::Stderr, stray_tx)),
        ];

        Ok(Self {
            writer: FramedWrite::new(sender, HelperCodec::new(max_line_length)),
            reader: FramedRead::new(receiver, HelperCodec::new(max_line_length)),
            stray_rx,
            capture_tasks,
        })
    }

    /// Send one request line and flush it.
    ///
    /// Fails with `ProtocolMalformed` if the helper has sent response data
    /// nobody asked for, since any answer read afterwards would be misattributed.
    pub async fn write_line(&mut self, request: Request) -> Result<()> {
        self.check_unsolicited()?;
        self.writer.send(request).await.map_err(classify)
    }

    /// Read one complete response line, reassembling partial reads.
    ///
    /// A reply carrying more than one line is `ProtocolMalformed`.
    pub async fn read_line(&mut self) -> Result<String> {
        let line = match self.reader.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(classify(e)),
            None => return Err(BridgeError::end_of_stream()),
        };
        if !self.reader.read_buffer().is_empty() {
            let extra = String::from_utf8_lossy(self.reader.read_buffer()).into_owned();
            return Err(BridgeError::malformed(extra, "extra data after response line"));
        }
        Ok(line)
    }

    /// Poll the response pipe once without waiting for anything left over from
    /// an earlier exchange.
    fn check_unsolicited(&mut self) -> Result<()> {
        match self.reader.next().now_or_never() {
            None => {}
            Some(Some(Ok(line))) => {
                return Err(BridgeError::malformed(line, "unsolicited response line"));
            }
            Some(Some(Err(e))) => return Err(classify(e)),
            Some(None) => return Err(BridgeError::end_of_stream()),
        }
        // A partial line left by the poll above.
        if !self.reader.read_buffer().is_empty() {
            let extra = String::from_utf8_lossy(self.reader.read_buffer()).into_owned();
            return Err(BridgeError::malformed(extra, "unsolicited response data"));
        }
        Ok(())
    }

    /// Collect whatever the helper has written to its own stdout/stderr so far.
    ///
    /// Never waits. A closed capture channel just ends the drain.
    pub fn drain_stray(&mut self) -> String {
        let mut output = String::new();
        while let Ok(chunk) = self.stray_rx.try_recv() {
            tracing::trace!(source = ?chunk.source, bytes = chunk.data.len(), "Drained stray output");
            output.push_str(&chunk.data);
        }
        trim_output(output)
    }

    /// Like [`drain_stray`](Self::drain_stray), but waits up to `grace` for
    /// output still in flight, stopping early once both streams hit EOF.
    ///
    /// Used after a failure, when a dying helper's last words are the most
    /// useful diagnostics.
    pub async fn drain_stray_settled(&mut self, grace: Duration) -> String {
        let mut output = String::new();
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match tokio::time::timeout_at(deadline, self.stray_rx.recv()).await {
                Ok(Some(chunk)) => output.push_str(&chunk.data),
                Ok(None) | Err(_) => break,
            }
        }
        trim_output(output)
    }

    /// Stop stdio capture. Pipe ends close when the transport is dropped.
    pub fn close(&mut self) {
        for task in self.capture_tasks.drain(..) {
            task.abort();
        }
        self.stray_rx.close();
    }
}

impl Drop for HelperTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn trim_output(mut output: String) -> String {
    let len = output.trim_end().len();
    output.truncate(len);
    output
}

/// Map codec I/O errors onto the bridge taxonomy.
///
/// `InvalidData` comes from framing (overlong line, bad UTF-8); everything else
/// means the pipe itself is unusable.
fn classify(err: io::Error) -> BridgeError {
    if err.kind() == io::ErrorKind::InvalidData {
        BridgeError::malformed(String::new(), err.to_string())
    } else {
        BridgeError::TransportBroken(err)
    }
}

async fn capture<R>(mut stream: R, source: LogSource, tx: mpsc::UnboundedSender<StrayChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(StrayChunk { source, data }).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_splits_framing_from_pipe_errors() {
        let framing = classify(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
        assert!(matches!(framing, BridgeError::ProtocolMalformed { .. }));

        let broken = classify(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(broken, BridgeError::TransportBroken(_)));
    }

    #[test]
    fn trim_output_strips_trailing_whitespace_only() {
        assert_eq!(trim_output("  warning: foo\n\n".to_string()), "  warning: foo");
        assert_eq!(trim_output(String::new()), "");
    }

    #[tokio::test]
    async fn capture_forwards_until_eof() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"deprecation warning\n";

        capture(input, LogSource::Stderr, tx).await;

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.source, LogSource::Stderr);
        assert_eq!(chunk.data, "deprecation warning\n");
        assert!(rx.recv().await.is_none());
    }
}
