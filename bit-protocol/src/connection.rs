//! Owns the input/output halves of a connection to a single peer and the optional
//! deadline applied to every read/write. Generalizes the old "timer thread" idiom:
//! since `tokio` I/O already supports a per-call timeout (`tokio::time::timeout`), no
//! separate watchdog thread is needed — the deadline is just another `.await` point.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::pktline::{Decoder, Encoder, Packet};

/// Protocol version detected during advertisement reading. `v1` (the `version 1`
/// banner) is folded into `V0`: it changes nothing about ref-line parsing, only adds
/// an extra leading record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V0,
    V2,
}

async fn with_deadline<T>(timeout: Option<Duration>, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match timeout {
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        },
        None => fut.await,
    }
}

/// One connection's worth of framed I/O. `R` and `W` are the narrow `ByteStream`
/// boundary (§6): any `AsyncRead`/`AsyncWrite` the caller supplies, typically a socket,
/// subprocess stdio pair, or an HTTP request/response body.
pub struct Connection<R, W> {
    decoder: Decoder<R>,
    encoder: Encoder<W>,
    timeout: Option<Duration>,
    version: Option<ProtocolVersion>,
    closed: bool,
}

impl<R: AsyncRead + Unpin + Send, W: AsyncWrite + Unpin + Send> Connection<R, W> {
    pub fn new(input: R, output: W, timeout: Option<Duration>) -> Self {
        Self {
            decoder: Decoder::new(input),
            encoder: Encoder::new(output),
            timeout,
            version: None,
            closed: false,
        }
    }

    pub fn with_limit(input: R, output: W, timeout: Option<Duration>, limit: usize) -> Self {
        Self {
            decoder: Decoder::with_limit(input, limit),
            encoder: Encoder::new(output),
            timeout,
            version: None,
            closed: false,
        }
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.version = Some(version);
    }

    pub async fn read(&mut self) -> Result<Packet> {
        with_deadline(self.timeout, self.decoder.read()).await
    }

    pub async fn read_raw(&mut self) -> Result<Packet> {
        with_deadline(self.timeout, self.decoder.read_raw()).await
    }

    pub async fn write_data(&mut self, payload: &[u8]) -> Result<()> {
        with_deadline(self.timeout, self.encoder.write_data(payload)).await
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        with_deadline(self.timeout, self.encoder.write_line(line)).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        with_deadline(self.timeout, self.encoder.flush()).await
    }

    pub async fn delim(&mut self) -> Result<()> {
        with_deadline(self.timeout, self.encoder.delim()).await
    }

    /// Close the connection: write a trailing flush if `needs_trailing_flush` is set
    /// and the phase hasn't already ended on one, then shut down the output side,
    /// swallowing any I/O error on the way out — close is best-effort. The input side
    /// has no explicit close in `AsyncRead`; it closes implicitly on drop. Idempotent.
    pub async fn close(&mut self, needs_trailing_flush: bool) {
        if self.closed {
            return;
        }
        self.closed = true;
        if needs_trailing_flush && !self.encoder.is_flushed() {
            let _ = self.flush().await;
        }
        let _ = self.encoder.get_mut().shutdown().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::DuplexStream;

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut buf = Vec::new();
        let mut conn = Connection::new(Cursor::new(Vec::<u8>::new()), &mut buf, None);
        conn.close(true).await;
        conn.close(true).await;
        assert_eq!(buf, b"0000");
    }

    #[tokio::test]
    async fn close_skips_flush_when_not_needed() {
        let mut buf = Vec::new();
        let mut conn = Connection::new(Cursor::new(Vec::<u8>::new()), &mut buf, None);
        conn.close(false).await;
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn read_times_out_on_a_stalled_peer() {
        let (client, _server) = tokio::io::duplex(64);
        let (read_half, write_half): (tokio::io::ReadHalf<DuplexStream>, _) = tokio::io::split(client);
        let mut conn = Connection::new(read_half, write_half, Some(Duration::from_millis(20)));
        let result = conn.read().await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
