//! pkt-line framing: the length-prefixed record codec underlying every git smart
//! protocol message.
//!
//! Generalizes the ad-hoc `recv_packet`/`write_packet` pair that used to live directly
//! on `AsyncRead`/`AsyncWrite` into a proper codec with the flush/delim sentinels, an
//! optional byte limit, and the typed errors the rest of the crate needs to match on.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// smallest legal data record: 4-byte header + at least 1 payload byte
const MIN_DATA_LEN: usize = 5;
/// largest legal record, matching git's `LARGE_PACKET_MAX`
const MAX_DATA_LEN: usize = 65_524;

const FLUSH_HEADER: &[u8; 4] = b"0000";
const DELIM_HEADER: &[u8; 4] = b"0001";

/// A single decoded pkt-line record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// a data record; trailing `\n`, if present, has been stripped
    Data(Vec<u8>),
    /// `0000` — a logical boundary or end-of-stream marker
    Flush,
    /// `0001` — separates argument sections within a v2 command
    Delim,
}

impl Packet {
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data(bytes.into())
    }

    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    pub fn is_delim(&self) -> bool {
        matches!(self, Self::Delim)
    }

    /// the payload as a UTF-8 string, for records known to be text
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Data(bytes) => std::str::from_utf8(bytes)
                .map_err(|_| Error::InvalidAdvertisement("packet payload is not valid utf-8".into())),
            Self::Flush => Err(Error::InvalidAdvertisement("expected data, got flush".into())),
            Self::Delim => Err(Error::InvalidAdvertisement("expected data, got delim".into())),
        }
    }
}

fn parse_hex_len(header: &[u8; 4]) -> Result<usize> {
    let s = std::str::from_utf8(header).map_err(|_| Error::InvalidPacketHeader)?;
    usize::from_str_radix(s, 16).map_err(|_| Error::InvalidPacketHeader)
}

fn format_hex_len(len: usize) -> [u8; 4] {
    let s = format!("{:04x}", len);
    let bytes = s.as_bytes();
    debug_assert_eq!(bytes.len(), 4);
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

/// Decodes pkt-line records from an `AsyncRead` byte stream.
///
/// Not safe for concurrent reads: exactly one task drives a given decoder. A byte
/// limit, once exceeded, permanently disables further reads (`InputOverLimit`).
pub struct Decoder<R> {
    inner: R,
    limit: Option<usize>,
    disabled: bool,
}

impl<R: AsyncRead + Unpin + Send> Decoder<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, limit: None, disabled: false }
    }

    pub fn with_limit(inner: R, limit: usize) -> Self {
        Self { inner, limit: Some(limit), disabled: false }
    }

    /// Read exactly one packet, preserving a trailing `\n` in the payload if present.
    pub async fn read_raw(&mut self) -> Result<Packet> {
        self.read_impl(true).await
    }

    /// Read exactly one packet, stripping a trailing `\n` from the payload if present.
    pub async fn read(&mut self) -> Result<Packet> {
        self.read_impl(false).await
    }

    async fn read_impl(&mut self, raw: bool) -> Result<Packet> {
        if self.disabled {
            return Err(Error::InputOverLimit);
        }

        let mut header = [0u8; 4];
        self.inner.read_exact(&mut header).await?;

        if &header == FLUSH_HEADER {
            return Ok(Packet::Flush);
        }
        if &header == DELIM_HEADER {
            return Ok(Packet::Delim);
        }

        let len = parse_hex_len(&header)?;
        if len < MIN_DATA_LEN && len > 1 {
            // lengths 2 and 3 are invalid; 0 and 1 were handled above
            return Err(Error::InvalidPacketHeader);
        }
        if len > MAX_DATA_LEN {
            return Err(Error::InvalidPacketHeader);
        }

        let payload_len = len - 4;
        if let Some(limit) = self.limit {
            if len > limit {
                self.disabled = true;
                return Err(Error::InputOverLimit);
            }
        }

        let mut payload = vec![0u8; payload_len];
        self.inner.read_exact(&mut payload).await?;

        if !raw && payload.last() == Some(&b'\n') {
            payload.pop();
        }

        Ok(Packet::Data(payload))
    }
}

/// Encodes pkt-line records to an `AsyncWrite` byte stream.
pub struct Encoder<W> {
    inner: W,
    /// set once a flush has been written and cleared on the next data write; used only
    /// to make `close` idempotent about whether a trailing flush is still owed
    flushed: bool,
}

impl<W: AsyncWrite + Unpin + Send> Encoder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, flushed: true }
    }

    pub async fn write_data(&mut self, payload: &[u8]) -> Result<()> {
        assert!(payload.len() + 4 <= MAX_DATA_LEN, "pkt-line payload too large");
        let header = format_hex_len(payload.len() + 4);
        self.inner.write_all(&header).await?;
        self.inner.write_all(payload).await?;
        self.flushed = false;
        Ok(())
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut payload = line.as_bytes().to_vec();
        payload.push(b'\n');
        self.write_data(&payload).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner.write_all(FLUSH_HEADER).await?;
        self.inner.flush().await?;
        self.flushed = true;
        Ok(())
    }

    pub async fn delim(&mut self) -> Result<()> {
        self.inner.write_all(DELIM_HEADER).await?;
        self.flushed = false;
        Ok(())
    }

    /// whether the last thing written was a flush (so a caller can decide whether it
    /// still owes one before closing, per `ConnectionLifecycle`'s contract)
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}
