//! Reads the peer's initial response and auto-detects the protocol version: v0 (refs
//! embedded directly, with capabilities hidden behind a NUL on the first line), the
//! `version 1` banner (folded into v0 — see the open question recorded in DESIGN.md),
//! or `version 2` (capabilities only; refs come later via `ls_refs`).

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::capability::CapabilitySet;
use crate::connection::{Connection, ProtocolVersion};
use crate::error::{Error, Result};
use crate::oid::ObjectId;
use crate::pktline::Packet;
use crate::refs::{resolve_symrefs, AdvertisedRefs, Ref};

/// Everything learned from the first phase of the connection.
#[derive(Debug)]
pub struct Advertisement {
    pub version: ProtocolVersion,
    pub capabilities: CapabilitySet,
    /// populated for v0; empty for v2, where refs are obtained via `ls_refs::request`
    pub refs: AdvertisedRefs,
}

fn check_err(payload: &str) -> Result<()> {
    if let Some(msg) = payload.strip_prefix("ERR ") {
        return Err(Error::RemoteRepository(msg.to_owned()));
    }
    Ok(())
}

async fn read_first<R, W>(conn: &mut Connection<R, W>) -> Result<Packet>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    match conn.read().await {
        Ok(packet) => Ok(packet),
        Err(Error::TransportFailure(io_err))
            if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
        {
            Err(Error::NoRemoteRepository)
        }
        Err(e) => Err(e),
    }
}

/// Parse one v0 ref line, `<40-hex> SP <name>`, applying the peel/`.have`/placeholder
/// rules. `is_first` gates the `capabilities^{}` placeholder check.
fn parse_ref_line(line: &str, refs: &mut AdvertisedRefs, is_first: bool) -> Result<()> {
    let (id_hex, name) = line.split_once(' ').ok_or_else(|| {
        Error::InvalidAdvertisement(format!("malformed ref line `{line}`"))
    })?;

    if is_first && name == "capabilities^{}" {
        return Ok(());
    }

    let id = ObjectId::parse_hex(id_hex)?;

    if name == ".have" {
        refs.add_have(id);
        return Ok(());
    }

    if let Some(peeled_of) = name.strip_suffix("^{}") {
        let existing = refs.get(peeled_of).cloned().ok_or_else(|| {
            Error::InvalidAdvertisement(format!(
                "peel `{name}` has no preceding ref `{peeled_of}`"
            ))
        })?;
        let target = match existing {
            Ref::Direct { target, .. } => target,
            Ref::PeeledTag { .. } => {
                return Err(Error::InvalidAdvertisement(format!("duplicate peel for `{peeled_of}`")))
            }
            Ref::Symbolic { .. } => {
                return Err(Error::InvalidAdvertisement(format!(
                    "cannot peel symbolic ref `{peeled_of}`"
                )))
            }
        };
        refs.insert(Ref::PeeledTag { name: peeled_of.to_owned(), target, peeled: id });
        return Ok(());
    }

    if refs.contains(name) {
        return Err(Error::InvalidAdvertisement(format!("duplicate ref `{name}`")));
    }
    refs.insert(Ref::Direct { name: name.to_owned(), target: id });
    Ok(())
}

async fn read_v0<R, W>(conn: &mut Connection<R, W>, first: Packet) -> Result<Advertisement>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut refs = AdvertisedRefs::new();
    let mut capabilities = CapabilitySet::new();

    let first_line = first.as_str()?;
    check_err(first_line)?;

    let (ref_line, caps_str) = match first_line.split_once('\0') {
        Some((ref_line, caps_str)) => (ref_line, Some(caps_str)),
        None => (first_line, None),
    };

    if !ref_line.is_empty() {
        parse_ref_line(ref_line, &mut refs, true)?;
    }
    if let Some(caps_str) = caps_str {
        capabilities.add_all(caps_str);
    }

    loop {
        let packet = conn.read().await?;
        if packet.is_flush() {
            break;
        }
        let line = packet.as_str()?;
        check_err(line)?;
        parse_ref_line(line, &mut refs, false)?;
    }

    let pending_symrefs: Vec<(String, String)> =
        capabilities.symrefs().map(|(s, t)| (s.to_owned(), t.to_owned())).collect();
    resolve_symrefs(&mut refs, pending_symrefs);

    debug!("v0 advertisement: {} ref(s), {} additional have(s)", refs.len(), refs.additional_haves().len());
    Ok(Advertisement { version: ProtocolVersion::V0, capabilities, refs })
}

async fn read_v2<R, W>(conn: &mut Connection<R, W>) -> Result<Advertisement>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut capabilities = CapabilitySet::new();
    loop {
        let packet = conn.read().await?;
        if packet.is_flush() {
            break;
        }
        let line = packet.as_str()?;
        check_err(line)?;
        capabilities.add(line);
    }
    debug!("v2 advertisement: capabilities only, refs pending ls-refs");
    Ok(Advertisement { version: ProtocolVersion::V2, capabilities, refs: AdvertisedRefs::new() })
}

/// Read the advertisement phase, auto-detecting v0/v1/v2. For v2 the returned
/// `refs` is empty; the caller must follow up with `ls_refs::request`.
pub async fn read<R, W>(conn: &mut Connection<R, W>) -> Result<Advertisement>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let first = read_first(conn).await?;
    if first.is_flush() {
        // an empty-but-valid response: no refs, no capabilities
        conn.set_protocol_version(ProtocolVersion::V0);
        return Ok(Advertisement {
            version: ProtocolVersion::V0,
            capabilities: CapabilitySet::new(),
            refs: AdvertisedRefs::new(),
        });
    }

    let first_line = first.as_str()?;
    if first_line == "version 1" {
        // v1 banner: re-read the real first record and parse it as v0. A v2 header
        // appearing here is deliberately not special-cased (see DESIGN.md).
        debug!("detected protocol v1 banner, treating as v0");
        let next = read_first(conn).await?;
        conn.set_protocol_version(ProtocolVersion::V0);
        let advert = read_v0(conn, next).await?;
        return Ok(advert);
    }
    if first_line == "version 2" {
        debug!("detected protocol v2");
        conn.set_protocol_version(ProtocolVersion::V2);
        return read_v2(conn).await;
    }

    debug!("detected protocol v0");
    conn.set_protocol_version(ProtocolVersion::V0);
    read_v0(conn, first).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn oid(n: u8) -> String {
        format!("{:02x}", n).repeat(20)
    }

    async fn read_bytes(bytes: Vec<u8>) -> Result<Advertisement> {
        let mut out = Vec::new();
        let mut conn = Connection::new(Cursor::new(bytes), &mut out, None);
        read(&mut conn).await
    }

    fn pkt(payload: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = payload.len() + 4;
        buf.extend(format!("{:04x}", len).into_bytes());
        buf.extend(payload.as_bytes());
        buf
    }

    #[tokio::test]
    async fn minimal_v0_advertisement() {
        let zero = "0".repeat(40);
        let mut wire = pkt(&format!(
            "{zero} capabilities^{{}}\0multi_ack thin-pack ofs-delta agent=git/2.0\n"
        ));
        wire.extend(b"0000");
        let advert = read_bytes(wire).await.unwrap();
        assert_eq!(advert.version, ProtocolVersion::V0);
        assert!(advert.refs.is_empty());
        assert!(advert.refs.additional_haves().is_empty());
        assert_eq!(advert.capabilities.value("agent"), Some("git/2.0"));
    }

    #[tokio::test]
    async fn v0_with_symref() {
        let id1 = oid(1);
        let mut wire = pkt(&format!("{id1} refs/heads/main\0symref=HEAD:refs/heads/main\n"));
        wire.extend(pkt(&format!("{id1} HEAD\n")));
        wire.extend(b"0000");
        let advert = read_bytes(wire).await.unwrap();
        assert!(matches!(advert.refs.get("refs/heads/main"), Some(Ref::Direct { .. })));
        match advert.refs.get("HEAD") {
            Some(Ref::Symbolic { target, .. }) => assert_eq!(target.name(), "refs/heads/main"),
            other => panic!("expected symbolic HEAD, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn v0_peeled_tag() {
        let id_tag = oid(1);
        let id_target = oid(2);
        let mut wire = pkt(&format!("{id_tag} refs/tags/v1\0\n"));
        wire.extend(pkt(&format!("{id_target} refs/tags/v1^{{}}\n")));
        wire.extend(b"0000");
        let advert = read_bytes(wire).await.unwrap();
        match advert.refs.get("refs/tags/v1") {
            Some(Ref::PeeledTag { target, peeled, .. }) => {
                assert_eq!(*target, ObjectId::parse_hex(&id_tag).unwrap());
                assert_eq!(*peeled, ObjectId::parse_hex(&id_target).unwrap());
            }
            other => panic!("expected peeled tag, got {other:?}"),
        }
        assert_eq!(advert.refs.len(), 1);
    }

    #[tokio::test]
    async fn err_record_surfaces_as_remote_repository() {
        let wire = pkt("ERR access denied or repository not exported");
        let err = read_bytes(wire).await.unwrap_err();
        assert!(matches!(err, Error::RemoteRepository(msg) if msg.contains("access denied")));
    }

    #[tokio::test]
    async fn empty_stream_is_no_remote_repository() {
        let err = read_bytes(Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoRemoteRepository));
    }

    #[tokio::test]
    async fn head_fixup_without_target_ref_line() {
        let id1 = oid(1);
        let mut wire = pkt(&format!("{id1} HEAD\0symref=HEAD:refs/heads/main\n"));
        wire.extend(b"0000");
        let advert = read_bytes(wire).await.unwrap();
        match advert.refs.get("HEAD") {
            Some(Ref::Symbolic { target, .. }) => assert_eq!(target.name(), "refs/heads/main"),
            other => panic!("expected synthesized symbolic HEAD, got {other:?}"),
        }
        assert!(advert.refs.get("refs/heads/main").is_some());
    }
}
