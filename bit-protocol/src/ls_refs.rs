//! Protocol v2's `ls-refs` command: the replacement for v0's embedded ref list, sent
//! and parsed explicitly once the advertisement phase has detected `version 2`.

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::capability::CapabilitySet;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::oid::ObjectId;
use crate::refs::{resolve_symrefs, AdvertisedRefs, Ref};
use crate::refspec::RefSpecSet;

/// Compute the `ref-prefix` arguments for an `ls-refs` request from the caller's
/// refspecs (§4.4), plus any caller-supplied extras (e.g. `HEAD` when cloning).
/// Order follows refspec order; duplicates are dropped, first occurrence wins.
pub fn prefixes(specs: &RefSpecSet, extra: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |p: String| {
        if !out.contains(&p) {
            out.push(p);
        }
    };

    for spec in specs.positive() {
        if spec.src_is_object_id() {
            continue;
        }
        if spec.is_wildcard() {
            push(spec.src_prefix().to_owned());
        } else {
            let src = spec.src();
            push(src.to_owned());
            push(format!("refs/{src}"));
            push(format!("refs/heads/{src}"));
            push(format!("refs/tags/{src}"));
        }
    }
    for p in extra {
        push(p.clone());
    }
    out
}

/// Send the `ls-refs` command: `command=ls-refs`, an optional `agent=` line if the
/// peer itself advertised one, a delim, then `peel`/`symrefs`/`ref-prefix` argument
/// lines, then flush.
pub async fn request<R, W>(
    conn: &mut Connection<R, W>,
    peer_capabilities: &CapabilitySet,
    prefixes: &[String],
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    conn.write_line("command=ls-refs").await?;
    if let Some(agent) = peer_capabilities.value("agent") {
        conn.write_line(&format!("agent={agent}")).await?;
    }
    conn.delim().await?;
    conn.write_line("peel").await?;
    conn.write_line("symrefs").await?;
    for prefix in prefixes {
        conn.write_line(&format!("ref-prefix {prefix}")).await?;
    }
    conn.flush().await?;
    debug!("sent ls-refs with {} ref-prefix argument(s)", prefixes.len());
    Ok(())
}

fn check_err(payload: &str) -> Result<()> {
    if let Some(msg) = payload.strip_prefix("ERR ") {
        return Err(Error::RemoteRepository(msg.to_owned()));
    }
    Ok(())
}

/// Parse one response line: `<40-hex> SP <name>[ SP <attr>]*` where `<attr>` is
/// `peeled:<hex>` or `symref-target:<name>`. Returns the (possibly deferred) symref
/// pair alongside the inserted ref's name, if this line was symbolic.
fn parse_line(line: &str, refs: &mut AdvertisedRefs) -> Result<Option<(String, String)>> {
    let mut parts = line.split(' ');
    let id_hex = parts.next().ok_or_else(|| Error::InvalidAdvertisement("empty ls-refs line".to_owned()))?;
    let name = parts
        .next()
        .ok_or_else(|| Error::InvalidAdvertisement(format!("malformed ls-refs line `{line}`")))?;
    let id = ObjectId::parse_hex(id_hex)?;

    if name == ".have" {
        refs.add_have(id);
        return Ok(None);
    }

    let mut peeled: Option<ObjectId> = None;
    let mut symref_target: Option<String> = None;
    for attr in parts {
        if attr.is_empty() {
            continue;
        }
        if let Some(hex) = attr.strip_prefix("peeled:") {
            if peeled.is_some() {
                return Err(Error::InvalidAdvertisement(format!("duplicate `peeled` attribute on `{name}`")));
            }
            peeled = Some(ObjectId::parse_hex(hex)?);
        } else if let Some(target) = attr.strip_prefix("symref-target:") {
            if symref_target.is_some() {
                return Err(Error::InvalidAdvertisement(format!(
                    "duplicate `symref-target` attribute on `{name}`"
                )));
            }
            symref_target = Some(target.to_owned());
        } else {
            return Err(Error::InvalidAdvertisement(format!("unrecognized ls-refs attribute `{attr}`")));
        }
    }

    if refs.contains(name) {
        return Err(Error::InvalidAdvertisement(format!("duplicate ref `{name}`")));
    }

    let r = match peeled {
        Some(peeled) => Ref::PeeledTag { name: name.to_owned(), target: id, peeled },
        None => Ref::Direct { name: name.to_owned(), target: id },
    };
    refs.insert(r);

    Ok(symref_target.map(|target| (name.to_owned(), target)))
}

/// Read the `ls-refs` response into a fresh `AdvertisedRefs`, resolving `symref-target`
/// chains with the same algorithm as the v0 advertisement reader.
pub async fn read_response<R, W>(conn: &mut Connection<R, W>) -> Result<AdvertisedRefs>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut refs = AdvertisedRefs::new();
    let mut pending_symrefs = Vec::new();

    loop {
        let packet = conn.read().await?;
        if packet.is_flush() {
            break;
        }
        let line = packet.as_str()?;
        check_err(line)?;
        if let Some(pair) = parse_line(line, &mut refs)? {
            pending_symrefs.push(pair);
        }
    }

    resolve_symrefs(&mut refs, pending_symrefs);
    debug!("ls-refs response: {} ref(s), {} additional have(s)", refs.len(), refs.additional_haves().len());
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refspec::RefSpec;
    use std::io::Cursor;

    fn oid(n: u8) -> String {
        format!("{:02x}", n).repeat(20)
    }

    fn pkt(payload: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = payload.len() + 4;
        buf.extend(format!("{:04x}", len).into_bytes());
        buf.extend(payload.as_bytes());
        buf
    }

    #[test]
    fn prefixes_expand_non_wildcard_specs_under_three_namespaces() {
        let specs = RefSpecSet::new(vec!["main:refs/remotes/origin/main".parse::<RefSpec>().unwrap()]);
        let p = prefixes(&specs, &[]);
        assert_eq!(p, vec!["main", "refs/main", "refs/heads/main", "refs/tags/main"]);
    }

    #[test]
    fn prefixes_use_literal_prefix_for_wildcards() {
        let specs =
            RefSpecSet::new(vec!["refs/heads/*:refs/remotes/origin/*".parse::<RefSpec>().unwrap()]);
        assert_eq!(prefixes(&specs, &[]), vec!["refs/heads/"]);
    }

    #[test]
    fn prefixes_skip_object_id_sources_and_append_extras() {
        let id = oid(1);
        let specs = RefSpecSet::new(vec![RefSpec::new(id, None, false)]);
        assert_eq!(prefixes(&specs, &["HEAD".to_owned()]), vec!["HEAD"]);
    }

    #[tokio::test]
    async fn v2_round_trip_resolves_symref_and_peeled_tag() {
        let id = oid(1);
        let id_tag = oid(2);
        let id_obj = oid(3);
        let mut wire = pkt(&format!("{id} HEAD symref-target:refs/heads/trunk\n"));
        wire.extend(pkt(&format!("{id} refs/heads/trunk\n")));
        wire.extend(pkt(&format!("{id_tag} refs/tags/v2 peeled:{id_obj}\n")));
        wire.extend(b"0000");

        let mut out = Vec::new();
        let mut conn = Connection::new(Cursor::new(wire), &mut out, None);
        let refs = read_response(&mut conn).await.unwrap();

        assert_eq!(refs.len(), 3);
        match refs.get("HEAD") {
            Some(Ref::Symbolic { target, .. }) => assert_eq!(target.name(), "refs/heads/trunk"),
            other => panic!("expected symbolic HEAD, got {other:?}"),
        }
        match refs.get("refs/tags/v2") {
            Some(Ref::PeeledTag { target, peeled, .. }) => {
                assert_eq!(*target, ObjectId::parse_hex(&id_tag).unwrap());
                assert_eq!(*peeled, ObjectId::parse_hex(&id_obj).unwrap());
            }
            other => panic!("expected peeled tag, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_attribute_is_rejected() {
        let id = oid(1);
        let wire = pkt(&format!("{id} refs/tags/v1 peeled:{} peeled:{}\n", oid(2), oid(3)));
        let mut out = Vec::new();
        let mut conn = Connection::new(Cursor::new(wire), &mut out, None);
        assert!(matches!(read_response(&mut conn).await, Err(Error::InvalidAdvertisement(_))));
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let id = oid(1);
        let mut wire = pkt(&format!("{id} refs/heads/main\n"));
        wire.extend(pkt(&format!("{id} refs/heads/main\n")));
        let mut out = Vec::new();
        let mut conn = Connection::new(Cursor::new(wire), &mut out, None);
        assert!(matches!(read_response(&mut conn).await, Err(Error::InvalidAdvertisement(_))));
    }

    #[tokio::test]
    async fn request_writes_expected_pkt_lines() {
        let mut peer_caps = CapabilitySet::new();
        peer_caps.add("agent=git/2.30.0");
        let mut out = Vec::new();
        let mut conn = Connection::new(Cursor::new(Vec::<u8>::new()), &mut out, None);
        request(&mut conn, &peer_caps, &["refs/heads/".to_owned()]).await.unwrap();

        let mut dec = crate::pktline::Decoder::new(Cursor::new(out));
        let mut lines = Vec::new();
        loop {
            let packet = dec.read().await.unwrap();
            if packet.is_flush() {
                break;
            }
            if packet.is_delim() {
                lines.push("<delim>".to_owned());
                continue;
            }
            lines.push(packet.as_str().unwrap().to_owned());
        }
        assert_eq!(
            lines,
            vec![
                "command=ls-refs",
                "agent=git/2.30.0",
                "<delim>",
                "peel",
                "symrefs",
                "ref-prefix refs/heads/",
            ]
        );
    }
}
