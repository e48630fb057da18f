//! Concrete byte-stream transports. `bit-protocol` only ever asks for an
//! `AsyncRead`/`AsyncWrite` pair (its `ByteStream` boundary, §6 of the spec this
//! engine implements) — everything below is a host-level detail the engine never
//! sees.

use std::pin::Pin;

use anyhow::{bail, Context, Result};
use git_url_parse::{GitUrl, Scheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

pub type BoxRead = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxWrite = Pin<Box<dyn AsyncWrite + Send>>;

/// Opens the byte stream for `url` and, for the git `command=` request that every
/// transport needs before the pkt-line advertisement begins, writes it. The caller
/// drives everything from the advertisement phase onward through `bit-protocol`.
///
/// Returns the read/write halves plus, for subprocess-backed transports, the `Child`
/// the caller must keep alive for the lifetime of the connection.
pub async fn open(url: &str) -> Result<(BoxRead, BoxWrite, Option<Child>)> {
    let parsed = GitUrl::parse(url).with_context(|| format!("invalid remote url `{url}`"))?;
    match parsed.scheme {
        Scheme::Git => open_git(&parsed).await,
        Scheme::File => open_file(&parsed).await,
        Scheme::Ssh => bail!("ssh transport is an external collaborator, not implemented by this demo CLI"),
        Scheme::Https => {
            bail!("http(s) transport is an external collaborator, not implemented by this demo CLI")
        }
        other => bail!("unsupported url scheme `{other}`"),
    }
}

/// The `git://` transport: a bare TCP connection, request-line framed as a single
/// pkt-line with no trailing flush (`git-upload-pack <path>\0host=<host>\0`).
async fn open_git(url: &GitUrl) -> Result<(BoxRead, BoxWrite, Option<Child>)> {
    let host = url.host.as_deref().context("git:// url has no host")?;
    let port = url.port.unwrap_or(9418);
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("failed to connect to {host}:{port}"))?;
    let (read, write) = stream.into_split();

    let mut write: BoxWrite = Box::pin(write);
    let request = format!("git-upload-pack {}\0host={}\0\0version=2\0", url.path, host);
    write_request_line(&mut write, &request).await?;

    Ok((Box::pin(read), write, None))
}

/// The local `file://`/bare-path transport: spawn `git-upload-pack <path>` and treat
/// its stdout/stdin as the byte stream, same framing the teacher's own `FileTransport`
/// used a duplex-stream-backed thread for — here the OS pipe plays that role instead.
async fn open_file(url: &GitUrl) -> Result<(BoxRead, BoxWrite, Option<Child>)> {
    let path = &url.path;
    let mut child = Command::new("git-upload-pack")
        .arg(path)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn git-upload-pack for `{path}`"))?;

    let stdin = child.stdin.take().context("child has no stdin")?;
    let stdout = child.stdout.take().context("child has no stdout")?;
    Ok((Box::pin(stdout), Box::pin(stdin), Some(child)))
}

async fn write_request_line(write: &mut BoxWrite, line: &str) -> Result<()> {
    let mut enc = bit_protocol::pktline::Encoder::new(write);
    enc.write_data(line.as_bytes()).await?;
    Ok(())
}
