/**
 * Request Reader
 *
 * Reads raw bytes from an accepted connection until the first header line
 * is complete, then classifies the request target. Only GET requests with
 * an HTTP/1.x version token are accepted; anything else is dropped with
 * no response at all.
 */

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

const READ_CHUNK_SIZE: usize = 512;

/// What the first header line asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Browser favicon probe; closed silently.
    Favicon,
    /// Flash-style cross-domain policy document.
    CrossDomainPolicy,
    /// Empty path; canned help page.
    Help,
    /// Anything else: a still-escaped command string for the dispatcher.
    Command(String),
}

/// Accumulate bytes until the buffered text contains a line terminator.
/// Returns Ok(None) when the peer closes before a full line arrived.
pub async fn read_header_line(stream: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            return Ok(Some(String::from_utf8_lossy(&buf[..pos]).into_owned()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            debug!("socket closed before a full header line");
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Extract and classify the target of a GET request line.
/// None means the line is malformed and the connection should be closed
/// without a response.
pub fn parse_request_line(header: &str) -> Option<Target> {
    if !header.starts_with("GET ") {
        debug!("dropped non-GET request");
        return None;
    }
    let version = header.find("HTTP/1")?;
    // The target sits between "GET /" and the space before the version.
    let target = header.get(5..version.checked_sub(1)?)?;

    Some(match target {
        "favicon.ico" => Target::Favicon,
        "crossdomain.xml" => Target::CrossDomainPolicy,
        "" => Target::Help,
        other => Target::Command(other.to_string()),
    })
}
