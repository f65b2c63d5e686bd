/**
 * Connection Listener
 *
 * Accepts exactly one connection at a time: read the first header line,
 * dispatch, write the response, close, loop. The intended client issues
 * one request at a time and relies on strict ordering against device
 * state, so there is deliberately no per-connection concurrency.
 *
 * Every response is a 200; processing failures answer with the literal
 * body "unknown server error" and never terminate the accept loop.
 */

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::controllers::DeviceController;
use crate::http::dispatch::dispatch;
use crate::http::request::{parse_request_line, read_header_line, Target};

pub const UNKNOWN_SERVER_ERROR: &str = "unknown server error";

// Extension clients sniff this exact banner, so it stays verbatim.
pub const HELP_TEXT: &str = "HTTP Extension Example Server<br><br>";

/// Flash-style cross-domain policy, null-terminated, granting all domains
/// access to this service's port.
pub fn policy_file(port: u16) -> String {
    format!(
        "<cross-domain-policy>\n  <allow-access-from domain=\"*\" to-ports=\"{}\"/>\n</cross-domain-policy>\n\0",
        port
    )
}

/// Bind the listener and run the accept loop forever.
pub async fn run(port: u16, device: Arc<dyn DeviceController>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on port {}", port);
    serve(listener, device, port).await
}

/// Accept loop over an already-bound listener. The advertised port only
/// feeds the policy document.
pub async fn serve(
    listener: TcpListener,
    device: Arc<dyn DeviceController>,
    advertised_port: u16,
) -> std::io::Result<()> {
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        debug!("connection from {}", peer);

        if let Err(e) = handle_connection(&mut stream, device.as_ref(), advertised_port).await {
            error!("request failed: {}", e);
            let _ = send_response(&mut stream, UNKNOWN_SERVER_ERROR).await;
        }
        let _ = stream.shutdown().await;
    }
}

async fn handle_connection(
    stream: &mut TcpStream,
    device: &dyn DeviceController,
    advertised_port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header = match read_header_line(stream).await? {
        Some(line) => line,
        None => return Ok(()), // closed before a full header line
    };
    let target = match parse_request_line(&header) {
        Some(target) => target,
        None => return Ok(()), // malformed: close with no response
    };

    match target {
        Target::Favicon => Ok(()),
        Target::CrossDomainPolicy => {
            send_response(stream, &policy_file(advertised_port)).await?;
            Ok(())
        }
        Target::Help => {
            send_response(stream, HELP_TEXT).await?;
            Ok(())
        }
        Target::Command(raw) => {
            let body = dispatch(&raw, device)?;
            send_response(stream, &body).await?;
            Ok(())
        }
    }
}

/// Fixed 200 framing: text/html, permissive CORS, body, trailing CRLF.
async fn send_response(stream: &mut TcpStream, body: &str) -> std::io::Result<()> {
    let mut response = String::from("HTTP/1.1 200 OK\r\n");
    response.push_str("Content-Type: text/html; charset=ISO-8859-1\r\n");
    response.push_str("Access-Control-Allow-Origin: *\r\n");
    response.push_str("\r\n");
    response.push_str(body);
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await
}
