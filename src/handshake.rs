//! One-time HTTP upgrade exchange establishing the logical connection.
//!
//! Opens the TCP socket, sends a `GET / HTTP/1.1` upgrade request with a
//! random `Sec-WebSocket-Key`, and accepts the response when the status line
//! carries `101` and an `Upgrade: websocket` header is present
//! (case-insensitive). The `Sec-WebSocket-Accept` hash is deliberately not
//! verified; the peer is a co-located, pre-authenticated controller.
//!
//! Every step runs under a bounded timeout; a refused connection or an
//! elapsed wait surfaces as a transport error, a rejected or malformed
//! response as a handshake error.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Result, WsBridgeError};

/// Reject responses growing past this without a header terminator.
const MAX_RESPONSE_LEN: usize = 8 * 1024;

/// End-of-headers marker in the HTTP response.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Connect and upgrade. Returns the raw stream plus any bytes the response
/// read pulled in past the header terminator; those belong to the frame
/// stream and must be fed to the reassembler first.
pub async fn perform(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<(TcpStream, Vec<u8>)> {
    let mut stream = timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| WsBridgeError::timed_out("TCP connect"))??;

    let request = build_request(host, port, &generate_key());
    stream.write_all(request.as_bytes()).await?;

    let (response, leftover) = read_response(&mut stream, connect_timeout).await?;
    validate_response(&response)?;

    Ok((stream, leftover))
}

/// Base64 of 16 random bytes, fresh per handshake.
fn generate_key() -> String {
    let raw: [u8; 16] = rand::random();
    STANDARD.encode(raw)
}

/// Build the upgrade request verbatim.
fn build_request(host: &str, port: u16, key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

/// Read until the blank line ending the response headers. Returns the
/// response bytes and whatever followed the terminator in the same reads.
async fn read_response(
    stream: &mut TcpStream,
    response_timeout: Duration,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = timeout(response_timeout, stream.read(&mut chunk))
            .await
            .map_err(|_| WsBridgeError::timed_out("handshake response"))??;

        if n == 0 {
            return Err(WsBridgeError::Handshake(
                "peer closed the connection during the upgrade exchange".to_string(),
            ));
        }

        response.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_terminator(&response) {
            let leftover = response.split_off(end + HEADER_TERMINATOR.len());
            return Ok((response, leftover));
        }

        if response.len() > MAX_RESPONSE_LEN {
            return Err(WsBridgeError::Handshake(format!(
                "response exceeded {MAX_RESPONSE_LEN} bytes without ending its headers"
            )));
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Accept the response iff the status line contains `101` and some header
/// line upgrades to websocket. The accept-hash is not checked.
fn validate_response(response: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(response);
    let mut lines = text.split("\r\n");

    let status = lines.next().unwrap_or("");
    if !status.contains("101") {
        return Err(WsBridgeError::Handshake(format!(
            "unexpected status line: {status:?}"
        )));
    }

    let upgraded = lines.any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("upgrade:") && lower.contains("websocket")
    });
    if !upgraded {
        return Err(WsBridgeError::Handshake(
            "response is missing the Upgrade: websocket header".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_required_headers() {
        let request = build_request("localhost", 8765, "c29tZSByYW5kb20ga2V5IQ==");

        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(request.contains("Host: localhost:8765\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: c29tZSByYW5kb20ga2V5IQ==\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_generated_key_is_base64_of_16_bytes() {
        let key = generate_key();
        let decoded = STANDARD.decode(&key).expect("valid base64");
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_accepts_switching_protocols() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
                         Upgrade: websocket\r\n\
                         Connection: Upgrade\r\n\
                         Sec-WebSocket-Accept: irrelevant\r\n\r\n";
        assert!(validate_response(response).is_ok());
    }

    #[test]
    fn test_upgrade_header_compare_is_case_insensitive() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
                         UPGRADE: WebSocket\r\n\r\n";
        assert!(validate_response(response).is_ok());
    }

    #[test]
    fn test_rejects_non_101_status() {
        let response = b"HTTP/1.1 403 Forbidden\r\n\
                         Upgrade: websocket\r\n\r\n";
        let err = validate_response(response).unwrap_err();
        assert!(matches!(err, WsBridgeError::Handshake(_)));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_rejects_missing_upgrade_header() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
                         Connection: keep-alive\r\n\r\n";
        assert!(matches!(
            validate_response(response),
            Err(WsBridgeError::Handshake(_))
        ));
    }

    #[test]
    fn test_terminator_split_keeps_trailing_bytes() {
        let mut wire = b"HTTP/1.1 101\r\nUpgrade: websocket\r\n\r\n".to_vec();
        wire.extend_from_slice(&[0x81, 0x02, b'h', b'i']);

        let end = find_terminator(&wire).unwrap();
        let leftover = wire.split_off(end + HEADER_TERMINATOR.len());
        assert_eq!(leftover, [0x81, 0x02, b'h', b'i']);
        assert!(validate_response(&wire).is_ok());
    }
}
