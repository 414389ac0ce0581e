use super::WsError;
use crate::dispatcher::FALLBACK_VERSION;
use crate::server::{HttpRequest, HttpResponse, Method, StatusCode};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the upgrade request head.
pub const MAX_HANDSHAKE_BYTES: usize = 8 * 1024;

/// `Sec-WebSocket-Accept` for a client key: base64(sha1(key + GUID)).
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Check the upgrade headers and return the client key.
pub fn validate_upgrade(request: &HttpRequest) -> Result<&str, &'static str> {
    if request.method != Method::Get {
        return Err("method must be GET");
    }
    let has_token = |name: &str, token: &str| {
        request
            .header(name)
            .is_some_and(|v| v.to_ascii_lowercase().contains(token))
    };
    if !has_token("Upgrade", "websocket") {
        return Err("missing or invalid Upgrade header");
    }
    if !has_token("Connection", "upgrade") {
        return Err("missing or invalid Connection header");
    }
    if request.header("Sec-WebSocket-Version").map(str::trim) != Some("13") {
        return Err("missing or invalid Sec-WebSocket-Version (must be 13)");
    }
    match request.header("Sec-WebSocket-Key").map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err("missing Sec-WebSocket-Key header"),
    }
}

pub fn upgrade_response(accept: &str) -> HttpResponse {
    HttpResponse::new(StatusCode::SwitchingProtocols)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", accept)
}

pub fn bad_request(reason: &str) -> HttpResponse {
    let body = format!("Bad Request: {reason}");
    HttpResponse::new(StatusCode::BadRequest)
        .with_header("Content-Type", "text/plain")
        .with_header("Content-Length", body.len())
        .with_header("Connection", "close")
        .with_body(body)
}

/// Read the request head, up to and including the blank line.
async fn read_head<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, WsError> {
    let mut head = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(WsError::Handshake("connection closed during handshake"));
        }
        head.extend_from_slice(&chunk[..n]);
        if let Some(end) = head.windows(4).position(|w| w == b"\r\n\r\n") {
            let extra = head.len() - (end + 4);
            if extra > 0 {
                debug!(bytes = extra, "Discarding bytes sent before the upgrade reply");
            }
            head.truncate(end + 4);
            return Ok(head);
        }
        if head.len() > MAX_HANDSHAKE_BYTES {
            return Err(WsError::Handshake("request head too large"));
        }
    }
}

/// Perform the server side of the upgrade.
///
/// On success the 101 reply has been written and the stream is ready for
/// frames. On a bad request a 400 with the reason has been written.
pub async fn accept<S>(stream: &mut S) -> Result<HttpRequest, WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = match read_head(stream).await {
        Ok(head) => head,
        Err(WsError::Handshake(reason)) => return reject(stream, reason).await,
        Err(e) => return Err(e),
    };
    let request = match HttpRequest::parse(&head) {
        Ok(request) => request,
        Err(_) => return reject(stream, "malformed upgrade request").await,
    };
    let accept = match validate_upgrade(&request) {
        Ok(key) => accept_key(key),
        Err(reason) => return reject(stream, reason).await,
    };
    stream
        .write_all(&upgrade_response(&accept).encode(FALLBACK_VERSION))
        .await?;
    stream.flush().await?;
    Ok(request)
}

async fn reject<S, T>(stream: &mut S, reason: &'static str) -> Result<T, WsError>
where
    S: AsyncWrite + Unpin,
{
    // Best effort; the peer may already be gone.
    if stream
        .write_all(&bad_request(reason).encode(FALLBACK_VERSION))
        .await
        .is_ok()
    {
        drop(stream.shutdown().await);
    }
    Err(WsError::Handshake(reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade(extra: &str) -> String {
        format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
             Connection: keep-alive, Upgrade\r\n{extra}\r\n"
        )
    }

    #[test]
    fn accept_key_matches_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn validates_required_headers() {
        let ok = upgrade("Sec-WebSocket-Key: abc==\r\nSec-WebSocket-Version: 13\r\n");
        let req = HttpRequest::parse(ok.as_bytes()).unwrap();
        assert_eq!(validate_upgrade(&req), Ok("abc=="));

        let no_key = upgrade("Sec-WebSocket-Version: 13\r\n");
        let req = HttpRequest::parse(no_key.as_bytes()).unwrap();
        assert!(validate_upgrade(&req).is_err());

        let old = upgrade("Sec-WebSocket-Key: abc==\r\nSec-WebSocket-Version: 8\r\n");
        let req = HttpRequest::parse(old.as_bytes()).unwrap();
        assert!(validate_upgrade(&req).is_err());

        let post = HttpRequest::parse(b"POST / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n").unwrap();
        assert_eq!(validate_upgrade(&post), Err("method must be GET"));
    }

    #[tokio::test]
    async fn plain_http_gets_400() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client
            .write_all(b"GET /api/library HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let result = accept(&mut server).await;
        assert!(matches!(result, Err(WsError::Handshake(_))));
        drop(server);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(reply.contains("Upgrade header"));
    }

    #[tokio::test]
    async fn valid_upgrade_gets_101() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let req = upgrade("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n");
        client.write_all(req.as_bytes()).await.unwrap();
        accept(&mut server).await.unwrap();
        drop(server);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }
}
