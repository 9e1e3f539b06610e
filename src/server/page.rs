//! Static display page
//!
//! The relay shares its port between WebSocket peers and browsers. Plain HTTP
//! requests get a small log viewer page that connects back as a `viewer`.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Page served to non-upgrade requests
pub const DISPLAY_PAGE: &str = include_str!("../../static/index.html");

/// Largest request head accepted
const MAX_HEAD_LEN: usize = 8 * 1024;

const MAX_HEADERS: usize = 64;

/// How long a client may take to send its full request head
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between peeks while the head is still arriving
const PEEK_INTERVAL: Duration = Duration::from_millis(5);

/// What an accepted TCP connection is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// WebSocket handshake
    WebSocket,
    /// Anything else; answered with the display page
    Page,
    /// Peer closed before sending a request
    Closed,
    /// Head was malformed, oversized or never completed; close without reply
    Rejected,
}

/// State of a request head seen so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Head {
    Partial,
    Complete { upgrade: bool },
    Invalid,
}

/// Classify the pending request without consuming any bytes
///
/// Only a complete head is classified.
pub async fn classify(stream: &TcpStream) -> std::io::Result<RequestKind> {
    classify_within(stream, HEAD_TIMEOUT).await
}

async fn classify_within(stream: &TcpStream, limit: Duration) -> std::io::Result<RequestKind> {
    match tokio::time::timeout(limit, peek_head(stream)).await {
        Ok(kind) => kind,
        Err(_) => Ok(RequestKind::Rejected),
    }
}

async fn peek_head(stream: &TcpStream) -> std::io::Result<RequestKind> {
    let mut buf = vec![0u8; MAX_HEAD_LEN];
    let mut seen = 0;

    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(RequestKind::Closed);
        }

        if n > seen {
            seen = n;
            match inspect_head(&buf[..n]) {
                Head::Complete { upgrade: true } => return Ok(RequestKind::WebSocket),
                Head::Complete { upgrade: false } => return Ok(RequestKind::Page),
                Head::Invalid => return Ok(RequestKind::Rejected),
                Head::Partial if n == buf.len() => return Ok(RequestKind::Rejected),
                Head::Partial => {}
            }
        }

        // peek returns the same bytes until more arrive
        tokio::time::sleep(PEEK_INTERVAL).await;
    }
}

/// Parse a raw request head and report whether it asks for a WebSocket upgrade
pub fn inspect_head(head: &[u8]) -> Head {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(head) {
        Ok(httparse::Status::Complete(_)) => {
            let upgrade = request.headers.iter().any(|h| {
                h.name.eq_ignore_ascii_case("upgrade")
                    && String::from_utf8_lossy(h.value)
                        .split(',')
                        .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
            });
            Head::Complete { upgrade }
        }
        Ok(httparse::Status::Partial) => Head::Partial,
        Err(_) => Head::Invalid,
    }
}

fn head_complete(head: &[u8]) -> bool {
    head.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Answer a plain HTTP request with the display page and close
pub async fn serve_display_page(mut stream: TcpStream) -> std::io::Result<()> {
    // Consume the whole head so closing does not reset the connection
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !head_complete(&head) && head.len() < MAX_HEAD_LEN {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        DISPLAY_PAGE.len(),
        DISPLAY_PAGE
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[test]
    fn test_upgrade_head_detected() {
        let head = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n";
        assert_eq!(inspect_head(head), Head::Complete { upgrade: true });
    }

    #[test]
    fn test_upgrade_header_case_insensitive() {
        let head = b"GET / HTTP/1.1\r\nhost: localhost\r\nUPGRADE: WebSocket\r\n\r\n";
        assert_eq!(inspect_head(head), Head::Complete { upgrade: true });
    }

    #[test]
    fn test_plain_get_is_not_upgrade() {
        let head = b"GET / HTTP/1.1\r\nHost: localhost\r\nAccept: text/html\r\n\r\n";
        assert_eq!(inspect_head(head), Head::Complete { upgrade: false });
    }

    #[test]
    fn test_request_line_is_not_a_header() {
        let head = b"GET /upgrade:websocket HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(inspect_head(head), Head::Complete { upgrade: false });
    }

    #[test]
    fn test_unterminated_head_is_partial() {
        let head = b"GET / HTTP/1.1\r\nHost: localhost\r\n";
        assert_eq!(inspect_head(head), Head::Partial);
    }

    #[test]
    fn test_garbage_head_is_invalid() {
        assert_eq!(inspect_head(b"\x00\x01\x02 nonsense\r\n\r\n"), Head::Invalid);
    }

    #[test]
    fn test_page_registers_as_viewer() {
        assert!(DISPLAY_PAGE.contains("role: 'viewer'"));
        assert!(DISPLAY_PAGE.contains("msg.type === 'log'"));
    }

    #[tokio::test]
    async fn test_serves_page_to_plain_request() {
        let (mut client, server) = pair().await;

        let reader = tokio::spawn(async move {
            client
                .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = String::new();
            client.read_to_string(&mut response).await.unwrap();
            response
        });

        assert_eq!(classify(&server).await.unwrap(), RequestKind::Page);
        serve_display_page(server).await.unwrap();

        let response = reader.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Content-Type: text/html"));
        assert!(response.ends_with(DISPLAY_PAGE));
    }

    #[tokio::test]
    async fn test_page_survives_head_split_across_writes() {
        let (mut client, server) = pair().await;

        let reader = tokio::spawn(async move {
            client
                .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            client
                .write_all(b"Accept: text/html\r\nUser-Agent: test\r\n\r\n")
                .await
                .unwrap();
            let mut response = String::new();
            client.read_to_string(&mut response).await.unwrap();
            response
        });

        assert_eq!(classify(&server).await.unwrap(), RequestKind::Page);
        serve_display_page(server).await.unwrap();

        assert!(reader.await.unwrap().ends_with(DISPLAY_PAGE));
    }

    #[tokio::test]
    async fn test_late_upgrade_header_still_upgrades() {
        let (mut client, server) = pair().await;

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(800)).await;
            client
                .write_all(
                    b"Connection: Upgrade\r\nUpgrade: websocket\r\n\
                      Sec-WebSocket-Version: 13\r\n\
                      Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
                )
                .await
                .unwrap();
            client
        });

        assert_eq!(classify(&server).await.unwrap(), RequestKind::WebSocket);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_stalled_head_is_rejected() {
        let (mut client, server) = pair().await;

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();

        let kind = classify_within(&server, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(kind, RequestKind::Rejected);
    }

    #[tokio::test]
    async fn test_classify_closed_connection() {
        let (client, server) = pair().await;
        drop(client);

        assert_eq!(classify(&server).await.unwrap(), RequestKind::Closed);
    }
}
