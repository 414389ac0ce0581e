#![allow(dead_code)]

pub mod test_server {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use yomu_server::collab::{DirDownloader, MemoryLibrary, MemorySources, Network, NullUpdater};
    use yomu_server::config::ServerConfig;
    use yomu_server::events::EventBus;
    use yomu_server::handlers::Services;
    use yomu_server::{AppHandle, YomuServer};

    /// Both endpoints on loopback with ephemeral ports. Stops on drop.
    pub struct TestServer {
        handle: Option<AppHandle>,
        pub library: Arc<MemoryLibrary>,
        pub bus: EventBus,
        pub data_dir: tempfile::TempDir,
    }

    pub fn local_config() -> ServerConfig {
        ServerConfig {
            http_port: 0,
            ws_port: 0,
            bind_address: "127.0.0.1".into(),
            fetch_workers: 1,
            ..ServerConfig::default()
        }
    }

    pub struct Builder {
        config: ServerConfig,
        network: Option<Arc<dyn Network>>,
        sources: Option<MemorySources>,
        bus: EventBus,
    }

    impl Builder {
        pub fn config(mut self, tweak: impl FnOnce(&mut ServerConfig)) -> Self {
            tweak(&mut self.config);
            self
        }

        pub fn network(mut self, network: Arc<dyn Network>) -> Self {
            self.network = Some(network);
            self
        }

        /// Sources must publish on [`Builder::bus`].
        pub fn sources(mut self, sources: MemorySources) -> Self {
            self.sources = Some(sources);
            self
        }

        pub fn bus(&self) -> EventBus {
            self.bus.clone()
        }

        pub fn start(mut self) -> TestServer {
            let data_dir = tempfile::tempdir().unwrap();
            self.config.data_dir = data_dir.path().to_path_buf();
            let mut services = Services::reference(&self.config).unwrap();
            let library = Arc::new(MemoryLibrary::new(self.bus.clone()));
            services.library = library.clone();
            services.sources = Arc::new(
                self.sources
                    .unwrap_or_else(|| MemorySources::new(self.bus.clone())),
            );
            services.updater = Arc::new(NullUpdater);
            services.downloader = Arc::new(DirDownloader::new(data_dir.path()));
            services.bus = self.bus.clone();
            if let Some(network) = self.network {
                services.network = network;
            }

            let handle = YomuServer::start(&self.config, services).unwrap();
            handle.wait_ready().unwrap();
            TestServer {
                handle: Some(handle),
                library,
                bus: self.bus,
                data_dir,
            }
        }
    }

    impl TestServer {
        pub fn builder() -> Builder {
            Builder {
                config: local_config(),
                network: None,
                sources: None,
                bus: EventBus::default(),
            }
        }

        pub fn start() -> Self {
            Self::builder().start()
        }

        pub fn http_addr(&self) -> SocketAddr {
            self.handle.as_ref().unwrap().http_addr()
        }

        pub fn ws_addr(&self) -> SocketAddr {
            self.handle.as_ref().unwrap().ws_addr()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop().unwrap();
            }
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    pub struct Response {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl Response {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Write `raw` and read until the server closes or goes quiet.
    pub fn send_raw(addr: SocketAddr, raw: &[u8], timeout: Duration) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(raw).unwrap();
        stream.set_read_timeout(Some(timeout)).unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 4096];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        buf
    }

    pub fn parse_response(raw: &[u8]) -> Response {
        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap_or_else(|| panic!("incomplete response: {:?}", String::from_utf8_lossy(raw)));
        let head = String::from_utf8_lossy(&raw[..split]).into_owned();
        let mut lines = head.split("\r\n");
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Response {
            status,
            headers,
            body: raw[split + 4..].to_vec(),
        }
    }

    pub fn send_request(addr: SocketAddr, raw: &str) -> Response {
        parse_response(&send_raw(addr, raw.as_bytes(), Duration::from_secs(5)))
    }

    pub fn get(addr: SocketAddr, path: &str) -> Response {
        send_request(addr, &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"))
    }

    pub fn post(addr: SocketAddr, path: &str, body: &str) -> Response {
        send_request(
            addr,
            &format!(
                "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        )
    }

    pub fn delete(addr: SocketAddr, path: &str) -> Response {
        send_request(addr, &format!("DELETE {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"))
    }
}

pub mod ws_client {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    pub const CLIENT_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    /// Blocking RFC 6455 client, enough to read broadcasts.
    pub struct WsClient {
        stream: TcpStream,
    }

    impl WsClient {
        pub fn connect(addr: SocketAddr) -> Self {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let request = format!(
                "GET / HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
                 Sec-WebSocket-Key: {CLIENT_KEY}\r\nSec-WebSocket-Version: 13\r\n\r\n"
            );
            stream.write_all(request.as_bytes()).unwrap();

            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                stream.read_exact(&mut byte).unwrap();
                head.push(byte[0]);
            }
            let head = String::from_utf8_lossy(&head);
            assert!(head.starts_with("HTTP/1.1 101"), "handshake refused: {head}");
            assert!(head.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
            Self { stream }
        }

        pub fn set_timeout(&self, timeout: Duration) {
            self.stream.set_read_timeout(Some(timeout)).unwrap();
        }

        /// Next frame as (opcode, payload), or `None` on timeout or close.
        pub fn read_frame(&mut self) -> Option<(u8, Vec<u8>)> {
            let mut header = [0u8; 2];
            self.stream.read_exact(&mut header).ok()?;
            let opcode = header[0] & 0x0f;
            let len = match header[1] & 0x7f {
                126 => {
                    let mut ext = [0u8; 2];
                    self.stream.read_exact(&mut ext).ok()?;
                    u16::from_be_bytes(ext) as usize
                }
                127 => {
                    let mut ext = [0u8; 8];
                    self.stream.read_exact(&mut ext).ok()?;
                    u64::from_be_bytes(ext) as usize
                }
                n => n as usize,
            };
            let mut payload = vec![0u8; len];
            self.stream.read_exact(&mut payload).ok()?;
            Some((opcode, payload))
        }

        pub fn read_text(&mut self) -> Option<String> {
            loop {
                match self.read_frame()? {
                    (0x1, payload) => return Some(String::from_utf8(payload).unwrap()),
                    (0x8, _) => return None,
                    _ => continue,
                }
            }
        }

        pub fn read_json(&mut self) -> Option<serde_json::Value> {
            self.read_text().map(|t| serde_json::from_str(&t).unwrap())
        }

        /// Send a masked client frame.
        pub fn send(&mut self, opcode: u8, payload: &[u8]) {
            assert!(payload.len() < 126);
            let key = [0x12u8, 0x34, 0x56, 0x78];
            let mut frame = vec![0x80 | opcode, 0x80 | payload.len() as u8];
            frame.extend_from_slice(&key);
            frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
            self.stream.write_all(&frame).unwrap();
        }
    }
}
