//! TCP acceptor for echo sessions.
//!
//! Binds the configured address, caps concurrent connections, and spawns
//! one handler task per accepted connection. All handlers share a single
//! sequence counter.

use crate::config::Config;
use crate::counter::SequenceCounter;
use crate::handler::handle_session;
use crate::session::Session;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Server instance
pub struct Server {
    config: Config,
    counter: Arc<SequenceCounter>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Server {
            config,
            counter: SequenceCounter::new(),
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Bind the configured address and begin accepting connections
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr: SocketAddr = self.config.listen.parse()?;
        let listener = bind_listener(addr)?;
        self.serve(listener).await?;
        Ok(())
    }

    /// Accept connections from an already-bound listener.
    ///
    /// Split out from `run` so tests can serve on an ephemeral port.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(address = %listener.local_addr()?, "Server listening");

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let counter = Arc::clone(&self.counter);
                    let max_message_bytes = self.config.max_message_bytes;

                    tokio::spawn(async move {
                        let session = Session::new(stream, max_message_bytes);
                        if let Err(e) = handle_session(session, counter).await {
                            debug!(error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the counter for testing
    #[cfg(test)]
    pub fn counter(&self) -> &Arc<SequenceCounter> {
        &self.counter
    }
}

/// Create the listener socket with reuse-address set before binding.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    fn test_config() -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            workers: None,
            max_message_bytes: 64 * 1024,
            log_level: "info".to_string(),
        }
    }

    async fn start_server() -> (Arc<Server>, SocketAddr) {
        let server = Arc::new(Server::new(test_config()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let acceptor = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = acceptor.serve(listener).await;
        });

        (server, addr)
    }

    async fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
        BufReader::new(TcpStream::connect(addr).await.unwrap())
    }

    /// Send one message and read back the response line.
    async fn request(client: &mut BufReader<TcpStream>, payload: &str) -> String {
        client
            .get_mut()
            .write_all(format!("{payload}\r\n").as_bytes())
            .await
            .unwrap();

        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    /// Extract the sequence number from a response line.
    fn sequence_of(response: &str) -> u64 {
        let (_, count) = response.rsplit_once(" - count=").unwrap();
        count.parse().unwrap()
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (_server, addr) = start_server().await;
        let mut client = connect(addr).await;

        assert_eq!(request(&mut client, "hello").await, "hello - count=1");
        assert_eq!(request(&mut client, "world").await, "world - count=2");
    }

    #[tokio::test]
    async fn test_sessions_share_one_sequence() {
        let (server, addr) = start_server().await;
        let mut first = connect(addr).await;
        let mut second = connect(addr).await;

        assert_eq!(request(&mut first, "a").await, "a - count=1");
        assert_eq!(request(&mut second, "b").await, "b - count=2");
        assert_eq!(request(&mut first, "c").await, "c - count=3");
        assert_eq!(request(&mut second, "d").await, "d - count=4");

        assert_eq!(server.counter().current(), 4);
    }

    #[tokio::test]
    async fn test_session_failure_leaves_others_unaffected() {
        let (_server, addr) = start_server().await;
        let mut healthy = connect(addr).await;
        let mut failing = connect(addr).await;

        assert_eq!(request(&mut healthy, "one").await, "one - count=1");
        assert_eq!(request(&mut failing, "two").await, "two - count=2");

        // An unterminated frame past the size cap tears the session down
        // without ever becoming a message. The write itself may fail if the
        // server closes the socket mid-stream.
        let oversized = vec![b'x'; 70 * 1024];
        let _ = failing.get_mut().write_all(&oversized).await;

        let mut line = String::new();
        let closed = failing.read_line(&mut line).await;
        assert!(matches!(closed, Ok(0) | Err(_)));

        // The surviving session keeps receiving correctly numbered responses
        assert_eq!(request(&mut healthy, "three").await, "three - count=3");
    }

    #[tokio::test]
    async fn test_concurrent_sessions_issue_complete_sequence() {
        let sessions = 8;
        let messages = 25;
        let (server, addr) = start_server().await;

        let clients: Vec<_> = (0..sessions)
            .map(|id| {
                tokio::spawn(async move {
                    let mut client = connect(addr).await;
                    let mut seen = Vec::with_capacity(messages);
                    for i in 0..messages {
                        let payload = format!("session-{id}-msg-{i}");
                        let response = request(&mut client, &payload).await;
                        // Responses on one session arrive for our own
                        // requests, in order
                        assert!(response.starts_with(&payload));
                        seen.push(sequence_of(&response));
                    }
                    seen
                })
            })
            .collect();

        let mut values = Vec::new();
        for client in clients {
            values.extend(client.await.unwrap());
        }
        values.sort_unstable();

        let total = (sessions * messages) as u64;
        let expected: Vec<u64> = (1..=total).collect();
        assert_eq!(values, expected);
        assert_eq!(server.counter().current(), total);
    }
}
