//! Relay Engine

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Connection, ConnectionStats, Direction, RelaySession, SessionOutcome};
use crate::access::AccessList;
use crate::config::ProxyConfig;
use crate::Result;

/// Authorizes clients, dials the target and splices the two connections
#[derive(Debug, Clone)]
pub struct RelayEngine {
    target_addr: String,
    connect_timeout: Duration,
    buffer_size: usize,
    access_list: AccessList,
}

impl RelayEngine {
    /// Create a new relay engine from configuration
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            target_addr: config.target_addr(),
            connect_timeout: config.target.connect_timeout,
            buffer_size: config.server.buffer_size,
            access_list: AccessList::new(&config.access_control),
        }
    }

    /// Upstream address in `host:port` form
    pub fn target_addr(&self) -> &str {
        &self.target_addr
    }

    /// Run one client connection through its whole lifecycle.
    ///
    /// The client connection is always closed by the time this returns.
    pub async fn run<C: Connection>(&self, client: C) -> SessionOutcome {
        let client_addr = match client.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!(error = %e, "Failed to read client address, closing connection");
                return SessionOutcome::Rejected { reason: e.to_string() };
            }
        };
        // A dual-stack listener reports IPv4 clients as `::ffff:a.b.c.d`
        let client_addr = SocketAddr::new(client_addr.ip().to_canonical(), client_addr.port());
        let client_ip = client_addr.ip().to_string();

        if !self.access_list.is_allowed(&client_ip) {
            warn!(client_ip = %client_ip, "Blocked connection from unauthorized IP");
            return SessionOutcome::Blocked { client_ip };
        }

        info!(client_ip = %client_ip, "Accepted connection");

        let (target, target_addr) = match self.connect_to_target().await {
            Ok(connected) => connected,
            Err(e) => {
                error!(target_addr = %self.target_addr, error = %e, "Failed to connect to target");
                return SessionOutcome::DialFailed { error: e.to_string() };
            }
        };

        let session = Arc::new(RelaySession::new(
            Uuid::new_v4().to_string(),
            client_addr,
            target_addr,
        ));

        SessionOutcome::Completed(self.relay(session, client, target).await)
    }

    /// Establish connection to the target, bounded by the connect timeout
    pub async fn connect_to_target(&self) -> Result<(TcpStream, SocketAddr)> {
        match timeout(self.connect_timeout, self.dial()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "Connection to {} timed out after {:?}",
                self.target_addr,
                self.connect_timeout
            )),
        }
    }

    async fn dial(&self) -> Result<(TcpStream, SocketAddr)> {
        debug!("Attempting to connect to target: {}", self.target_addr);

        let socket_addrs: Vec<SocketAddr> = lookup_host(self.target_addr.as_str())
            .await
            .with_context(|| format!("Failed to resolve target address {}", self.target_addr))?
            .collect();

        let mut last_error = None;
        for addr in socket_addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!("Connected to target {} ({})", self.target_addr, addr);
                    return Ok((stream, addr));
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(anyhow!(
                "Failed to connect to target {}: {}",
                self.target_addr,
                e
            )),
            None => Err(anyhow!(
                "Failed to connect to target {}: no addresses resolved",
                self.target_addr
            )),
        }
    }

    /// Relay data bidirectionally between client and target.
    ///
    /// Each direction runs as its own task and half-closes its write side
    /// when its reader hits end-of-input or an error. Returns once both
    /// tasks are done, after both connections have been closed.
    pub async fn relay<C, T>(
        &self,
        session: Arc<RelaySession>,
        client: C,
        target: T,
    ) -> ConnectionStats
    where
        C: Connection,
        T: Connection,
    {
        debug!(session_id = %session.session_id, "Starting bidirectional relay");

        let (client_reader, client_writer) = io::split(client);
        let (target_reader, target_writer) = io::split(target);

        let mut upstream = tokio::spawn(pipe(
            client_reader,
            target_writer,
            Arc::clone(&session),
            Direction::Upstream,
            self.buffer_size,
        ));
        let mut downstream = tokio::spawn(pipe(
            target_reader,
            client_writer,
            Arc::clone(&session),
            Direction::Downstream,
            self.buffer_size,
        ));

        // A task that dies only drops its own halves. The other halves keep
        // both sockets open, so the surviving task is aborted.
        let (upstream, downstream) = tokio::select! {
            result = &mut upstream => {
                if result.is_err() {
                    downstream.abort();
                }
                (result, downstream.await)
            }
            result = &mut downstream => {
                if result.is_err() {
                    upstream.abort();
                }
                (upstream.await, result)
            }
        };

        match (upstream, downstream) {
            (Ok((client_reader, target_writer)), Ok((target_reader, client_writer))) => {
                drop(client_reader.unsplit(client_writer));
                drop(target_reader.unsplit(target_writer));
            }
            (upstream, downstream) => {
                let failures = [
                    (Direction::Upstream, upstream.err()),
                    (Direction::Downstream, downstream.err()),
                ];
                for (direction, failure) in failures {
                    match failure {
                        Some(e) if e.is_panic() => {
                            error!(
                                session_id = %session.session_id,
                                %direction,
                                "Copy task panicked"
                            );
                        }
                        Some(_) => {
                            debug!(
                                session_id = %session.session_id,
                                %direction,
                                "Copy task aborted"
                            );
                        }
                        None => {}
                    }
                }
            }
        }

        session.finish()
    }
}

/// Copy one direction until end-of-input or an error, then half-close the
/// writer and hand both halves back to the session.
async fn pipe<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    session: Arc<RelaySession>,
    direction: Direction,
    buffer_size: usize,
) -> (ReadHalf<R>, WriteHalf<W>)
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(session_id = %session.session_id, %direction, error = %e, "Read error");
                break;
            }
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            debug!(session_id = %session.session_id, %direction, error = %e, "Write error");
            break;
        }

        session.record(direction, n);
    }

    if let Err(e) = writer.shutdown().await {
        debug!(session_id = %session.session_id, %direction, error = %e, "Half-close failed");
    }

    (reader, writer)
}
