//! TCP link to the sensor.
//!
//! [`SensorLink`] owns everything about the connection: the current stream,
//! the [`LineFramer`] carry buffer, the lifecycle [`LinkState`] and a
//! generation counter that increases on every successful connect.  It is
//! owned by exactly one task (the supervisor), so reads, writes and
//! reconnects are naturally serialized.
//!
//! # Recovery model
//!
//! The sensor reboots, its network flaps, and it may not be powered when the
//! bridge starts.  Reads on the link itself never reconnect; they report a
//! [`LinkError`] and the owner calls [`SensorLink::mark_lost`] followed by
//! [`SensorLink::establish`], which redials and repeats the configuration
//! handshake.  Bytes already in the carry buffer are kept across the
//! reconnect, so a frame split by a connection loss is completed by the next
//! connection's bytes.
//!
//! # Portability note
//!
//! The stream type comes from a [`Connector`], which lets tests substitute
//! `tokio_test::io::Mock` or an in-memory duplex for a real `TcpStream`.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use dvl_core::{ConfigParameters, LineFramer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::handshake::{configure, FrameChannel, HandshakeOutcome};
use crate::domain::{BridgeConfig, LinkError, LinkState};

/// Size of the scratch buffer for each socket read.
const READ_CHUNK: usize = 4096;

/// Opens byte streams to the sensor.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Makes one connection attempt.
    async fn connect(&self) -> io::Result<Self::Stream>;

    /// Human-readable address for log messages.
    fn endpoint(&self) -> String;
}

/// Dials the sensor over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        // Commands are single short lines; don't let Nagle hold them back.
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timing and handshake settings for a [`SensorLink`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub read_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub handshake_timeout: Duration,
    pub sensor: ConfigParameters,
}

impl From<&BridgeConfig> for LinkSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            read_timeout: config.read_timeout,
            reconnect_backoff: config.reconnect_backoff,
            handshake_timeout: config.handshake_timeout,
            sensor: config.sensor.clone(),
        }
    }
}

/// The single owner of the sensor connection.
pub struct SensorLink<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    framer: LineFramer,
    state: LinkState,
    /// Incremented on every successful connect; 0 means never connected.
    generation: u64,
    settings: LinkSettings,
    read_buf: Vec<u8>,
    /// When the outstanding read gives up.  Set when a read starts waiting,
    /// cleared as soon as bytes arrive, so an abandoned read's deadline is
    /// inherited by the next one.
    read_deadline: Option<Instant>,
}

impl<C: Connector> SensorLink<C> {
    pub fn new(connector: C, settings: LinkSettings) -> Self {
        Self {
            connector,
            stream: None,
            framer: LineFramer::new(),
            state: LinkState::Disconnected,
            generation: 0,
            settings,
            read_buf: vec![0u8; READ_CHUNK],
            read_deadline: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Frames already split off the stream but not yet handed out.
    pub fn pending_frames(&self) -> usize {
        self.framer.pending()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Dials until a connection succeeds, sleeping the reconnect backoff
    /// between attempts.  Any existing stream is dropped first.
    ///
    /// There is no attempt limit: the sensor may take a long time to boot.
    pub async fn connect_with_retry(&mut self) {
        // Start from a clean slate: any old stream is dropped, but the
        // framer's carry is not touched.
        self.mark_lost();
        let endpoint = self.connector.endpoint();
        loop {
            self.state = LinkState::Connecting;
            debug!(%endpoint, "connecting to DVL");
            match self.connector.connect().await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.generation += 1;
                    self.state = LinkState::Connected;
                    info!(%endpoint, generation = self.generation, "connected to DVL");
                    return;
                }
                Err(e) => {
                    error!(%endpoint, "no route to DVL, it may still be booting: {e}");
                    // Constant delay, no attempt limit.
                    tokio::time::sleep(self.settings.reconnect_backoff).await;
                }
            }
        }
    }

    /// Connects and pushes the configuration.
    ///
    /// A connection lost during the handshake counts as a failed attempt:
    /// the link backs off and dials again.  A rejected or unanswered
    /// configuration is reported and the link is used anyway.
    pub async fn establish(&mut self) -> HandshakeOutcome {
        // `configure` borrows the whole link as its `FrameChannel`, so copy
        // out what it needs first.
        let parameters = self.settings.sensor.clone();
        let timeout = self.settings.handshake_timeout;
        loop {
            self.connect_with_retry().await;
            match configure(self, &parameters, timeout).await {
                // Back off before redialing: a peer that accepts and closes
                // at once must not be redialed in a hot loop.
                HandshakeOutcome::Transport(e) => {
                    error!(generation = self.generation, "connection lost during configuration: {e}");
                    self.mark_lost();
                    tokio::time::sleep(self.settings.reconnect_backoff).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Returns the next frame from the current connection.
    ///
    /// Queued frames are returned without touching the socket.  Otherwise
    /// reads until at least one complete frame is available.  Never
    /// reconnects.
    ///
    /// Cancel safe.  Dropping the future loses no bytes, and the read
    /// timeout keeps counting from when the link first started waiting: a
    /// caller that keeps interrupting reads cannot postpone the timeout.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotConnected`] if there is no stream
    /// - [`LinkError::Timeout`] if no bytes arrive within the read timeout
    /// - [`LinkError::Closed`] on EOF
    /// - [`LinkError::Io`] on any other socket error
    pub async fn recv_frame(&mut self) -> Result<String, LinkError> {
        loop {
            if let Some(frame) = self.framer.pop() {
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

            // The deadline is stored before the first await.  If this future
            // is dropped mid-read, the next call finds it and waits only for
            // the time that is left.
            let read_timeout = self.settings.read_timeout;
            let deadline = *self
                .read_deadline
                .get_or_insert_with(|| Instant::now() + read_timeout);

            let result = tokio::time::timeout_at(deadline, stream.read(&mut self.read_buf)).await;
            // Any outcome other than "still waiting" ends this deadline.
            self.read_deadline = None;
            let n = match result {
                Err(_) => return Err(LinkError::Timeout(read_timeout)),
                Ok(Err(e)) => return Err(LinkError::Io(e)),
                Ok(Ok(0)) => return Err(LinkError::Closed),
                Ok(Ok(n)) => n,
            };

            // The bytes are in `read_buf` only until the next read, so hand
            // them to the framer before anything else can await.  Whatever
            // is left after the last delimiter stays in the framer's carry,
            // which is never reset by a reconnect.
            if let Err(e) = self.framer.push(&self.read_buf[..n]) {
                warn!(generation = self.generation, "{e}");
            }
        }
    }

    /// Pops a frame already split off the stream, without any I/O.
    pub fn take_frame(&mut self) -> Option<String> {
        self.framer.pop()
    }

    /// Writes one line (already newline terminated) to the sensor.
    ///
    /// A failed write drops the stream so the next read re-establishes it.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotConnected`] when there is no stream; otherwise the
    /// write or timeout failure.
    pub async fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;
        let result = tokio::time::timeout(
            self.settings.read_timeout,
            write_all_flush(stream, line.as_bytes()),
        )
        .await;

        let err = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => LinkError::Io(e),
            Err(_) => LinkError::Timeout(self.settings.read_timeout),
        };
        warn!(generation = self.generation, "write to DVL failed, dropping connection: {err}");
        self.mark_lost();
        Err(err)
    }

    /// Drops the current stream without closing it gracefully.
    ///
    /// The framer is left alone: a frame cut in half by the loss is
    /// completed by the first bytes of the next connection.
    pub fn mark_lost(&mut self) {
        self.stream = None;
        self.read_deadline = None;
        self.state = LinkState::Disconnected;
    }

    /// Shuts the connection down.  Safe to call when already closed.
    pub async fn close(&mut self) {
        self.read_deadline = None;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("error while shutting down DVL connection: {e}");
            }
            info!(generation = self.generation, "closed DVL connection");
        }
        self.state = LinkState::Disconnected;
    }
}

async fn write_all_flush<S>(stream: &mut S, bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}

#[async_trait]
impl<C: Connector> FrameChannel for SensorLink<C> {
    async fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.write_line(line).await
    }

    async fn recv_frame(&mut self) -> Result<String, LinkError> {
        SensorLink::recv_frame(self).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
