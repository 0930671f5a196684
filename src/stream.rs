//! Stream drives: scalar channels fed by an external process.
//!
//! A stream drive owns an [`ExternalChannel`] and, at a configurable cadence,
//! reads one whole message of `channels` native-endian `f64` values from it.
//! The last values received are shared with the file drives reading them
//! through [`StreamValues`]. When the peer goes away the drive is abandoned:
//! the values stay frozen and every later call is a no-op.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, ChannelResult, ConfigError, ConfigResult};

/// Default port of inet stream sockets.
pub const DEFAULT_PORT: u16 = 9012;

/// Ports below this value are reserved to privileged processes.
pub const RESERVED_PORTS: u16 = 1024;

/// Host used when an inet socket is declared without one.
pub const DEFAULT_HOST: &str = "127.0.0.1";

//------------------------------------------------------------------------------
// Configuration
//------------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_input_every() -> i64 {
    1
}

fn default_echo_precision() -> i64 {
    16
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoConfig {
    pub file: String,
    #[serde(default = "default_echo_precision")]
    pub precision: i64,
    /// Added to the time written with each echoed record
    #[serde(default)]
    pub shift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDriveConfig {
    pub label: u32,
    pub name: String,
    /// Listen for the peer instead of connecting to it
    #[serde(default)]
    pub create: bool,
    /// Local (unix domain) socket path
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_true")]
    pub blocking: bool,
    #[serde(default = "default_input_every")]
    pub input_every: i64,
    #[serde(default = "default_true")]
    pub receive_first: bool,
    /// Seconds, 0 waits forever
    #[serde(default)]
    pub timeout: f64,
    #[serde(default)]
    pub echo: Option<EchoConfig>,
    pub channels: i64,
    #[serde(default)]
    pub initial_values: Option<Vec<f64>>,
}

/// Resolved socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    Inet { host: String, port: u16 },
    Local { path: PathBuf },
}

impl StreamDriveConfig {
    /// Resolves the socket endpoint, filling in the default port and host.
    pub fn address(&self) -> ConfigResult<SocketAddress> {
        if let Some(path) = &self.path {
            if self.host.is_some() {
                return Err(ConfigError::LocalSocketConflict {
                    label: self.label,
                    what: "host",
                });
            }
            if self.port.is_some() {
                return Err(ConfigError::LocalSocketConflict {
                    label: self.label,
                    what: "port",
                });
            }
            return Ok(SocketAddress::Local {
                path: PathBuf::from(path),
            });
        }
        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port < RESERVED_PORTS {
            return Err(ConfigError::ReservedPort {
                label: self.label,
                port,
                min: RESERVED_PORTS,
            });
        }
        Ok(SocketAddress::Inet {
            host: self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        })
    }

    /// Checks every parameter, including the socket endpoint.
    pub fn validate(&self) -> ConfigResult<()> {
        let label = self.label;
        if self.channels <= 0 {
            return Err(ConfigError::InvalidChannelCount {
                label,
                channels: self.channels,
            });
        }
        if self.input_every <= 0 {
            return Err(ConfigError::InvalidInputEvery {
                label,
                value: self.input_every,
            });
        }
        if !(self.timeout >= 0. && self.timeout.is_finite()) {
            return Err(ConfigError::InvalidTimeout {
                label,
                value: self.timeout,
            });
        }
        if let Some(echo) = &self.echo {
            if echo.precision <= 0 {
                return Err(ConfigError::InvalidEchoPrecision {
                    label,
                    value: echo.precision,
                });
            }
        }
        if let Some(values) = &self.initial_values {
            if values.len() != self.channels as usize {
                return Err(ConfigError::InitialValuesMismatch {
                    label,
                    expected: self.channels as usize,
                    got: values.len(),
                });
            }
        }
        self.address()?;
        Ok(())
    }

    /// Timeout of blocking reads, `None` waits forever.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0.).then(|| Duration::from_secs_f64(self.timeout))
    }
}

//------------------------------------------------------------------------------
// Channels
//------------------------------------------------------------------------------

/// How a single read waits for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Blocking(Option<Duration>),
    /// Returns at once when nothing is pending. A message that has started
    /// to arrive is finished as a blocking read with this timeout.
    NonBlocking(Option<Duration>),
}

/// Outcome of a non-fatal read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// The buffer holds a whole message
    Message,
    /// No data pending, non-blocking reads only
    WouldBlock,
    /// The peer closed the channel
    Closed,
}

/// Source of fixed-size binary messages.
pub trait ExternalChannel: Send + fmt::Debug {
    /// Fills `buf` with exactly one message.
    fn recv(&mut self, buf: &mut [u8], mode: ReadMode) -> ChannelResult<Received>;
}

#[derive(Debug)]
enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Connection {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.set_nonblocking(nonblocking),
            #[cfg(unix)]
            Connection::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Connection::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Connection::Unix(s) => s.read(buf),
        }
    }
}

/// Stream socket connected to (or accepted from) the peer process.
#[derive(Debug)]
pub struct SocketChannel {
    name: String,
    conn: Connection,
}

impl SocketChannel {
    /// Connects to the peer, or waits for it to connect when `create` is set.
    pub fn open(name: &str, address: &SocketAddress, create: bool) -> io::Result<Self> {
        let conn = match address {
            SocketAddress::Inet { host, port } => {
                if create {
                    let listener = TcpListener::bind((host.as_str(), *port))?;
                    let (stream, peer) = listener.accept()?;
                    info!(name, %peer, "accepted stream peer");
                    Connection::Tcp(stream)
                } else {
                    Connection::Tcp(TcpStream::connect((host.as_str(), *port))?)
                }
            }
            #[cfg(unix)]
            SocketAddress::Local { path } => {
                use std::os::unix::net::{UnixListener, UnixStream};
                if create {
                    let listener = UnixListener::bind(path)?;
                    let (stream, _) = listener.accept()?;
                    Connection::Unix(stream)
                } else {
                    Connection::Unix(UnixStream::connect(path)?)
                }
            }
            #[cfg(not(unix))]
            SocketAddress::Local { .. } => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "local sockets are not available on this platform",
                ))
            }
        };
        Ok(SocketChannel {
            name: name.to_string(),
            conn,
        })
    }
}

impl ExternalChannel for SocketChannel {
    fn recv(&mut self, buf: &mut [u8], mode: ReadMode) -> ChannelResult<Received> {
        let name = &self.name;
        let io_error = |source| ChannelError::Io {
            name: name.clone(),
            source,
        };
        let (mut timeout, finish) = match mode {
            ReadMode::Blocking(timeout) => {
                self.conn.set_nonblocking(false).map_err(io_error)?;
                self.conn.set_read_timeout(timeout).map_err(io_error)?;
                (Some(timeout), timeout)
            }
            ReadMode::NonBlocking(finish) => {
                self.conn.set_nonblocking(true).map_err(io_error)?;
                (None, finish)
            }
        };

        let mut filled = 0;
        while filled < buf.len() {
            match self.conn.read(&mut buf[filled..]) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) => filled += n,
                Err(e) => match (e.kind(), timeout) {
                    (io::ErrorKind::Interrupted, _) => {}
                    (io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut, Some(t)) => {
                        return Err(ChannelError::Timeout {
                            name: name.clone(),
                            seconds: t.map_or(0., |t| t.as_secs_f64()),
                        })
                    }
                    (io::ErrorKind::WouldBlock, None) if filled == 0 => {
                        return Ok(Received::WouldBlock)
                    }
                    // Part of a message is in, wait for the rest
                    (io::ErrorKind::WouldBlock, None) => {
                        self.conn.set_nonblocking(false).map_err(io_error)?;
                        self.conn.set_read_timeout(finish).map_err(io_error)?;
                        timeout = Some(finish);
                    }
                    (io::ErrorKind::ConnectionReset, _) => return Ok(Received::Closed),
                    (io::ErrorKind::ConnectionAborted, _) => {
                        return Err(ChannelError::Reset { name: name.clone() })
                    }
                    _ => return Err(io_error(e)),
                },
            }
        }
        Ok(Received::Message)
    }
}

/// In-process channel, the peer pushes messages through a [`MemorySender`].
#[derive(Debug)]
pub struct MemoryChannel {
    name: String,
    rx: mpsc::Receiver<Vec<f64>>,
}

/// Producer side of a [`MemoryChannel`]. Dropping it closes the channel.
#[derive(Debug, Clone)]
pub struct MemorySender {
    tx: mpsc::Sender<Vec<f64>>,
}

impl MemorySender {
    /// Queues one message, returns false if the channel is gone.
    pub fn send(&self, values: &[f64]) -> bool {
        self.tx.send(values.to_vec()).is_ok()
    }
}

impl MemoryChannel {
    pub fn pair(name: &str) -> (MemorySender, MemoryChannel) {
        let (tx, rx) = mpsc::channel();
        (
            MemorySender { tx },
            MemoryChannel {
                name: name.to_string(),
                rx,
            },
        )
    }
}

impl ExternalChannel for MemoryChannel {
    fn recv(&mut self, buf: &mut [u8], mode: ReadMode) -> ChannelResult<Received> {
        let message = match mode {
            ReadMode::NonBlocking(_) => match self.rx.try_recv() {
                Ok(m) => m,
                Err(TryRecvError::Empty) => return Ok(Received::WouldBlock),
                Err(TryRecvError::Disconnected) => return Ok(Received::Closed),
            },
            ReadMode::Blocking(Some(timeout)) => match self.rx.recv_timeout(timeout) {
                Ok(m) => m,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ChannelError::Timeout {
                        name: self.name.clone(),
                        seconds: timeout.as_secs_f64(),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(Received::Closed),
            },
            ReadMode::Blocking(None) => match self.rx.recv() {
                Ok(m) => m,
                Err(_) => return Ok(Received::Closed),
            },
        };
        if message.len() * 8 != buf.len() {
            return Err(ChannelError::Io {
                name: self.name.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "message of {} values, expected {}",
                        message.len(),
                        buf.len() / 8
                    ),
                ),
            });
        }
        for (chunk, v) in buf.chunks_exact_mut(8).zip(message) {
            chunk.copy_from_slice(&v.to_ne_bytes());
        }
        Ok(Received::Message)
    }
}

//------------------------------------------------------------------------------
// Shared values
//------------------------------------------------------------------------------

/// Last values received by a stream drive, shared with its readers.
#[derive(Debug, Clone, Default)]
pub struct StreamValues(Arc<RwLock<Vec<f64>>>);

impl StreamValues {
    fn new(values: Vec<f64>) -> Self {
        StreamValues(Arc::new(RwLock::new(values)))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<f64>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Value of a 0-based channel.
    pub fn get(&self, i: usize) -> f64 {
        self.read()[i]
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.read().clone()
    }

    /// Stores new values, returns whether any of them changed.
    fn replace(&self, values: &[f64]) -> bool {
        let mut current = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let changed = current.iter().zip(values).any(|(a, b)| a != b);
        current.copy_from_slice(values);
        changed
    }
}

//------------------------------------------------------------------------------
// Stream drive
//------------------------------------------------------------------------------

/// Result of serving a stream drive for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeStatus {
    /// A message was read and the values updated
    Updated,
    /// Nothing was read this step
    Idle,
    /// The peer is gone, values are frozen
    Abandoned,
}

pub struct StreamDrive {
    config: StreamDriveConfig,
    input_every: i64,
    counter: i64,
    mode: ReadMode,
    values: StreamValues,
    channel: Box<dyn ExternalChannel>,
    buf: Vec<u8>,
    abandoned: bool,
    echo: Option<Box<dyn Write + Send>>,
}

impl fmt::Debug for StreamDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDrive")
            .field("label", &self.config.label)
            .field("name", &self.config.name)
            .field("counter", &self.counter)
            .field("abandoned", &self.abandoned)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl StreamDrive {
    /// Builds a drive reading from an already open channel.
    pub fn new(config: &StreamDriveConfig, channel: Box<dyn ExternalChannel>) -> ConfigResult<Self> {
        config.validate()?;
        let channels = config.channels as usize;
        let input_every = config.input_every;
        let values = config
            .initial_values
            .clone()
            .unwrap_or_else(|| vec![0.; channels]);
        Ok(StreamDrive {
            input_every,
            counter: if config.receive_first {
                input_every - 1
            } else {
                -1
            },
            mode: if config.blocking {
                ReadMode::Blocking(config.timeout())
            } else {
                ReadMode::NonBlocking(config.timeout())
            },
            values: StreamValues::new(values),
            channel,
            buf: vec![0; channels * 8],
            abandoned: false,
            echo: None,
            config: config.clone(),
        })
    }

    /// Opens the configured socket, and the echo file if any.
    pub fn connect(config: &StreamDriveConfig) -> ConfigResult<Self> {
        config.validate()?;
        if config.path.is_none() && config.host.is_none() {
            warn!(
                label = config.label,
                host = DEFAULT_HOST,
                "stream drive host undefined, using default"
            );
        }
        let address = config.address()?;
        info!(label = config.label, name = %config.name, ?address, create = config.create, "opening stream drive");
        let channel = SocketChannel::open(&config.name, &address, config.create).map_err(
            |source| ConfigError::Channel {
                label: config.label,
                source: ChannelError::Io {
                    name: config.name.clone(),
                    source,
                },
            },
        )?;
        let mut drive = Self::new(config, Box::new(channel))?;
        if let Some(echo) = &config.echo {
            let file = File::create(&echo.file).map_err(|source| ConfigError::Io {
                path: echo.file.clone(),
                source,
            })?;
            drive.echo = Some(Box::new(BufWriter::new(file)));
        }
        Ok(drive)
    }

    /// Redirects the echo of received values.
    pub fn with_echo_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.echo = Some(sink);
        self
    }

    pub fn label(&self) -> u32 {
        self.config.label
    }

    pub fn config(&self) -> &StreamDriveConfig {
        &self.config
    }

    pub fn channels(&self) -> usize {
        self.buf.len() / 8
    }

    pub fn values(&self) -> StreamValues {
        self.values.clone()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Reads from the channel if this step is due.
    pub fn serve_pending(&mut self, t: f64) -> ChannelResult<ServeStatus> {
        if self.abandoned {
            return Ok(ServeStatus::Abandoned);
        }
        self.counter += 1;
        if self.counter != self.input_every {
            return Ok(ServeStatus::Idle);
        }
        self.counter = 0;

        match self.channel.recv(&mut self.buf, self.mode)? {
            Received::Message => {}
            Received::WouldBlock => return Ok(ServeStatus::Idle),
            Received::Closed => {
                warn!(
                    label = self.config.label,
                    name = %self.config.name,
                    "stream drive peer closed the channel, values are frozen"
                );
                self.abandoned = true;
                return Ok(ServeStatus::Abandoned);
            }
        }

        let received: Vec<f64> = self
            .buf
            .chunks_exact(8)
            .map(|c| {
                let mut bytes = [0; 8];
                bytes.copy_from_slice(c);
                f64::from_ne_bytes(bytes)
            })
            .collect();
        debug!(label = self.config.label, t, "stream drive updated");
        if self.values.replace(&received) {
            self.write_echo(t, &received)
                .map_err(|source| ChannelError::Io {
                    name: self.config.name.clone(),
                    source,
                })?;
        }
        Ok(ServeStatus::Updated)
    }

    fn write_echo(&mut self, t: f64, values: &[f64]) -> io::Result<()> {
        let Some(sink) = self.echo.as_mut() else {
            return Ok(());
        };
        let (precision, shift) = match &self.config.echo {
            Some(e) => (e.precision as usize, e.shift),
            None => (default_echo_precision() as usize, 0.),
        };
        let mut line = format!("{:.*e}", precision, t + shift);
        for v in values {
            line.push_str(&format!(" {:.*e}", precision, v));
        }
        writeln!(sink, "{line}")?;
        sink.flush()
    }

    /// Restart statement with every defining parameter.
    pub fn restart(&self) -> String {
        let c = &self.config;
        let mut s = format!(
            "file: {}, socket stream, stream drive name, \"{}\", create, {}",
            c.label,
            c.name,
            yes_no(c.create)
        );
        match c.address() {
            Ok(SocketAddress::Local { path }) => {
                s.push_str(&format!(", path, \"{}\"", path.display()))
            }
            Ok(SocketAddress::Inet { host, port }) => {
                s.push_str(&format!(", port, {}, host, \"{}\"", port, host))
            }
            Err(_) => {}
        }
        if !c.blocking {
            s.push_str(", non blocking");
        }
        s.push_str(&format!(
            ", input every, {}, receive first, {}, timeout, {:?}",
            c.input_every,
            yes_no(c.receive_first),
            c.timeout
        ));
        if let Some(echo) = &c.echo {
            s.push_str(&format!(
                ", echo, \"{}\", precision, {}, shift, {:?}",
                echo.file, echo.precision, echo.shift
            ));
        }
        s.push_str(&format!(", {}", c.channels));
        if let Some(values) = &c.initial_values {
            s.push_str(", initial values");
            for v in values {
                s.push_str(&format!(", {:?}", v));
            }
        }
        s.push(';');
        s
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Stream drives of a model, looked up by label.
#[derive(Debug, Default)]
pub struct StreamDriveSet {
    drives: Vec<StreamDrive>,
}

impl StreamDriveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, drive: StreamDrive) -> ConfigResult<()> {
        if self.get(drive.label()).is_some() {
            return Err(ConfigError::DuplicateLabel {
                what: "stream drive",
                label: drive.label(),
            });
        }
        self.drives.push(drive);
        Ok(())
    }

    pub fn get(&self, label: u32) -> Option<&StreamDrive> {
        self.drives.iter().find(|d| d.label() == label)
    }

    pub fn get_mut(&mut self, label: u32) -> Option<&mut StreamDrive> {
        self.drives.iter_mut().find(|d| d.label() == label)
    }

    pub fn values(&self, label: u32) -> Option<StreamValues> {
        self.get(label).map(StreamDrive::values)
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamDrive> {
        self.drives.iter()
    }

    /// Serves every drive in declaration order.
    pub fn serve_pending(&mut self, t: f64) -> ChannelResult<Vec<ServeStatus>> {
        self.drives.iter_mut().map(|d| d.serve_pending(t)).collect()
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
