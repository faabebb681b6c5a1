use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

const LEN_PREFIX_BYTES: usize = 4;

/// One pending connection at a time; the server finishes a client
/// before accepting the next
const LISTEN_BACKLOG: u32 = 1;

/// Failures the framing layer can surface. A close at a frame boundary
/// and a close mid-frame are distinct conditions: the first is a normal
/// goodbye, the second means the peer vanished with data outstanding.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Peer closed the stream between frames
    #[error("peer closed the connection")]
    Closed,

    /// Peer closed the stream with a frame half-received
    #[error("peer disconnected during receive")]
    Disconnected,

    /// No frame arrived within the configured read timeout
    #[error("timed out waiting for a frame")]
    TimedOut,

    /// Payload does not fit the 4-byte length prefix
    #[error("frame payload too large for the wire ({0} bytes)")]
    FrameTooLarge(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// TCP keepalive knobs, surfaced through the CLI
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveConfig {
    /// Idle time before probing starts
    pub idle: Duration,
    /// Interval between probes
    pub interval: Duration,
    /// Failed probes before the connection is declared dead
    pub max_fails: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(10),
            interval: Duration::from_secs(5),
            max_fails: 4,
        }
    }
}

/// A framed connection: every message goes out as a 4-byte big-endian
/// length prefix followed by exactly that many payload bytes
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    read_timeout: Option<Duration>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            read_timeout: None,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Bound how long `receive` waits for the next frame
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Send one frame. The exclusive borrow keeps logical messages from
    /// interleaving on the stream.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let len = u32::try_from(data.len())
            .map_err(|_| ConnectionError::FrameTooLarge(data.len()))?;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive one frame, waiting until the whole payload is in. A
    /// partial frame is never returned.
    pub async fn receive(&mut self) -> Result<Vec<u8>, ConnectionError> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.receive_frame())
                .await
                .map_err(|_| ConnectionError::TimedOut)?,
            None => self.receive_frame().await,
        }
    }

    async fn receive_frame(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let mut len_bytes = [0u8; LEN_PREFIX_BYTES];
        let mut filled = 0;
        while filled < LEN_PREFIX_BYTES {
            let n = self.stream.read(&mut len_bytes[filled..]).await?;
            if n == 0 {
                return Err(if filled == 0 {
                    ConnectionError::Closed
                } else {
                    ConnectionError::Disconnected
                });
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ConnectionError::Disconnected
            } else {
                ConnectionError::Io(e)
            }
        })?;
        Ok(payload)
    }
}

/// Bind a listener with SO_REUSEADDR and the single-slot backlog
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Accept the next client and tune its socket
pub async fn accept(
    listener: &TcpListener,
    keepalive: &KeepaliveConfig,
) -> io::Result<Connection> {
    let (stream, peer_addr) = listener.accept().await?;
    enable_keepalive(&stream, keepalive);
    Ok(Connection::new(stream, peer_addr))
}

/// Connect to a remote host and tune the socket
pub async fn connect(
    host: &str,
    port: u16,
    keepalive: &KeepaliveConfig,
) -> io::Result<Connection> {
    let stream = TcpStream::connect((host, port)).await?;
    let peer_addr = stream.peer_addr()?;
    enable_keepalive(&stream, keepalive);
    Ok(Connection::new(stream, peer_addr))
}

#[cfg(unix)]
fn enable_keepalive(stream: &TcpStream, config: &KeepaliveConfig) {
    use std::os::fd::AsRawFd;

    let fd = stream.as_raw_fd();
    unsafe {
        let on: libc::c_int = 1;
        let _ = libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            &on as *const _ as *const libc::c_void,
            std::mem::size_of_val(&on) as libc::socklen_t,
        );

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let idle: libc::c_int = config.idle.as_secs() as libc::c_int;
            let interval: libc::c_int = config.interval.as_secs() as libc::c_int;
            let count: libc::c_int = config.max_fails as libc::c_int;
            let _ = libc::setsockopt(
                fd,
                libc::IPPROTO_TCP,
                libc::TCP_KEEPIDLE,
                &idle as *const _ as *const libc::c_void,
                std::mem::size_of_val(&idle) as libc::socklen_t,
            );
            let _ = libc::setsockopt(
                fd,
                libc::IPPROTO_TCP,
                libc::TCP_KEEPINTVL,
                &interval as *const _ as *const libc::c_void,
                std::mem::size_of_val(&interval) as libc::socklen_t,
            );
            let _ = libc::setsockopt(
                fd,
                libc::IPPROTO_TCP,
                libc::TCP_KEEPCNT,
                &count as *const _ as *const libc::c_void,
                std::mem::size_of_val(&count) as libc::socklen_t,
            );
        }

        #[cfg(target_os = "macos")]
        {
            let idle: libc::c_int = config.idle.as_secs() as libc::c_int;
            let _ = libc::setsockopt(
                fd,
                libc::IPPROTO_TCP,
                libc::TCP_KEEPALIVE,
                &idle as *const _ as *const libc::c_void,
                std::mem::size_of_val(&idle) as libc::socklen_t,
            );
        }
    }
}

#[cfg(not(unix))]
fn enable_keepalive(_stream: &TcpStream, _config: &KeepaliveConfig) {}
