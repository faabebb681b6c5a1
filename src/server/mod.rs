use anyhow::Result;
use chrono::Local;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::network::{self, Connection, ConnectionError, KeepaliveConfig};
use crate::protocol::{decode_size, Command, Request, Status};
use crate::session::{Direction, SessionTracker, TransferSession};
use crate::storage::{self, ResolveError, RootDir};
use crate::transfer::{self, FileChunker, FileWriter};

/// Server configuration assembled by the CLI layer
pub struct ServerConfig {
    pub ip: IpAddr,
    pub port: u16,
    pub root: PathBuf,
    pub keepalive: KeepaliveConfig,
}

/// Whether the connection loop keeps serving after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Continue,
    Terminate,
}

/// Accept clients one at a time and serve each to completion. Session
/// state survives reconnects from the same peer address, which is what
/// makes interrupted transfers resumable.
pub async fn run(config: ServerConfig) -> Result<()> {
    let root = RootDir::open(&config.root)?;
    let listener = network::bind(SocketAddr::new(config.ip, config.port))?;
    info!(
        "listening on {}:{}, serving {}",
        config.ip,
        config.port,
        root.base().display()
    );

    let mut sessions = SessionTracker::default();
    loop {
        let mut conn = network::accept(&listener, &config.keepalive).await?;
        let peer = conn.peer_addr();
        info!(%peer, "client connected");

        let session = sessions.session_for(peer.ip());
        match serve_connection(&mut conn, &root, session).await {
            Ok(()) => info!(%peer, "client disconnected"),
            Err(err) => warn!(%peer, "connection ended: {:#}", err),
        }
    }
}

/// One client's command loop: frame in, dispatch, frames out
async fn serve_connection(
    conn: &mut Connection,
    root: &RootDir,
    session: &mut TransferSession,
) -> Result<()> {
    loop {
        let payload = match conn.receive().await {
            Ok(payload) => payload,
            // Hanging up between commands is a normal goodbye
            Err(ConnectionError::Closed) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let line = String::from_utf8_lossy(&payload).into_owned();
        let request = Request::parse(&line);
        debug!(command = %request.token, arg = %request.arg, "dispatch");

        match dispatch(conn, root, session, &request).await? {
            Disposition::Continue => {}
            Disposition::Terminate => return Ok(()),
        }
    }
}

async fn dispatch(
    conn: &mut Connection,
    root: &RootDir,
    session: &mut TransferSession,
    request: &Request,
) -> Result<Disposition> {
    match request.command() {
        Some(Command::Echo) => {
            conn.send(request.arg.as_bytes()).await?;
        }
        Some(Command::Time) => {
            let now = Local::now().format("%H:%M:%S").to_string();
            conn.send(now.as_bytes()).await?;
        }
        Some(Command::Exit) => {
            conn.send(b"Bye!").await?;
            return Ok(Disposition::Terminate);
        }
        Some(Command::Download) => {
            download(conn, root, session, &request.arg).await?;
        }
        Some(Command::Upload) => {
            upload(conn, root, session, &request.arg).await?;
        }
        // The reply to an unknown command is plain text, not a status
        // envelope
        None => {
            let reply = format!("Unknown command: {}", request.token);
            conn.send(reply.as_bytes()).await?;
        }
    }
    Ok(Disposition::Continue)
}

/// Serve a file to the client. A repeat request for the file the
/// session already has in flight becomes a resume: the client reports
/// how much it holds and only the tail is streamed.
async fn download(
    conn: &mut Connection,
    root: &RootDir,
    session: &mut TransferSession,
    arg: &str,
) -> Result<()> {
    let path = match root.resolve(arg) {
        Ok(path) => path,
        Err(ResolveError::AccessDenied) => {
            let status = Status::Err { message: "Access denied.".to_string() };
            conn.send(&status.to_bytes()).await?;
            return Ok(());
        }
        Err(ResolveError::Io(err)) => {
            // No path details go over the wire
            warn!("resolve failed for {:?}: {}", arg, err);
            let status = Status::Err { message: "Access denied.".to_string() };
            conn.send(&status.to_bytes()).await?;
            return Ok(());
        }
    };

    if !path.is_file() {
        let status = Status::Err {
            message: format!("File '{}' not found.", arg),
        };
        conn.send(&status.to_bytes()).await?;
        return Ok(());
    }

    let total = fs::metadata(&path)?.len();
    let resume = session.is_resume(Direction::Download, &path);
    session.record(Direction::Download, path.clone());

    let offset = if resume {
        conn.send(&Status::Append { size: total }.to_bytes()).await?;
        // The client owns the partial copy, so it reports the offset
        decode_size(&conn.receive().await?)?.min(total)
    } else {
        conn.send(&Status::Ok { size: total }.to_bytes()).await?;
        0
    };

    info!(file = %path.display(), total, offset, "download");
    let mut chunker = FileChunker::open(&path, offset)?;
    transfer::send_chunks(conn, &mut chunker, |_| {}).await?;
    debug!(sent = total - offset, "download complete");
    Ok(())
}

/// Receive a file from the client. The destination is always a bare
/// filename inside the root; the server owns the partial file, so on a
/// resume it reports its own size and the client seeks past it.
async fn upload(
    conn: &mut Connection,
    root: &RootDir,
    session: &mut TransferSession,
    arg: &str,
) -> Result<()> {
    // The size frame follows the command unconditionally; consume it
    // before any reply so the stream stays aligned
    let total = decode_size(&conn.receive().await?)?;

    let name = match storage::bare_name(arg) {
        Some(name) => name,
        None => {
            let status = Status::Err {
                message: format!("Invalid upload name '{}'.", arg),
            };
            conn.send(&status.to_bytes()).await?;
            return Ok(());
        }
    };

    let dest = root.base().join(&name);
    let resume = session.is_resume(Direction::Upload, Path::new(&name));
    session.record(Direction::Upload, PathBuf::from(&name));

    // A vanished or overgrown partial file restarts from scratch
    let partial = if resume {
        match fs::metadata(&dest) {
            Ok(meta) if meta.len() <= total => Some(meta.len()),
            _ => None,
        }
    } else {
        None
    };

    let mut writer = match partial {
        Some(have) => {
            conn.send(&Status::Append { size: have }.to_bytes()).await?;
            FileWriter::append(&dest, total)?
        }
        None => {
            conn.send(&Status::Ok { size: total }.to_bytes()).await?;
            FileWriter::create(&dest, total)?
        }
    };

    info!(file = %dest.display(), total, offset = writer.position(), "upload");
    transfer::receive_chunks(conn, &mut writer, |_| {}).await?;
    writer.finish()?;
    debug!("upload complete");
    Ok(())
}
