use anyhow::{Context, Result};
use indicatif::HumanBytes;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::network::{self, Connection, KeepaliveConfig};
use crate::progress;
use crate::protocol::{encode_size, Command, Request, Status};
use crate::storage::{self, RootDir};
use crate::transfer::{self, FileChunker, FileWriter};

/// Client configuration assembled by the CLI layer
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub root: PathBuf,
    pub read_timeout: Duration,
    pub keepalive: KeepaliveConfig,
}

/// Connect and run the interactive shell, offering to reconnect after
/// a transport failure
pub async fn run(config: ClientConfig) -> Result<()> {
    let root = RootDir::open(&config.root)?;

    loop {
        let mut conn = network::connect(&config.host, config.port, &config.keepalive)
            .await
            .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
        conn.set_read_timeout(Some(config.read_timeout));
        println!("Connected to {}", conn.peer_addr());

        match shell(&mut conn, &root).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                eprintln!("Error: {:#}", err);
                if !confirm("Reconnect? [y/N] ")? {
                    return Ok(());
                }
            }
        }
    }
}

/// Read-eval loop: most commands are "send line, read one reply";
/// transfers need local file handling on top
async fn shell(conn: &mut Connection, root: &RootDir) -> Result<()> {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            // EOF on stdin ends the shell
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = Request::parse(line);
        let Some(command) = request.command() else {
            println!("ERR: Unknown command: {}", request.token);
            continue;
        };

        match command {
            Command::Upload => upload(conn, &request.arg).await?,
            Command::Download => {
                conn.send(line.as_bytes()).await?;
                download(conn, root, &request.arg).await?;
            }
            Command::Echo | Command::Time | Command::Exit => {
                conn.send(line.as_bytes()).await?;
                let reply = conn.receive().await?;
                println!("{}", String::from_utf8_lossy(&reply));
                if command == Command::Exit {
                    return Ok(());
                }
            }
        }
    }
}

/// Handle the reply to a DOWNLOAD we just sent. On APPEND the server
/// wants to know how much we already hold before streaming the tail.
async fn download(conn: &mut Connection, root: &RootDir, arg: &str) -> Result<()> {
    let status = Status::from_bytes(&conn.receive().await?)?;

    match status {
        Status::Err { message } => {
            println!("{}", message);
            Ok(())
        }
        Status::Ok { size } => {
            let dest = dest_path(root, arg)?;
            let writer = FileWriter::create(&dest, size)?;
            receive_to(conn, writer, &dest).await
        }
        Status::Append { size } => {
            let dest = dest_path(root, arg)?;
            let local = fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
            // A local copy larger than the declared size is not a
            // prefix of this file; restart instead of appending
            let have = if local <= size { local } else { 0 };
            conn.send(&encode_size(have)).await?;

            let writer = if have > 0 {
                FileWriter::append(&dest, size)?
            } else {
                FileWriter::create(&dest, size)?
            };
            receive_to(conn, writer, &dest).await
        }
    }
}

async fn receive_to(conn: &mut Connection, mut writer: FileWriter, dest: &Path) -> Result<()> {
    println!("Downloading...");
    let label = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bar = progress::transfer_bar(&label, writer.total_size(), writer.position());

    let moved = writer.remaining();
    let start = Instant::now();
    transfer::receive_chunks(conn, &mut writer, |position| bar.set_position(position)).await?;
    writer.finish()?;
    bar.finish();

    print_average_speed(start.elapsed(), moved);
    println!("Done");
    Ok(())
}

/// Push a local file to the server. The server replies OK for a fresh
/// transfer or APPEND with its partial size, which becomes our seek
/// offset.
async fn upload(conn: &mut Connection, arg: &str) -> Result<()> {
    let path = PathBuf::from(arg);
    if !path.is_file() {
        println!("ERR: File '{}' not found", arg);
        return Ok(());
    }
    let total = fs::metadata(&path)?.len();

    conn.send(format!("UPLOAD {}", arg).as_bytes()).await?;
    conn.send(&encode_size(total)).await?;

    let offset = match Status::from_bytes(&conn.receive().await?)? {
        Status::Err { message } => {
            println!("{}", message);
            return Ok(());
        }
        Status::Ok { .. } => 0,
        Status::Append { size } => size.min(total),
    };

    println!("Uploading...");
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bar = progress::transfer_bar(&label, total, offset);

    let mut chunker = FileChunker::open(&path, offset)?;
    let start = Instant::now();
    transfer::send_chunks(conn, &mut chunker, |position| bar.set_position(position)).await?;
    bar.finish();

    print_average_speed(start.elapsed(), total - offset);
    println!("Done");
    Ok(())
}

fn dest_path(root: &RootDir, arg: &str) -> Result<PathBuf> {
    let name = storage::bare_name(arg)
        .with_context(|| format!("'{}' holds no usable filename", arg))?;
    Ok(root.base().join(name))
}

fn print_average_speed(elapsed: Duration, bytes: u64) {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        println!(
            "Average speed: {}/s",
            HumanBytes((bytes as f64 / secs) as u64)
        );
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
