use anyhow::{bail, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::network::Connection;
use crate::protocol::CHUNK_SIZE;

/// Reads a file as a sequence of wire-sized chunks, starting at a byte
/// offset for resumed transfers. Completion is counter-driven: exactly
/// `total_size - offset` bytes come out, never more.
pub struct FileChunker {
    file: File,
    total_size: u64,
    position: u64,
}

impl FileChunker {
    /// Open for streaming, positioned `offset` bytes in
    pub fn open(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let total_size = file.metadata()?.len();
        let position = offset.min(total_size);
        file.seek(SeekFrom::Start(position))?;

        Ok(Self {
            file,
            total_size,
            position,
        })
    }

    /// Read the next chunk, `None` once the declared size is reached.
    /// A file shrinking mid-stream surfaces as an error rather than a
    /// silently short stream.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let remaining = self.total_size - self.position;
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let mut buffer = vec![0u8; want];
        self.file.read_exact(&mut buffer)?;
        self.position += want as u64;
        Ok(Some(buffer))
    }

    /// Current byte position within the file
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

/// Writes received chunks, either into a fresh file or appended to the
/// partial file left by an interrupted transfer
pub struct FileWriter {
    file: File,
    total_size: u64,
    position: u64,
}

impl FileWriter {
    /// Start a fresh file, truncating anything already there
    pub fn create(path: &Path, total_size: u64) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file,
            total_size,
            position: 0,
        })
    }

    /// Continue a partial file, positioned at its current end
    pub fn append(path: &Path, total_size: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let position = file.metadata()?.len().min(total_size);
        Ok(Self {
            file,
            total_size,
            position,
        })
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// Bytes still expected before the declared size is reached
    pub fn remaining(&self) -> u64 {
        self.total_size - self.position
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Flush the finished file to disk
    pub fn finish(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Stream every remaining chunk over the connection, one frame each,
/// reporting the running byte position after each frame
pub async fn send_chunks<F>(
    conn: &mut Connection,
    chunker: &mut FileChunker,
    mut on_progress: F,
) -> Result<()>
where
    F: FnMut(u64),
{
    while let Some(chunk) = chunker.next_chunk()? {
        conn.send(&chunk).await?;
        on_progress(chunker.position());
    }
    Ok(())
}

/// Drain chunk frames into the writer until the declared size is
/// reached. There is no end-of-transfer marker; the byte counter is the
/// only terminator.
pub async fn receive_chunks<F>(
    conn: &mut Connection,
    writer: &mut FileWriter,
    mut on_progress: F,
) -> Result<()>
where
    F: FnMut(u64),
{
    while writer.remaining() > 0 {
        let chunk = conn.receive().await?;
        if chunk.len() as u64 > writer.remaining() {
            bail!(
                "peer sent {} bytes past the declared size",
                chunk.len() as u64 - writer.remaining()
            );
        }
        writer.write_chunk(&chunk)?;
        on_progress(writer.position());
    }
    Ok(())
}
