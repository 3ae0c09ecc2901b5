//! Streaming tar framing
//!
//! `tar::Builder` wants each entry's data as a reader up front. Checkpoint
//! objects arrive as a sequence of ranged parts, so entries are framed here
//! by hand: a header, exactly `size` bytes of data, then padding to the next
//! 512-byte block.

use super::closers::Close;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

const BLOCK_SIZE: u64 = 512;
const NAME_FIELD_LEN: usize = 100;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";

/// File mode for regular entries
pub const FILE_MODE: u32 = 0o666;

/// File mode for directory entries
pub const DIR_MODE: u32 = 0o777;

/// Tar encoder that accepts entry data incrementally
pub struct TarStream<W: Write> {
    inner: W,
    current: Option<String>,
    remaining: u64,
    padding: u64,
    finished: bool,
}

impl<W: Write> TarStream<W> {
    /// Start a tar stream over `inner`
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            current: None,
            remaining: 0,
            padding: 0,
            finished: false,
        }
    }

    /// Begin a new entry; a trailing "/" marks a directory
    pub fn append_header(&mut self, path: &str, size: u64) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::other("tar stream already finished"));
        }
        self.end_entry()?;

        let (mode, entry_type) = if path.ends_with('/') {
            (DIR_MODE, tar::EntryType::Directory)
        } else {
            (FILE_MODE, tar::EntryType::Regular)
        };

        let name = path.as_bytes();
        if name.len() > NAME_FIELD_LEN {
            self.write_long_name(name)?;
        }

        let mut header = new_header(entry_type, size, mode);
        let field = &mut header.as_old_mut().name;
        let n = name.len().min(NAME_FIELD_LEN);
        field[..n].copy_from_slice(&name[..n]);
        header.set_cksum();
        self.inner.write_all(header.as_bytes())?;

        self.current = Some(path.to_string());
        self.remaining = size;
        self.padding = padding_for(size);
        Ok(())
    }

    /// Write the two zero blocks that end the archive
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.end_entry()?;
        self.inner.write_all(&[0u8; 2 * BLOCK_SIZE as usize])?;
        self.finished = true;
        Ok(())
    }

    /// GNU long-name record carrying the full path of the following entry
    fn write_long_name(&mut self, name: &[u8]) -> io::Result<()> {
        let size = name.len() as u64 + 1;
        let mut header = new_header(tar::EntryType::GNULongName, size, 0o644);
        header.as_old_mut().name[..LONG_LINK_NAME.len()].copy_from_slice(LONG_LINK_NAME);
        header.set_mtime(0);
        header.set_cksum();

        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(name)?;
        self.inner.write_all(&[0])?;
        self.write_padding(padding_for(size))
    }

    fn end_entry(&mut self) -> io::Result<()> {
        if let Some(path) = &self.current {
            if self.remaining > 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("missed writing {} bytes of {}", self.remaining, path),
                ));
            }
            let padding = self.padding;
            self.current = None;
            self.padding = 0;
            self.write_padding(padding)?;
        }
        Ok(())
    }

    fn write_padding(&mut self, padding: u64) -> io::Result<()> {
        const ZEROS: [u8; BLOCK_SIZE as usize] = [0u8; BLOCK_SIZE as usize];
        self.inner.write_all(&ZEROS[..padding as usize])
    }
}

impl<W: Write> Write for TarStream<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(path) = &self.current else {
            return Err(io::Error::other("write before any tar header"));
        };
        if data.len() as u64 > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write of {} bytes exceeds the {} bytes left in {}",
                    data.len(),
                    self.remaining,
                    path
                ),
            ));
        }

        self.inner.write_all(data)?;
        self.remaining -= data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Close for TarStream<W> {
    fn close(&mut self) -> io::Result<()> {
        self.finish()
    }
}

fn new_header(entry_type: tar::EntryType, size: u64, mode: u32) -> tar::Header {
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(mtime);
    header
}

fn padding_for(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}
