//! Archive writers
//!
//! An [`ArchiveWriter`] turns a sequence of `(header, data...)` calls into a
//! tar+gzip or zip byte stream written to an async sink. The encoders
//! themselves are synchronous; they write through a [`DelayWriter`] into an
//! in-memory [`Spool`] that is drained into the async sink after every call,
//! so at most one call's worth of encoded output is ever held in memory.
//!
//! Layers are acquired innermost first and recorded in a [`CloserChain`];
//! closing the writer tears them down outermost first.

pub mod closers;
pub mod delay;
pub mod tar_stream;
pub mod zip_stream;

use crate::config::ArchiveConfig;
use crate::types::ArchiveFormat;
use async_trait::async_trait;
use closers::{CloserChain, Shared};
use delay::DelayWriter;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tar_stream::TarStream;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use zip_stream::ZipStream;

/// Format-agnostic archive sink with entry framing
#[async_trait]
pub trait ArchiveWriter: Send {
    /// Declare the next entry; a trailing "/" marks a directory
    async fn write_header(&mut self, path: &str, size: u64) -> io::Result<()>;

    /// Append bytes to the current entry
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Write trailers, release every encoder and flush the output
    async fn close(&mut self) -> io::Result<()>;
}

/// In-memory byte queue between the sync encoders and the async output
#[derive(Clone, Default)]
pub struct Spool(Arc<Mutex<Vec<u8>>>);

impl Spool {
    /// Take everything queued so far
    pub fn take(&self) -> io::Result<Vec<u8>> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("spool lock poisoned"))?;
        Ok(std::mem::take(&mut *buf))
    }
}

impl Write for Spool {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("spool lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

type DelaySink = Shared<DelayWriter<Spool>>;
type GzSink = Shared<GzEncoder<DelaySink>>;

enum Entries {
    TarGz(Shared<TarStream<GzSink>>),
    Zip(Shared<ZipStream<DelaySink>>),
}

impl Entries {
    fn write_header(&self, path: &str, size: u64) -> io::Result<()> {
        match self {
            Entries::TarGz(tar) => tar.lock()?.append_header(path, size),
            Entries::Zip(zip) => zip.lock()?.append_header(path, size),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Entries::TarGz(tar) => tar.lock()?.write(buf),
            Entries::Zip(zip) => zip.lock()?.write(buf),
        }
    }
}

/// Archive writer bound to an async output
pub struct ArchivePipeline<O> {
    entries: Entries,
    closers: CloserChain,
    spool: Spool,
    out: O,
    closed: bool,
}

/// Build the encoder stack for `format` on top of `out`
pub fn build_writer_pipeline<O>(
    out: O,
    format: ArchiveFormat,
    config: &ArchiveConfig,
) -> ArchivePipeline<O>
where
    O: AsyncWrite + Unpin + Send,
{
    let spool = Spool::default();
    let mut closers = CloserChain::new();

    let delay = Shared::new(DelayWriter::new(spool.clone(), config.delay_bytes));
    closers.push(delay.clone());

    let entries = match format {
        ArchiveFormat::TarGz => {
            let gz = Shared::new(GzEncoder::new(delay, Compression::new(config.gzip_level)));
            closers.push(gz.clone());
            let tar = Shared::new(TarStream::new(gz));
            closers.push(tar.clone());
            Entries::TarGz(tar)
        }
        ArchiveFormat::Zip => {
            let zip = Shared::new(ZipStream::new(delay));
            closers.push(zip.clone());
            Entries::Zip(zip)
        }
    };

    ArchivePipeline {
        entries,
        closers,
        spool,
        out,
        closed: false,
    }
}

impl<O> ArchivePipeline<O>
where
    O: AsyncWrite + Unpin + Send,
{
    /// Move encoded bytes from the spool to the output
    async fn pump(&mut self) -> io::Result<()> {
        let chunk = self.spool.take()?;
        if !chunk.is_empty() {
            self.out.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Recover the output once the pipeline is no longer needed
    pub fn into_inner(self) -> O {
        self.out
    }
}

#[async_trait]
impl<O> ArchiveWriter for ArchivePipeline<O>
where
    O: AsyncWrite + Unpin + Send,
{
    async fn write_header(&mut self, path: &str, size: u64) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("archive writer already closed"));
        }
        self.entries.write_header(path, size)?;
        self.pump().await
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("archive writer already closed"));
        }
        let n = self.entries.write(buf)?;
        self.pump().await?;
        Ok(n)
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let teardown = self.closers.close();
        let pumped = self.pump().await;
        let flushed = self.out.flush().await;
        teardown.and(pumped).and(flushed)
    }
}
