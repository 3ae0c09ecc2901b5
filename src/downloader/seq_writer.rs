//! Offset-addressed writes into a sequential archive
//!
//! Object store download clients hand out data as `(bytes, offset)` pairs so
//! they can fetch parts concurrently. An archive entry can only be appended
//! to. [`SeqWriterAt`] accepts offset writes but refuses any write whose
//! offset is not exactly the number of bytes accepted so far, which holds as
//! long as the client runs with a concurrency of one.

use crate::archive::ArchiveWriter;
use async_trait::async_trait;
use std::io;
use thiserror::Error;

/// Destination for offset-addressed writes
#[async_trait]
pub trait WriterAt: Send {
    /// Write `buf` at `offset`, returning how many bytes were accepted
    async fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

/// A write arrived out of order
#[derive(Debug, Error, PartialEq, Eq)]
#[error(
    "only supporting sequential writes, writing at offset {offset} while {written} bytes have been written"
)]
pub struct OrderingViolation {
    /// Offset the caller asked for
    pub offset: u64,
    /// Bytes accepted so far
    pub written: u64,
}

/// [`WriterAt`] that forwards strictly sequential writes to an archive entry
pub struct SeqWriterAt<'a> {
    next: &'a mut dyn ArchiveWriter,
    written: u64,
}

impl<'a> SeqWriterAt<'a> {
    /// Start a new sequence at offset zero
    pub fn new(next: &'a mut dyn ArchiveWriter) -> Self {
        Self { next, written: 0 }
    }

    /// Bytes accepted so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl<'a> WriterAt for SeqWriterAt<'a> {
    async fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        if offset != self.written {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                OrderingViolation {
                    offset,
                    written: self.written,
                },
            ));
        }

        let n = self.next.write(buf).await?;
        self.written += n as u64;
        Ok(n)
    }
}
