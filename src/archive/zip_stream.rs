//! Streaming zip entries

use super::closers::Close;
use std::io::{self, Write};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

/// Zip encoder in streaming mode
///
/// Entries are written with data descriptors, so the sink is never asked to
/// seek. Each header opens a new entry that receives all following writes.
pub struct ZipStream<W: Write> {
    writer: Option<ZipWriter<StreamWriter<W>>>,
    active: Option<ActiveEntry>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ActiveEntry {
    File,
    /// Directory entries hold no data; writes are dropped
    Directory,
}

impl<W: Write> ZipStream<W> {
    /// Start a zip stream over `inner`
    pub fn new(inner: W) -> Self {
        Self {
            writer: Some(ZipWriter::new_stream(inner)),
            active: None,
        }
    }

    /// Open a new entry; a trailing "/" opens a directory entry
    pub fn append_header(&mut self, path: &str, size: u64) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("zip stream already finished"))?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX));

        let active = if path.ends_with('/') {
            writer.add_directory(path, options).map_err(io::Error::other)?;
            ActiveEntry::Directory
        } else {
            writer.start_file(path, options).map_err(io::Error::other)?;
            ActiveEntry::File
        };
        self.active = Some(active);
        Ok(())
    }

    /// Write the central directory
    pub fn finish(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.take() {
            let mut inner = writer.finish().map_err(io::Error::other)?;
            inner.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> Write for ZipStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.active {
            None => {
                tracing::warn!(len = buf.len(), "discarding zip data written before any entry header");
                return Ok(0);
            }
            Some(ActiveEntry::Directory) => {
                tracing::debug!(len = buf.len(), "dropping data listed under a directory entry");
                return Ok(buf.len());
            }
            Some(ActiveEntry::File) => {}
        }
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("zip stream already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write + Send> Close for ZipStream<W> {
    fn close(&mut self) -> io::Result<()> {
        self.finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::closers::Shared;
    use std::io::{Cursor, Read};

    fn finished_bytes(sink: &Shared<Vec<u8>>) -> Vec<u8> {
        sink.lock().unwrap().clone()
    }

    #[test]
    fn entries_round_trip_through_a_zip_reader() {
        let sink = Shared::new(Vec::new());
        let mut stream = ZipStream::new(sink.clone());

        stream.append_header("a.txt", 5).unwrap();
        stream.write_all(b"hello").unwrap();
        stream.append_header("sub/", 0).unwrap();
        stream.append_header("sub/b.bin", 3).unwrap();
        stream.write_all(&[1, 2, 3]).unwrap();
        stream.finish().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(finished_bytes(&sink))).unwrap();
        assert_eq!(archive.len(), 3);

        let mut a = archive.by_name("a.txt").unwrap();
        let mut text = String::new();
        a.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello");
        drop(a);

        assert!(archive.by_name("sub/").unwrap().is_dir());

        let mut b = archive.by_name("sub/b.bin").unwrap();
        let mut data = Vec::new();
        b.read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn write_before_header_reports_zero_bytes() {
        let sink = Shared::new(Vec::new());
        let mut stream = ZipStream::new(sink.clone());

        assert_eq!(stream.write(b"orphan").unwrap(), 0);

        stream.append_header("a.txt", 1).unwrap();
        stream.write_all(b"x").unwrap();
        stream.finish().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(finished_bytes(&sink))).unwrap();
        let mut a = archive.by_name("a.txt").unwrap();
        let mut data = Vec::new();
        a.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"x");
    }

    #[test]
    fn directory_marker_with_data_does_not_break_the_stream() {
        let sink = Shared::new(Vec::new());
        let mut stream = ZipStream::new(sink.clone());

        stream.append_header("dir/", 3).unwrap();
        stream.write_all(b"xyz").unwrap();
        stream.append_header("dir/a.txt", 2).unwrap();
        stream.write_all(b"ok").unwrap();
        stream.finish().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(finished_bytes(&sink))).unwrap();
        assert_eq!(archive.len(), 2);
        assert!(archive.by_name("dir/").unwrap().is_dir());

        let mut a = archive.by_name("dir/a.txt").unwrap();
        let mut data = Vec::new();
        a.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"ok");
    }

    #[test]
    fn finish_is_idempotent_and_blocks_new_entries() {
        let sink = Shared::new(Vec::new());
        let mut stream = ZipStream::new(sink.clone());

        stream.finish().unwrap();
        let len = finished_bytes(&sink).len();
        stream.finish().unwrap();

        assert_eq!(finished_bytes(&sink).len(), len);
        assert!(stream.append_header("late.txt", 1).is_err());
    }
}
