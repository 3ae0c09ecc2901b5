//! Write-through buffer that withholds the first bytes of output
//!
//! The HTTP status line is committed together with the first body byte. By
//! holding back the first `threshold` bytes of archive output, failures that
//! happen early (listing the first page, fetching the first object) can still
//! be reported as a proper error response instead of a truncated archive.

use super::closers::Close;
use std::io::{self, Write};

/// Buffers writes until `threshold` bytes have accumulated, then passes through
pub struct DelayWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    threshold: usize,
    passthrough: bool,
}

impl<W: Write> DelayWriter<W> {
    /// Wrap `inner`, withholding the first `threshold` bytes
    pub fn new(inner: W, threshold: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            threshold,
            passthrough: false,
        }
    }

    /// Bytes currently withheld
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the threshold has been reached and writes go straight through
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Release any withheld bytes in a single write and switch to passthrough
    fn release(&mut self) -> io::Result<()> {
        self.passthrough = true;
        if !self.buf.is_empty() {
            let buf = std::mem::take(&mut self.buf);
            self.inner.write_all(&buf)?;
        }
        Ok(())
    }
}

impl<W: Write> Write for DelayWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.passthrough {
            return self.inner.write(data);
        }

        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.threshold {
            self.release()?;
        }
        Ok(data.len())
    }

    // Withheld bytes stay withheld until the threshold or close.
    fn flush(&mut self) -> io::Result<()> {
        if self.passthrough {
            self.inner.flush()
        } else {
            Ok(())
        }
    }
}

impl<W: Write + Send> Close for DelayWriter<W> {
    fn close(&mut self) -> io::Result<()> {
        self.release()?;
        self.inner.flush()
    }
}
