//! Shared writer handles and reverse-order teardown

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// A resource that must be finalized exactly once
pub trait Close: Send {
    /// Finalize the resource, writing any trailer it owes to its sink
    fn close(&mut self) -> io::Result<()>;
}

impl<W: Write + Send> Close for flate2::write::GzEncoder<W> {
    fn close(&mut self) -> io::Result<()> {
        self.try_finish()
    }
}

/// Writer handle shared between the encoder stack and the closer chain
///
/// Each layer of an archive pipeline is held once by the layer above it (as
/// its sink) and once by the [`CloserChain`], so teardown can reach every
/// layer without unwinding the stack.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    /// Wrap a value in a new shared handle
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Lock the underlying value
    pub fn lock(&self) -> io::Result<MutexGuard<'_, T>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("archive writer lock poisoned"))
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Write> Write for Shared<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl<T: Close> Close for Shared<T> {
    fn close(&mut self) -> io::Result<()> {
        self.lock()?.close()
    }
}

/// Ordered list of acquired closers, torn down in reverse
///
/// Closers are pushed in acquisition order (innermost sink first). `close`
/// pops them from the back, stops at the first failure and returns it.
/// Closers not yet reached when a failure occurs are released without being
/// closed, so a second `close` is a no-op.
#[derive(Default)]
pub struct CloserChain {
    closers: Vec<Box<dyn Close>>,
}

impl CloserChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly acquired resource
    pub fn push(&mut self, closer: impl Close + 'static) {
        self.closers.push(Box::new(closer));
    }

    /// Number of resources not yet closed
    pub fn len(&self) -> usize {
        self.closers.len()
    }

    /// Whether every resource has been released
    pub fn is_empty(&self) -> bool {
        self.closers.is_empty()
    }

    /// Close all resources in reverse acquisition order
    pub fn close(&mut self) -> io::Result<()> {
        while let Some(mut closer) = self.closers.pop() {
            if let Err(e) = closer.close() {
                self.closers.clear();
                return Err(e);
            }
        }
        Ok(())
    }
}
