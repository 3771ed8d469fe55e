use std::io::{self, Write};

/// Write adapter that counts bytes accepted by the inner sink.
///
/// Nothing is buffered: every `write` goes straight to the inner sink, and the
/// count advances by what the inner sink reports as written.
pub struct CountingSink<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    bytes_written: u64,
    on_write: Option<Box<dyn FnMut(u64) + 'a>>,
}

impl<'a, W: Write + ?Sized> CountingSink<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            bytes_written: 0,
            on_write: None,
        }
    }

    /// Invoke `callback` with the running total after every successful write.
    pub fn on_write(mut self, callback: impl FnMut(u64) + 'a) -> Self {
        self.on_write = Some(Box::new(callback));
        self
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write + ?Sized> Write for CountingSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        if let Some(callback) = self.on_write.as_mut() {
            callback(self.bytes_written);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
