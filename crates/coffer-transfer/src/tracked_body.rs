use std::{
    io::{self, Write},
    sync::Arc,
};

use coffer_core::transfer::{BodyProducer, ProgressListener};

use crate::CountingSink;

/// Decorates a [`BodyProducer`] with upload progress reporting.
///
/// The content written downstream is exactly what the inner producer writes.
/// Each [`TrackedBody::write_to`] call is its own write session with a fresh
/// byte counter, so re-sending the same body reports progress from zero again.
pub struct TrackedBody<P: BodyProducer> {
    inner: P,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl<P: BodyProducer> TrackedBody<P> {
    pub fn new(inner: P, listener: Option<Arc<dyn ProgressListener>>) -> Self {
        Self { inner, listener }
    }

    /// Wrap `inner` without an observer; bytes are still counted.
    pub fn untracked(inner: P) -> Self {
        Self::new(inner, None)
    }

    pub fn with_listener(inner: P, listener: impl ProgressListener + 'static) -> Self {
        Self::new(inner, Some(Arc::new(listener)))
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Stream the inner body into `sink` and flush. Returns the bytes written.
    pub fn write_session<W: Write + ?Sized>(&self, sink: &mut W) -> io::Result<u64> {
        let mut counting = CountingSink::new(sink);
        if let Some(listener) = self.listener.as_deref() {
            let inner = &self.inner;
            // Length is re-read on every write so lazily known sizes show up.
            counting = counting
                .on_write(move |written| listener.on_progress(written, inner.content_length()));
        }

        self.inner.write_to(&mut counting)?;
        counting.flush()?;
        Ok(counting.bytes_written())
    }
}

impl<P: BodyProducer> BodyProducer for TrackedBody<P> {
    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        self.write_session(sink).map(|_| ())
    }
}
