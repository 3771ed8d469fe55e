use std::io::{self, Write};

/// Something that can stream an outbound request body into a sink.
pub trait BodyProducer: Send + Sync {
    /// Declared media type, e.g. `image/png`.
    fn content_type(&self) -> Option<&str>;

    /// Declared length in bytes; `None` when unknown ahead of time.
    fn content_length(&self) -> Option<u64>;

    /// Write the full body into `sink`.
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()>;
}

/// Observer for outbound progress. Called synchronously on the writing thread.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, bytes_written: u64, content_length: Option<u64>);
}

impl<F> ProgressListener for F
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    fn on_progress(&self, bytes_written: u64, content_length: Option<u64>) {
        self(bytes_written, content_length)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn closures_are_listeners() {
        let seen = Mutex::new(Vec::new());
        let listener = |written: u64, total: Option<u64>| {
            seen.lock().expect("lock").push((written, total));
        };

        listener.on_progress(3, Some(10));
        listener.on_progress(10, Some(10));

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![(3, Some(10)), (10, Some(10))]
        );
    }
}
