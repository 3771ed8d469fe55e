use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use coffer_core::transfer::BodyProducer;

/// Chunk size used when streaming bodies into a sink.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// In-memory payload, written in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct BytesBody {
    data: Vec<u8>,
    content_type: Option<String>,
    chunk_size: usize,
}

impl BytesBody {
    pub fn new(data: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.map(str::to_string),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the chunk size; values below one byte are clamped to one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl BodyProducer for BytesBody {
    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        for chunk in self.data.chunks(self.chunk_size) {
            sink.write_all(chunk)?;
        }
        Ok(())
    }
}

/// File streamed from disk. The length is read from metadata when the body is built.
#[derive(Debug, Clone)]
pub struct FileBody {
    path: PathBuf,
    content_type: Option<String>,
    length: u64,
}

impl FileBody {
    pub fn open(path: impl AsRef<Path>, content_type: Option<&str>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let length = std::fs::metadata(&path)?.len();
        Ok(Self {
            path,
            content_type: content_type.map(str::to_string),
            length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

impl BodyProducer for FileBody {
    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        let mut file = File::open(&self.path)?;
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            sink.write_all(&buf[..n])?;
        }
    }
}
