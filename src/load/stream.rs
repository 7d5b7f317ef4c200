//! Input stream resolution.
//!
//! Opens a mapping file and transparently decodes gzip when the file name
//! ends in `.gz`. Both failure modes here are setup errors: nothing has been
//! written to the store yet when they surface.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Read buffer for the decoded stream.
const READ_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid compressed stream in {path}: {source}")]
    Decompression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Pick the decoder from the file name suffix.
    pub fn detect(path: &Path) -> Self {
        let is_gzip = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_ascii_lowercase().ends_with(".gz"))
            .unwrap_or(false);

        if is_gzip {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// Decoded, buffered view of an input file.
pub struct InputStream {
    inner: Box<dyn BufRead + Send>,
    compression: Compression,
}

impl InputStream {
    /// Wrap an already-open reader, e.g. an in-memory buffer.
    pub fn from_reader(reader: impl Read + Send + 'static, compression: Compression) -> Self {
        let inner: Box<dyn BufRead + Send> = match compression {
            Compression::Gzip => Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiGzDecoder::new(BufReader::new(reader)),
            )),
            Compression::None => Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader)),
        };

        Self {
            inner,
            compression,
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for InputStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// Open `path` for reading, decoding gzip if the name ends in `.gz`.
///
/// For compressed input the first block is decoded eagerly so that a bad
/// header fails here rather than in the middle of the load.
pub fn open_input(path: impl AsRef<Path>) -> Result<InputStream, StreamError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| StreamError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let compression = Compression::detect(path);
    let mut stream = InputStream::from_reader(file, compression);

    if compression == Compression::Gzip {
        stream
            .fill_buf()
            .map_err(|source| StreamError::Decompression {
                path: path.to_path_buf(),
                source,
            })?;
    }

    log::debug!("opened {} ({:?})", path.display(), compression);
    Ok(stream)
}
