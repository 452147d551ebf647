//! Source and destination handles for the external tool.
//!
//! Either side of a command is a file path or a byte stream. Paths are handed
//! to the tool on its command line; streams are wired to the child's stdin
//! (sources) or stdout (destinations) and appear as `-` on the command line.
//!
//! A stream can be read only once. `Source` is moved into whatever consumes
//! it, so reading the same stream twice has to go through [`Source::fork`],
//! which buffers it and hands out two independent readers.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Placeholder the tool reads as "stdin" or "stdout".
const STDIO_PLACEHOLDER: &str = "-";

pub enum Source {
    Path(PathBuf),
    Stream(ByteReader),
}

impl Source {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Source::Stream(Box::new(reader))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Source::Stream(_))
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Source::Path(path) => Some(path),
            Source::Stream(_) => None,
        }
    }

    /// Command-line form: quoted path or `-`.
    pub fn render(&self) -> String {
        match self {
            Source::Path(path) => quote_path(path),
            Source::Stream(_) => STDIO_PLACEHOLDER.to_string(),
        }
    }

    /// Split into two sources that each yield the full content.
    ///
    /// Paths are simply cloned. Streams are drained into memory (at most
    /// `limit` bytes) and each half gets its own cursor over the same buffer.
    pub async fn fork(self, limit: usize) -> Result<(Source, Source)> {
        match self {
            Source::Path(path) => Ok((Source::Path(path.clone()), Source::Path(path))),
            Source::Stream(reader) => {
                let mut buf = Vec::new();
                let read = reader.take(limit as u64 + 1).read_to_end(&mut buf).await?;
                if read > limit {
                    return Err(Error::MaxBufferExceeded { limit });
                }
                let shared: Arc<[u8]> = buf.into();
                Ok((
                    Source::stream(Cursor::new(Arc::clone(&shared))),
                    Source::stream(Cursor::new(shared)),
                ))
            }
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Source::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::path(path)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

pub enum Destination {
    Path(PathBuf),
    Stream(ByteWriter),
}

impl Destination {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Destination::Path(path.into())
    }

    pub fn stream(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Destination::Stream(Box::new(writer))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Destination::Stream(_))
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Destination::Path(path) => Some(path),
            Destination::Stream(_) => None,
        }
    }

    /// Command-line form, optionally prefixed with an explicit codec
    /// (`png:"out.jpg"`, `png:-`).
    pub fn render(&self, format: Option<&str>) -> String {
        let target = match self {
            Destination::Path(path) => quote_path(path),
            Destination::Stream(_) => STDIO_PLACEHOLDER.to_string(),
        };
        match format {
            Some(format) => format!("{format}:{target}"),
            None => target,
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Destination::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&str> for Destination {
    fn from(path: &str) -> Self {
        Destination::path(path)
    }
}

impl From<PathBuf> for Destination {
    fn from(path: PathBuf) -> Self {
        Destination::Path(path)
    }
}

/// Double-quote a path for `sh`.
pub(crate) fn quote_path(path: &Path) -> String {
    quote_arg(&path.to_string_lossy())
}

/// Double-quote a single argument for `sh`.
pub(crate) fn quote_arg(arg: &str) -> String {
    format!("\"{}\"", escape_double_quoted(arg))
}

/// Escape the characters that stay special inside `sh` double quotes.
pub(crate) fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
