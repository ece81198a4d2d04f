//! Stream handles handed to each invocation, plus in-memory adapters.

use std::io::{Cursor, Read, Result as IoResult, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Readable input of a stage.
pub type Input<'a> = Box<dyn Read + Send + 'a>;

/// Writable output or error stream of a stage.
pub type Output<'a> = Box<dyn Write + Send + 'a>;

/// The (input, output, error) triple a stage runs against.
///
/// Dropping the triple closes whatever is behind it, which is how a pipeline
/// stage signals EOF downstream and broken pipe upstream once it finishes.
pub struct Streams<'a> {
    pub input: Input<'a>,
    pub output: Output<'a>,
    pub error: Output<'a>,
}

impl<'a> Streams<'a> {
    pub fn new(
        input: impl Read + Send + 'a,
        output: impl Write + Send + 'a,
        error: impl Write + Send + 'a,
    ) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            error: Box::new(error),
        }
    }

    /// Streams bound to the process's stdin, stdout and stderr.
    pub fn inherit() -> Streams<'static> {
        Streams::new(std::io::stdin(), std::io::stdout(), std::io::stderr())
    }
}

/// Writer that lets several stages share one underlying stream.
///
/// Each `write` call takes the lock, so lines written with a single call
/// are not interleaved.
pub(crate) struct SharedWriter<'s, 'a> {
    inner: &'s Mutex<Output<'a>>,
}

impl<'s, 'a> SharedWriter<'s, 'a> {
    pub(crate) fn new(inner: &'s Mutex<Output<'a>>) -> Self {
        Self { inner }
    }
}

impl Write for SharedWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Memory-backed reader.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

/// Memory-backed writer for capturing output.
///
/// Clones share the same buffer, so one clone can be handed to a stage
/// (possibly on another thread) while the other inspects what was written.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
