//! Output sinks
//!
//! A sink receives raw output chunks exactly as the engine delivers them; it
//! is not line-buffered. Closures `FnMut(&[u8])` are sinks too.

use std::io::Write;
use tracing::{error, info, warn};

/// Single-method output capability
pub trait OutputSink: Send {
    fn write(&mut self, chunk: &[u8]);
}

impl<F> OutputSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn write(&mut self, chunk: &[u8]) {
        self(chunk)
    }
}

/// Which tracing level a `LogSink` emits at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogStream {
    Stdout,
    Stderr,
}

/// Default sink: stdout chunks as `info!`, stderr chunks as `error!`
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    stream: LogStream,
}

impl LogSink {
    pub fn stdout() -> Self {
        Self {
            stream: LogStream::Stdout,
        }
    }

    pub fn stderr() -> Self {
        Self {
            stream: LogStream::Stderr,
        }
    }
}

impl OutputSink for LogSink {
    fn write(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let text = text.trim_end();
        match self.stream {
            LogStream::Stdout => info!("{}", text),
            LogStream::Stderr => error!("{}", text),
        }
    }
}

/// Sink forwarding chunks to an `io::Write` (e.g. the process's stdout)
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> OutputSink for WriterSink<W> {
    fn write(&mut self, chunk: &[u8]) {
        if let Err(e) = self
            .writer
            .write_all(chunk)
            .and_then(|_| self.writer.flush())
        {
            warn!("Failed to write output chunk: {}", e);
        }
    }
}

/// Sink that keeps every chunk in memory
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    chunks: Vec<Vec<u8>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// All chunks concatenated, lossily decoded
    pub fn text(&self) -> String {
        let bytes: Vec<u8> = self.chunks.concat();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text().contains(needle)
    }
}

impl OutputSink for CaptureSink {
    fn write(&mut self, chunk: &[u8]) {
        self.chunks.push(chunk.to_vec());
    }
}
