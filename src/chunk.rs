//! Chunked Reader
//!
//! Serves fixed-size chunks from a byte source. Every read happens under one
//! mutex, so concurrent callers each receive a disjoint range and ranges are
//! handed out in increasing order with no gaps. The upload worker pool uses
//! this as its work queue.

use crate::types::ByteRange;
use parking_lot::Mutex;
use std::io::{self, ErrorKind, Read};

/// A chunk read from a fixed offset of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    offset: u64,
    data: Vec<u8>,
}

impl Chunk {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// An empty chunk marks end-of-stream.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte range covered by this chunk, `None` for end-of-stream.
    pub fn range(&self) -> Option<ByteRange> {
        if self.data.is_empty() {
            None
        } else {
            Some(ByteRange::from_offset(self.offset, self.data.len() as u64))
        }
    }
}

struct ReaderState<R> {
    source: R,
    position: u64,
}

/// Thread-safe sequential chunk reader.
pub struct ChunkReader<R> {
    state: Mutex<ReaderState<R>>,
    chunk_size: usize,
}

impl<R: Read> ChunkReader<R> {
    /// Wrap `source`, serving chunks of `chunk_size` bytes.
    pub fn new(source: R, chunk_size: usize) -> io::Result<Self> {
        if chunk_size == 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "chunk size must be greater than zero",
            ));
        }
        Ok(Self {
            state: Mutex::new(ReaderState {
                source,
                position: 0,
            }),
            chunk_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    /// Read the next chunk. Returns an empty chunk at end-of-stream.
    ///
    /// The buffer is filled across short reads, so every chunk except the
    /// last is exactly `chunk_size` bytes.
    pub fn read_chunk(&self) -> io::Result<Chunk> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut state = self.state.lock();
        let offset = state.position;

        let mut filled = 0;
        while filled < buf.len() {
            match state.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        state.position += filled as u64;
        drop(state);

        buf.truncate(filled);
        Ok(Chunk { offset, data: buf })
    }

    /// Consume the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.state.into_inner().source
    }
}
