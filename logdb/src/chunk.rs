//! Reverse, line-aligned chunk reading over the data region of a log file.
//!
//! Restoring the newest N records must not load the whole file. The reader
//! walks backwards from the end of the file in chunks that double in size,
//! and every chunk starts at a line boundary so no partial line is ever
//! handed out.
//!
//! ```text
//! floor                                   pos (end of file)
//!   |<-- header -->|  ...  |<- chunk 2 ->|<- chunk 1 ->|
//!                          ^ aligned to the byte after a '\n'
//! ```

use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

/// A line-aligned byte range read from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedChunk {
    /// File offset of the first byte of `bytes`.
    pub start: u64,
    /// Whole lines ending at the requested position.
    pub bytes: Vec<u8>,
}

/// Reads at most `size` bytes ending before `pos`, never below `floor`, and
/// drops the leading partial line.
///
/// When the window starts above `floor` and holds no line break, the chunk
/// is empty and `start == pos`; the caller retries with a larger size.
///
/// # Errors
///
/// Returns the underlying I/O error if seeking or reading fails.
pub fn read_aligned_before<R: Read + Seek>(
    reader: &mut R,
    floor: u64,
    pos: u64,
    size: u64,
) -> io::Result<AlignedChunk> {
    let start = pos.saturating_sub(size).max(floor);
    if start >= pos {
        return Ok(AlignedChunk { start: pos, bytes: Vec::new() });
    }

    let len = usize::try_from(pos - start)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk exceeds address space"))?;
    let mut bytes = vec![0u8; len];
    reader.seek(SeekFrom::Start(start))?;
    reader.read_exact(&mut bytes)?;

    if start == floor {
        return Ok(AlignedChunk { start, bytes });
    }

    match bytes.iter().position(|&b| b == b'\n') {
        Some(newline) => {
            bytes.drain(..=newline);
            Ok(AlignedChunk {
                start: start + newline as u64 + 1,
                bytes,
            })
        }
        None => Ok(AlignedChunk { start: pos, bytes: Vec::new() }),
    }
}

/// Cursor walking a byte range backwards in geometrically growing chunks.
#[derive(Debug)]
pub struct ReverseChunkReader<R> {
    reader: R,
    floor: u64,
    pos: u64,
    chunk_size: u64,
}

impl<R: Read + Seek> ReverseChunkReader<R> {
    /// Creates a reader over `[floor, end)` whose first chunk is
    /// `initial_chunk_size` bytes.
    pub fn new(reader: R, floor: u64, end: u64, initial_chunk_size: usize) -> Self {
        Self {
            reader,
            floor,
            pos: end.max(floor),
            chunk_size: (initial_chunk_size as u64).max(1),
        }
    }

    /// Offset of the first byte not yet handed out.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Size of the next read window.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Returns `true` once the whole range has been read.
    pub fn is_exhausted(&self) -> bool {
        self.pos <= self.floor
    }

    /// Returns the next older chunk of whole lines, or `None` at the floor.
    ///
    /// The window doubles after every read, including reads that found no
    /// complete line.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if seeking or reading fails.
    pub fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        while !self.is_exhausted() {
            let chunk = read_aligned_before(&mut self.reader, self.floor, self.pos, self.chunk_size)?;
            self.chunk_size = self.chunk_size.saturating_mul(2);

            if chunk.bytes.is_empty() {
                continue;
            }

            debug!(
                start = chunk.start,
                len = chunk.bytes.len(),
                "read restore chunk"
            );
            self.pos = chunk.start;
            return Ok(Some(chunk.bytes));
        }
        Ok(None)
    }
}
