//! In-memory, rewindable byte sink used as the destination of an extraction that is uploaded
//! rather than written to disk.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A growable buffer with a single cursor. It is filled by the reducer (which may seek back to
/// patch headers), then rewound and read twice: once for hashing and once for transmission.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    inner: Cursor<Vec<u8>>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far, independent of the cursor position.
    pub fn len(&self) -> u64 {
        self.inner.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    /// Move the cursor back to the first byte.
    pub fn rewind_to_start(&mut self) {
        self.inner.set_position(0);
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl From<Vec<u8>> for ScratchBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }
}

impl Read for ScratchBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for ScratchBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ScratchBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
