use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use crate::error::{ControllerError, Result};

/// A raw media file read as fixed-size frames, looping forever.
///
/// A read that cannot fill a whole frame, including a clean end of file,
/// rewinds to the start and yields nothing for that call. Partial frames are
/// never returned.
pub struct LoopingSource<R> {
    reader: R,
    frame_size: usize,
    buf: Vec<u8>,
    rewinds: u64,
}

impl LoopingSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, frame_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ControllerError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if frame_size > 0 && len % frame_size as u64 != 0 {
            tracing::warn!(
                path = %path.display(),
                len,
                frame_size,
                "file length is not a whole number of frames; the tail will be skipped"
            );
        }
        Ok(Self::new(
            BufReader::with_capacity(frame_size.max(8 * 1024), file),
            frame_size,
        ))
    }
}

impl<R: Read + Seek> LoopingSource<R> {
    pub fn new(reader: R, frame_size: usize) -> Self {
        Self {
            reader,
            frame_size,
            buf: vec![0; frame_size],
            rewinds: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Times the source has wrapped back to its start.
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }

    /// Read the next whole frame, or rewind and return `None`.
    pub fn next_frame(&mut self) -> std::io::Result<Option<Bytes>> {
        let mut filled = 0;
        while filled < self.frame_size {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        if filled == self.frame_size && filled > 0 {
            return Ok(Some(Bytes::copy_from_slice(&self.buf)));
        }

        self.reader.seek(SeekFrom::Start(0))?;
        self.rewinds += 1;
        tracing::trace!(discarded = filled, "source rewound");
        Ok(None)
    }
}
