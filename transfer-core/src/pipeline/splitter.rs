// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Splitter
//!
//! Reads a file forward-only, in `nominal_chunk_size` slices, handing each
//! slice to the caller as a [`RawChunk`]. The splitter does not compress,
//! encrypt, or checksum the on-wire payload - those happen in the
//! transform stage once the coordinator decides whether this chunk is
//! worth compressing. It only knows the file's own byte layout.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use transfer_domain::{ChunkConfig, TransferError};

/// One slice of the source file, before any compression or encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub index: u64,
    pub total_chunks: u64,
    pub offset: u64,
    pub is_first: bool,
    pub is_last: bool,
    pub data: Vec<u8>,
}

/// Forward-only iterator over a file's chunks. Holds one open file handle
/// and a reusable read buffer; never seeks backward, never buffers more
/// than one chunk at a time.
pub struct ChunkSplitter {
    file: File,
    path: PathBuf,
    config: ChunkConfig,
    total_chunks: u64,
    next_index: u64,
    bytes_remaining: u64,
}

impl ChunkSplitter {
    pub fn open(path: &Path, config: ChunkConfig) -> Result<Self, TransferError> {
        let file = File::open(path).map_err(TransferError::from)?;
        let metadata = file.metadata().map_err(TransferError::from)?;
        let file_size = metadata.len();
        let total_chunks = config.total_chunks(file_size);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            config,
            total_chunks,
            next_index: 0,
            bytes_remaining: file_size,
        })
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and returns the next chunk, or `Ok(None)` once the file is
    /// exhausted. Exhaustion is the iterator protocol's own signal; callers
    /// never need to distinguish it from an error.
    pub fn next_chunk(&mut self) -> Result<Option<RawChunk>, TransferError> {
        if self.next_index >= self.total_chunks {
            return Ok(None);
        }

        let index = self.next_index;
        let offset = index * self.config.nominal_chunk_size() as u64;
        let want = (self.config.nominal_chunk_size() as u64).min(self.bytes_remaining) as usize;

        let mut buf = vec![0u8; want];
        let mut filled = 0usize;
        while filled < want {
            let read = self
                .file
                .read(&mut buf[filled..])
                .map_err(TransferError::from)?;
            if read == 0 {
                return Err(TransferError::IoError(format!(
                    "unexpected EOF reading chunk {index} of {}: wanted {want} bytes, got {filled}",
                    self.path.display()
                )));
            }
            filled += read;
        }

        self.bytes_remaining -= want as u64;
        self.next_index += 1;

        Ok(Some(RawChunk {
            index,
            total_chunks: self.total_chunks,
            offset,
            is_first: index == 0,
            is_last: self.next_index == self.total_chunks,
            data: buf,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use transfer_domain::ChunkConfig;

    fn write_temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn splits_exact_multiple_into_equal_chunks() {
        let config = ChunkConfig::new(ChunkConfig::MIN_SIZE).unwrap();
        let data = vec![1u8; ChunkConfig::MIN_SIZE * 3];
        let file = write_temp_file(&data);

        let mut splitter = ChunkSplitter::open(file.path(), config).unwrap();
        assert_eq!(splitter.total_chunks(), 3);

        let mut seen = 0;
        while let Some(chunk) = splitter.next_chunk().unwrap() {
            assert_eq!(chunk.data.len(), ChunkConfig::MIN_SIZE);
            assert_eq!(chunk.is_first, chunk.index == 0);
            assert_eq!(chunk.is_last, chunk.index == 2);
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert!(splitter.next_chunk().unwrap().is_none());
    }

    #[test]
    fn last_chunk_is_shorter_for_non_exact_multiple() {
        let config = ChunkConfig::new(ChunkConfig::MIN_SIZE).unwrap();
        let data = vec![2u8; ChunkConfig::MIN_SIZE + 17];
        let file = write_temp_file(&data);

        let mut splitter = ChunkSplitter::open(file.path(), config).unwrap();
        let first = splitter.next_chunk().unwrap().unwrap();
        assert_eq!(first.data.len(), ChunkConfig::MIN_SIZE);
        let second = splitter.next_chunk().unwrap().unwrap();
        assert_eq!(second.data.len(), 17);
        assert!(second.is_last);
        assert!(splitter.next_chunk().unwrap().is_none());
    }

    #[test]
    fn empty_file_yields_one_empty_chunk() {
        let config = ChunkConfig::default();
        let file = write_temp_file(&[]);

        let mut splitter = ChunkSplitter::open(file.path(), config).unwrap();
        assert_eq!(splitter.total_chunks(), 1);
        let chunk = splitter.next_chunk().unwrap().unwrap();
        assert!(chunk.data.is_empty());
        assert!(chunk.is_first);
        assert!(chunk.is_last);
        assert!(splitter.next_chunk().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let config = ChunkConfig::default();
        let err = ChunkSplitter::open(Path::new("/no/such/path"), config).unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(_)));
    }
}
