//! Program loading: turning host bytes into placed memory segments.

use std::fs;
use std::path::Path;

use log::warn;

use crate::fault::LoadError;
use crate::memory::SRAM_BASE;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Contiguous bytes destined for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Load address of the first byte.
    pub addr: u32,
    /// Bytes to place.
    pub data: Vec<u8>,
}

/// A loader's output: segments plus the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// Segments to copy into memory, in order.
    pub segments: Vec<Segment>,
    /// Initial program counter for core 0.
    pub entry: u32,
}

impl LoadedImage {
    /// Total number of bytes across all segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.data.len()).sum()
    }

    /// Returns `true` when no segment carries any byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts a program file's bytes into a [`LoadedImage`].
pub trait ProgramLoader {
    /// Parses `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the bytes cannot be turned into an image.
    fn load(&self, bytes: &[u8]) -> Result<LoadedImage, LoadError>;
}

/// Raw binary placed verbatim at `base`, entered at `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatBinaryLoader {
    /// Load and entry address.
    pub base: u32,
}

impl Default for FlatBinaryLoader {
    fn default() -> Self {
        Self { base: SRAM_BASE }
    }
}

impl ProgramLoader for FlatBinaryLoader {
    fn load(&self, bytes: &[u8]) -> Result<LoadedImage, LoadError> {
        if bytes.starts_with(&ELF_MAGIC) {
            warn!("program looks like an ELF file; loading it as a flat binary");
        }
        Ok(LoadedImage {
            segments: vec![Segment {
                addr: self.base,
                data: bytes.to_vec(),
            }],
            entry: self.base,
        })
    }
}

/// Reads a program file from disk.
///
/// # Errors
///
/// Returns [`LoadError::Io`] when the file cannot be read.
pub fn read_program(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|err| LoadError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
