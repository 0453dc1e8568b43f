//! Typed error taxonomy for the region file and its palette codecs.

use thiserror::Error;

/// Everything that can go wrong opening, reading, writing, or migrating
/// an indexed region file.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic bytes: expected `HytaleIndexedStorage`")]
    InvalidMagic,

    #[error("unsupported region file version: {0}")]
    UnsupportedVersion(u32),

    #[error("unexpected end of file: expected {expected} bytes, found {found}")]
    UnexpectedEof { expected: usize, found: usize },

    #[error("decompressed length mismatch: header says {expected}, got {actual}")]
    DecompressedLengthMismatch { expected: usize, actual: usize },

    #[error("no contiguous run of {needed} free segments available")]
    NoFreeSegments { needed: u32 },

    #[error("blob index {index} out of bounds (blob_count = {blob_count})")]
    SlotOutOfBounds { index: u32, blob_count: u32 },

    #[error("v0 -> v1 migration failed, original file preserved as `.old`: {0}")]
    Migration(Box<RegionError>),

    #[error("invalid region configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Section(#[from] PaletteError),

    #[error(transparent)]
    Palette2D(#[from] Palette2DError),
}

/// Fatal, in-memory errors raised by the section palette codec (SP).
#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("section payload truncated: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("unknown section palette tag: {0}")]
    UnknownTag(u8),

    #[error("palette block name is not valid utf-8")]
    InvalidName(#[from] std::string::FromUtf8Error),

    #[error("section palette exceeds 65536 entries, cannot assign a fresh internal id")]
    PaletteOverflow,

    #[error("voxel array length {found} does not match expected length {expected} for tag {tag:?}")]
    VoxelArrayLength {
        tag: crate::section::PaletteTag,
        expected: usize,
        found: usize,
    },
}

/// Fatal, in-memory errors raised by the 2D palette codec (P2D).
#[derive(Debug, Error)]
pub enum Palette2DError {
    #[error("2D palette payload truncated: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("2D palette exceeds the addressable 1024-entry limit")]
    PaletteOverflow,
}

pub type RegionResult<T> = Result<T, RegionError>;
