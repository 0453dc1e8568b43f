//! Indexed voxel-world storage: a blob-addressed region file (IRF) plus the
//! palette codecs (SP, P2D) and bit-packed index array (BPI) used to encode
//! the voxel and heightmap/tint data those blobs carry.
//!
//! The region file owns every byte that touches disk; it has no opinion on
//! what a blob's decompressed bytes mean. A caller's own document layer
//! slots [`Section`] and [`Palette2D`] byte ranges into and out of whatever
//! outer document format it uses — see [`DocumentPayload`].

pub mod bitfield;
pub mod codec;
pub mod config;
pub mod error;
pub mod palette2d;
pub mod region;
pub mod section;

pub use bitfield::BitFieldArray;
pub use codec::{BlobCodec, ZstdCodec};
pub use config::RegionConfig;
pub use error::{Palette2DError, PaletteError, RegionError, RegionResult};
pub use palette2d::{HeightPalette, Palette2D, Rgb, TintPalette};
pub use region::{OpenMode, Region};
pub use section::{PaletteTag, Section};

/// Marker seam for the external document decoder (§6): a caller's own
/// BSON/NBT-style layer implements this to declare a type as "the thing
/// that owns a chunk column's serialised section and palette byte ranges".
/// This crate never constructs or inspects a `DocumentPayload` itself — it
/// only hands back the raw bytes `Section::serialize`/`Palette2D::serialize`
/// produce for the caller's document layer to embed.
pub trait DocumentPayload {
    /// Opaque identifier the embedding document format uses to address
    /// this payload (e.g. a chunk-column coordinate).
    type Key;
}
