//! Indexed region file (IRF): a fixed-size file holding a memory-mapped
//! blob index table and a contiguous-segment storage area, with per-slot
//! optimistic-then-pessimistic locking for concurrent readers and
//! disjoint writers.

mod header;
mod io_ext;
mod migrate;
mod segments;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;

use crate::codec::{BlobCodec, ZstdCodec};
use crate::config::RegionConfig;
use crate::error::{RegionError, RegionResult};

use header::{segment_pos, segments_base_v1, RegionHeader, CURRENT_VERSION, HEADER_LEN, LEGACY_VERSION};
use segments::SegmentTable;

/// How `Region::open` should treat a missing or empty file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Fail if the path already exists.
    CreateNew,
    /// Create the file if missing; an existing empty file is also
    /// initialised as fresh.
    Create,
    /// The file must already exist and be a valid region file.
    Open,
}

/// Thin wrapper around the mapped index-table bytes.
///
/// Reads and writes of a given slot's 4-byte word are synchronised by the
/// caller holding that slot's entry in `Region::slot_locks` — readers for
/// at least a read lock, writers for the whole operation's write lock —
/// not by any property of `MmapMut` itself. The raw pointer write in
/// `store` is the one place that invariant has to be taken on faith by
/// the compiler; everywhere else this is plain shared-slice indexing.
struct IndexTable {
    mmap: MmapMut,
}

impl IndexTable {
    fn load(&self, k: u32) -> u32 {
        let off = 4 * k as usize;
        u32::from_be_bytes(self.mmap[off..off + 4].try_into().unwrap())
    }

    fn store(&self, k: u32, v: u32) {
        let off = 4 * k as usize;
        let base = self.mmap.as_ptr() as *mut u8;
        // SAFETY: the caller holds `slot_locks[k]`'s write guard for the
        // duration of this call, and every reader of this same word holds
        // at least a read guard on the same lock; no other code path
        // touches this 4-byte window concurrently.
        unsafe {
            std::ptr::copy_nonoverlapping(v.to_be_bytes().as_ptr(), base.add(off), 4);
        }
    }

    fn flush(&self) -> std::io::Result<()> {
        self.mmap.flush()
    }
}

/// A single open indexed region file.
pub struct Region {
    file: File,
    codec: Box<dyn BlobCodec>,
    compression_level: i32,
    flush_on_write: bool,
    blob_count: u32,
    segment_size: u32,
    segments_base: u64,
    index: IndexTable,
    slot_locks: Vec<RwLock<()>>,
    segments: SegmentTable,
}

impl Region {
    /// Open with default configuration (`blob_count=1024, segment_size=4096,
    /// compression_level=3`).
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> RegionResult<Self> {
        Self::open_with_config(path, mode, RegionConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, mode: OpenMode, config: RegionConfig) -> RegionResult<Self> {
        config.validate()?;
        Self::open_with_codec(path.as_ref(), mode, config, Box::new(ZstdCodec))
    }

    pub(crate) fn open_with_codec(
        path: &Path,
        mode: OpenMode,
        config: RegionConfig,
        codec: Box<dyn BlobCodec>,
    ) -> RegionResult<Self> {
        let mut open_opts = OpenOptions::new();
        open_opts.read(true).write(true);
        match mode {
            OpenMode::CreateNew => {
                open_opts.create_new(true);
            }
            OpenMode::Create => {
                open_opts.create(true);
            }
            OpenMode::Open => {}
        }
        let mut file = open_opts.open(path)?;
        let file_len = file.metadata()?.len();
        let fresh = file_len == 0 && mode != OpenMode::Open;

        let header = if fresh {
            let header = RegionHeader {
                version: CURRENT_VERSION,
                blob_count: config.blob_count,
                segment_size: config.segment_size,
            };
            file.write_all(&header.encode())?;
            let zeros = vec![0u8; 4 * header.blob_count as usize];
            file.write_all(&zeros)?;
            file.flush()?;
            tracing::debug!(
                path = %path.display(),
                blob_count = header.blob_count,
                segment_size = header.segment_size,
                version = header.version,
                "created region file"
            );
            header
        } else {
            file.seek(SeekFrom::Start(0))?;
            let mut buf = [0u8; HEADER_LEN];
            file.read_exact(&mut buf)?;
            let header = RegionHeader::decode(&buf)?;
            tracing::debug!(
                path = %path.display(),
                blob_count = header.blob_count,
                segment_size = header.segment_size,
                version = header.version,
                "opened region file"
            );
            if header.blob_count != config.blob_count || header.segment_size != config.segment_size {
                tracing::warn!(
                    path = %path.display(),
                    header_blob_count = header.blob_count,
                    header_segment_size = header.segment_size,
                    supplied_blob_count = config.blob_count,
                    supplied_segment_size = config.segment_size,
                    "supplied config disagrees with on-disk header; on-disk values win"
                );
            }
            header
        };

        if header.version == LEGACY_VERSION {
            tracing::warn!(path = %path.display(), "legacy v0 region file detected, migrating to v1");
            drop(file);
            return migrate::migrate(path, &config, codec);
        }

        let segments_base = segments_base_v1(header.blob_count);
        if file.metadata()?.len() < segments_base {
            file.set_len(segments_base)?;
        }

        let mmap = unsafe {
            MmapOptions::new()
                .offset(HEADER_LEN as u64)
                .len(4 * header.blob_count as usize)
                .map_mut(&file)?
        };
        let index = IndexTable { mmap };

        let mut ranges: Vec<(u32, usize)> = Vec::new();
        let mut segment_count = 0usize;
        for k in 0..header.blob_count {
            let s = index.load(k);
            if s == 0 {
                continue;
            }
            let pos = segment_pos(segments_base, header.segment_size, s);
            let mut hdr = [0u8; 8];
            io_ext::read_at(&file, pos, &mut hdr)?;
            let comp_len = u32::from_be_bytes([hdr[4], hdr[5], hdr[6], hdr[7]]) as u64;
            let need = (8 + comp_len).div_ceil(header.segment_size as u64) as usize;
            segment_count = segment_count.max(s as usize - 1 + need);
            ranges.push((s, need));
        }

        let segments = SegmentTable::new(segment_count);
        for (s, need) in ranges {
            segments.mark_initial(s, need);
        }

        let slot_locks = (0..header.blob_count).map(|_| RwLock::new(())).collect();

        Ok(Self {
            file,
            codec,
            compression_level: config.compression_level,
            flush_on_write: config.flush_on_write,
            blob_count: header.blob_count,
            segment_size: header.segment_size,
            segments_base,
            index,
            slot_locks,
            segments,
        })
    }

    fn check_bounds(&self, k: u32) -> RegionResult<()> {
        if k >= self.blob_count {
            return Err(RegionError::SlotOutOfBounds { index: k, blob_count: self.blob_count });
        }
        Ok(())
    }

    fn acquire_read(&self, k: u32) -> parking_lot::RwLockReadGuard<'_, ()> {
        // Optimistic fast path, falling back to a blocking read lock if the
        // slot is presently being written (§5, §9 "Optimistic reads").
        match self.slot_locks[k as usize].try_read() {
            Some(guard) => guard,
            None => self.slot_locks[k as usize].read(),
        }
    }

    fn segment_pos(&self, s: u32) -> u64 {
        segment_pos(self.segments_base, self.segment_size, s)
    }

    fn segment_need_at(&self, s: u32) -> RegionResult<usize> {
        let pos = self.segment_pos(s);
        let mut hdr = [0u8; 8];
        io_ext::read_at(&self.file, pos, &mut hdr)?;
        let comp_len = u32::from_be_bytes([hdr[4], hdr[5], hdr[6], hdr[7]]) as u64;
        Ok((8 + comp_len).div_ceil(self.segment_size as u64) as usize)
    }

    fn extend_to_segment_count(&self, new_segment_count: usize) -> RegionResult<()> {
        let needed = self.segments_base + new_segment_count as u64 * self.segment_size as u64;
        if self.file.metadata()?.len() < needed {
            self.file.set_len(needed)?;
        }
        Ok(())
    }

    /// Read blob `k`, or `None` if the slot is empty.
    pub fn read_blob(&self, k: u32) -> RegionResult<Option<Vec<u8>>> {
        self.check_bounds(k)?;
        let _guard = self.acquire_read(k);

        let s = self.index.load(k);
        if s == 0 {
            tracing::trace!(slot = k, "read: slot empty");
            return Ok(None);
        }

        let pos = self.segment_pos(s);
        let mut hdr = [0u8; 8];
        io_ext::read_at(&self.file, pos, &mut hdr)?;
        let src_len = u32::from_be_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]) as usize;
        let comp_len = u32::from_be_bytes([hdr[4], hdr[5], hdr[6], hdr[7]]) as usize;

        let mut compressed = vec![0u8; comp_len];
        io_ext::read_at(&self.file, pos + 8, &mut compressed)?;

        let decompressed = self.codec.decompress(&compressed, src_len).map_err(RegionError::Io)?;
        if decompressed.len() != src_len {
            return Err(RegionError::DecompressedLengthMismatch { expected: src_len, actual: decompressed.len() });
        }
        tracing::trace!(slot = k, src_len, comp_len, segment = s, "read blob");
        Ok(Some(decompressed))
    }

    /// Compress and store `src` under slot `k`, replacing any prior value.
    pub fn write_blob(&self, k: u32, src: &[u8]) -> RegionResult<()> {
        self.check_bounds(k)?;

        let compressed = self.codec.compress(src, self.compression_level).map_err(RegionError::Io)?;
        let src_len = src.len() as u32;
        let comp_len = compressed.len() as u32;

        let mut payload = Vec::with_capacity(8 + compressed.len());
        payload.extend_from_slice(&src_len.to_be_bytes());
        payload.extend_from_slice(&comp_len.to_be_bytes());
        payload.extend_from_slice(&compressed);

        let need = (payload.len() as u64).div_ceil(self.segment_size as u64) as usize;

        let _guard = self.slot_locks[k as usize].write();
        let old_s = self.index.load(k);

        let (new_s, segment_guards) = self.segments.allocate(need, |n| self.extend_to_segment_count(n))?;

        let pos = self.segment_pos(new_s);
        io_ext::write_at(&self.file, pos, &payload)?;
        let padding = need * self.segment_size as usize - payload.len();
        if padding > 0 {
            io_ext::write_at(&self.file, pos + payload.len() as u64, &vec![0u8; padding])?;
        }
        if self.flush_on_write {
            self.file.sync_data()?;
        }
        drop(segment_guards);

        self.index.store(k, new_s);
        if self.flush_on_write {
            self.index.flush()?;
        }

        if old_s != 0 {
            let old_need = self.segment_need_at(old_s)?;
            self.segments.free(old_s, old_need);
        }

        tracing::trace!(slot = k, src_len, comp_len, segment = new_s, "wrote blob");
        Ok(())
    }

    /// Clear slot `k`. A no-op if the slot is already empty.
    pub fn remove_blob(&self, k: u32) -> RegionResult<()> {
        self.check_bounds(k)?;
        let _guard = self.slot_locks[k as usize].write();

        let s = self.index.load(k);
        if s == 0 {
            return Ok(());
        }
        let need = self.segment_need_at(s)?;
        self.index.store(k, 0);
        if self.flush_on_write {
            self.index.flush()?;
        }
        self.segments.free(s, need);
        tracing::trace!(slot = k, segment = s, "removed blob");
        Ok(())
    }

    /// Best-effort snapshot of currently-occupied slots (§4.4 `keys`).
    ///
    /// Each entry is read through the same optimistic-then-blocking guard
    /// `read_blob` takes (`acquire_read`), so this never races the raw
    /// index-word write in `IndexTable::store` — it just provides no
    /// cross-slot atomicity: a concurrent `remove_blob` can still make the
    /// returned set stale the instant after a given slot was read.
    pub fn keys(&self) -> Vec<u32> {
        (0..self.blob_count)
            .filter(|&k| {
                let _guard = self.acquire_read(k);
                self.index.load(k) != 0
            })
            .collect()
    }

    /// Flush the index mapping and, if `meta_data`, the file's metadata
    /// along with its data.
    pub fn force(&self, meta_data: bool) -> RegionResult<()> {
        self.index.flush()?;
        if meta_data {
            self.file.sync_all()?;
        } else {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Explicitly unmap and close, rather than relying on `Drop` order.
    pub fn close(self) -> RegionResult<()> {
        self.force(true)?;
        drop(self.index);
        drop(self.file);
        Ok(())
    }

    pub fn blob_count(&self) -> u32 {
        self.blob_count
    }

    pub fn segment_size(&self) -> u32 {
        self.segment_size
    }
}
