//! One-shot v0 -> v1 migration (§4.4.M): rename the legacy chained-segment
//! file aside, replay every blob into a fresh contiguous-segment file, then
//! delete the renamed original. On any failure the renamed `.old` file is
//! left in place untouched, and the error is wrapped so callers can see why.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec::BlobCodec;
use crate::config::RegionConfig;
use crate::error::{RegionError, RegionResult};

use super::header::{segment_pos, segments_base_v0, RegionHeader, HEADER_LEN, LEGACY_VERSION};
use super::io_ext;
use super::{OpenMode, Region};

/// v0's `nextSeg` sentinel for "end of chain" (§3).
const V0_END_OF_CHAIN: i32 = i32::MIN;

fn old_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".old");
    PathBuf::from(name)
}

fn read_segment(file: &File, pos: u64, segment_size: u32) -> RegionResult<Vec<u8>> {
    let mut buf = vec![0u8; segment_size as usize];
    io_ext::read_at(file, pos, &mut buf)?;
    Ok(buf)
}

/// Follow a v0 chain starting at `first_segment`, concatenating its
/// compressed payload across (possibly non-contiguous) segments. Returns
/// `None` if the slot was never allocated.
fn collect_chain(
    file: &File,
    segments_base: u64,
    segment_size: u32,
    first_segment: u32,
) -> RegionResult<Option<(Vec<u8>, usize)>> {
    if first_segment == 0 {
        return Ok(None);
    }

    let mut segment = first_segment;
    let mut collected: Vec<u8> = Vec::new();
    let mut src_len = 0usize;
    let mut comp_len = 0usize;
    let mut first = true;

    loop {
        let pos = segment_pos(segments_base, segment_size, segment);
        let raw = read_segment(file, pos, segment_size)?;
        if raw.len() < 4 {
            return Err(RegionError::UnexpectedEof { expected: 4, found: raw.len() });
        }
        let next = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);

        let body_start = if first {
            if raw.len() < 12 {
                return Err(RegionError::UnexpectedEof { expected: 12, found: raw.len() });
            }
            src_len = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
            comp_len = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]) as usize;
            first = false;
            12
        } else {
            4
        };

        let remaining = comp_len - collected.len();
        let available = raw.len() - body_start;
        let take = remaining.min(available);
        collected.extend_from_slice(&raw[body_start..body_start + take]);

        if collected.len() >= comp_len {
            break;
        }
        if next == V0_END_OF_CHAIN || next == 0 {
            return Err(RegionError::UnexpectedEof { expected: comp_len, found: collected.len() });
        }
        segment = next as u32;
    }

    Ok(Some((collected, src_len)))
}

pub fn migrate(path: &Path, config: &RegionConfig, codec: Box<dyn BlobCodec>) -> RegionResult<Region> {
    let old_path = old_path_for(path);
    fs::rename(path, &old_path)?;

    let result = (|| -> RegionResult<Region> {
        let mut v0_file = OpenOptions::new().read(true).open(&old_path)?;
        let mut header_buf = [0u8; HEADER_LEN];
        v0_file.read_exact(&mut header_buf)?;
        let header = RegionHeader::decode(&header_buf)?;
        if header.version != LEGACY_VERSION {
            return Err(RegionError::UnsupportedVersion(header.version));
        }

        let blob_count = header.blob_count;
        let segment_size = header.segment_size;
        let table_len = 4 * blob_count as usize;

        let mut primary = vec![0u8; table_len];
        v0_file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        v0_file.read_exact(&mut primary)?;

        // The legacy "temp" table's partial-write-rollback semantics aren't
        // fully recoverable from the source material (§9, Open Question a);
        // the primary table is authoritative, but disagreement is worth a
        // warning since it may indicate an interrupted write in the source.
        let mut temp = vec![0u8; table_len];
        v0_file.read_exact(&mut temp)?;
        let mut disagreements = 0u32;
        for k in 0..blob_count as usize {
            let off = 4 * k;
            let p = u32::from_be_bytes([primary[off], primary[off + 1], primary[off + 2], primary[off + 3]]);
            let t = u32::from_be_bytes([temp[off], temp[off + 1], temp[off + 2], temp[off + 3]]);
            if t != 0 && t != p {
                disagreements += 1;
            }
        }
        if disagreements > 0 {
            tracing::warn!(
                path = %path.display(),
                disagreements,
                "legacy temp index table disagrees with primary table for some slots; treating primary as authoritative"
            );
        }

        let segments_base = segments_base_v0(blob_count);

        let mut v1_config = config.clone();
        v1_config.blob_count = blob_count;
        v1_config.segment_size = segment_size;
        let v1 = Region::open_with_codec(path, OpenMode::CreateNew, v1_config, codec)?;

        let mut migrated = 0u32;
        for k in 0..blob_count {
            let off = 4 * k as usize;
            let first_segment =
                u32::from_be_bytes([primary[off], primary[off + 1], primary[off + 2], primary[off + 3]]);
            if let Some((compressed, src_len)) = collect_chain(&v0_file, segments_base, segment_size, first_segment)? {
                let decompressed = v1.codec.decompress(&compressed, src_len).map_err(RegionError::Io)?;
                if decompressed.len() != src_len {
                    return Err(RegionError::DecompressedLengthMismatch {
                        expected: src_len,
                        actual: decompressed.len(),
                    });
                }
                v1.write_blob(k, &decompressed)?;
                migrated += 1;
            }
        }

        tracing::info!(
            path = %path.display(),
            blobs_migrated = migrated,
            old_size = v0_file.metadata()?.len(),
            new_size = fs::metadata(path)?.len(),
            "v0 -> v1 migration complete"
        );

        Ok(v1)
    })();

    match result {
        Ok(region) => {
            fs::remove_file(&old_path)?;
            Ok(region)
        }
        Err(err) => {
            tracing::error!(path = %old_path.display(), error = %err, "migration failed, original preserved as `.old`");
            Err(RegionError::Migration(Box::new(err)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ZstdCodec;

    fn write_v0_file(
        path: &Path,
        blob_count: u32,
        segment_size: u32,
        blobs: &[(u32, Vec<u8>)],
    ) {
        use std::io::Write;

        let codec = ZstdCodec;
        let segments_base = segments_base_v0(blob_count);
        let mut primary = vec![0u32; blob_count as usize];

        // Lay out each blob as a single-segment chain (non-contiguous
        // segment numbers, assigned in reverse to exercise the "arbitrary"
        // ordering the spec scenario calls for).
        let mut next_segment = blobs.len() as u32;
        let mut segment_bytes: Vec<(u32, Vec<u8>)> = Vec::new();
        for (k, payload) in blobs {
            let compressed = codec.compress(payload, 3).unwrap();
            let segment = next_segment;
            next_segment -= 1;

            let mut body = Vec::new();
            body.extend_from_slice(&V0_END_OF_CHAIN.to_be_bytes());
            body.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            body.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
            body.extend_from_slice(&compressed);
            body.resize(segment_size as usize, 0);

            primary[*k as usize] = segment;
            segment_bytes.push((segment, body));
        }

        let max_segment = segment_bytes.iter().map(|(s, _)| *s).max().unwrap_or(0);
        let mut file = File::create(path).unwrap();
        let header = RegionHeader { version: LEGACY_VERSION, blob_count, segment_size };
        file.write_all(&header.encode()).unwrap();
        for s in &primary {
            file.write_all(&s.to_be_bytes()).unwrap();
        }
        // temp table: all zero, agrees trivially.
        file.write_all(&vec![0u8; 4 * blob_count as usize]).unwrap();
        file.write_all(&vec![0u8; (max_segment as usize) * segment_size as usize]).unwrap();
        for (segment, body) in segment_bytes {
            let pos = segments_base + (segment as u64 - 1) * segment_size as u64;
            io_ext::write_at(&file, pos, &body).unwrap();
        }
    }

    #[test]
    fn migrates_chained_blobs_into_a_contiguous_v1_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.irf");
        write_v0_file(
            &path,
            16,
            256,
            &[
                (1, b"alpha blob".to_vec()),
                (5, b"beta blob, a little longer".to_vec()),
                (9, b"gamma".to_vec()),
            ],
        );

        let region = Region::open(&path, OpenMode::Open).unwrap();
        assert_eq!(region.read_blob(1).unwrap().as_deref(), Some(b"alpha blob".as_slice()));
        assert_eq!(region.read_blob(5).unwrap().as_deref(), Some(b"beta blob, a little longer".as_slice()));
        assert_eq!(region.read_blob(9).unwrap().as_deref(), Some(b"gamma".as_slice()));
        assert!(!dir.path().join("legacy.irf.old").exists());
    }
}
