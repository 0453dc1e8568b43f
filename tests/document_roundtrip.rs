//! A blob stored in the region file is just bytes to `Region` itself; this
//! exercises the pipeline a real caller drives on top of it — serialise a
//! `Section` and a `Palette2D`, store them as one region-file blob, read the
//! blob back, and deserialise both out of it again.

use hytale_region::{HeightPalette, OpenMode, Palette2D, Region, Section};

fn half_and_half_section() -> Section {
    let mut section = Section::new_air("Air");
    for y in 0..32 {
        for z in 0..32 {
            for x in 0..32 {
                let name = if (x + y + z) % 2 == 0 { "Air" } else { "Stone" };
                section.set(x, y, z, name).unwrap();
            }
        }
    }
    section
}

fn checkerboard_heightmap() -> [u16; 1024] {
    let mut grid = [0u16; 1024];
    for z in 0..32 {
        for x in 0..32 {
            grid[x + 32 * z] = [60u16, 64, 72][(x + z) % 3];
        }
    }
    grid
}

/// A tiny document frame: `[sectionLen:BE32 | sectionBytes | heightBytes]`.
/// Not the real chunk-document format (that's the external collaborator
/// this crate never parses) — just enough framing for the test to prove
/// both payloads survive one round trip through a single blob.
fn pack(section: &Section, height: &HeightPalette) -> Vec<u8> {
    let section_bytes = section.serialize();
    let height_bytes = height.serialize();
    let mut out = Vec::with_capacity(4 + section_bytes.len() + height_bytes.len());
    out.extend_from_slice(&(section_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&section_bytes);
    out.extend_from_slice(&height_bytes);
    out
}

fn unpack(bytes: &[u8]) -> (Section, HeightPalette) {
    let section_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let section = Section::deserialize(&bytes[4..4 + section_len]).unwrap();
    let height = HeightPalette::deserialize(&bytes[4 + section_len..]).unwrap();
    (section, height)
}

#[test]
fn section_and_heightmap_survive_a_region_blob_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunk.irf");
    let region = Region::open(&path, OpenMode::CreateNew).unwrap();

    let section = half_and_half_section();
    let grid = checkerboard_heightmap();
    let height = Palette2D::from_grid(&grid).unwrap();

    let document = pack(&section, &height);
    region.write_blob(0, &document).unwrap();

    let read_back = region.read_blob(0).unwrap().expect("blob 0 was written");
    assert_eq!(read_back, document);

    let (restored_section, restored_height) = unpack(&read_back);
    for y in 0..32 {
        for z in 0..32 {
            for x in 0..32 {
                assert_eq!(restored_section.get(x, y, z), section.get(x, y, z));
            }
        }
    }
    for z in 0..32 {
        for x in 0..32 {
            assert_eq!(restored_height.get(x, z), grid[x + 32 * z]);
        }
    }
}

#[test]
fn multiple_documents_in_distinct_slots_stay_independent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunk.irf");
    let region = Region::open(&path, OpenMode::CreateNew).unwrap();

    let mut first = Section::new_air("Air");
    first.set(0, 0, 0, "Stone").unwrap();
    let mut second = Section::new_air("Air");
    second.set(1, 1, 1, "Dirt").unwrap();

    region.write_blob(10, &first.serialize()).unwrap();
    region.write_blob(20, &second.serialize()).unwrap();

    let restored_first = Section::deserialize(&region.read_blob(10).unwrap().unwrap()).unwrap();
    let restored_second = Section::deserialize(&region.read_blob(20).unwrap().unwrap()).unwrap();

    assert_eq!(restored_first.get(0, 0, 0), "Stone");
    assert_eq!(restored_second.get(1, 1, 1), "Dirt");
    assert_eq!(restored_second.get(0, 0, 0), "Air");
}
