//! Comprehensive tests for the binary dataset format.
//!
//! These tests verify the complete write-read round-trip, the loader's
//! structural validation, and the corruption cases a production load
//! path must reject.

use super::format::*;
use super::reader::DatasetReader;
use super::writer::{DatasetBuilder, PatternStep, PropertyValue};
use crate::{Error, PropertyType};

/// Helper to build a small but representative dataset.
fn sample_builder() -> DatasetBuilder {
    let mut builder = DatasetBuilder::new();
    builder.set_copyright("Sample Device Data 2026");

    let name = builder.add_property("DeviceName", PropertyType::Text);
    let mobile = builder.add_property("IsMobile", PropertyType::Boolean);
    let width = builder.add_property("ScreenWidth", PropertyType::Integer);

    builder
        .add_profile(vec![(name, "Unknown".into()), (mobile, false.into())])
        .expect("unknown profile");
    let phone = builder
        .add_profile(vec![
            (name, "Phone".into()),
            (mobile, true.into()),
            (width, 390.into()),
        ])
        .expect("phone profile");
    let desktop = builder
        .add_profile(vec![
            (name, "Desktop".into()),
            (mobile, false.into()),
            (width, 1920.into()),
        ])
        .expect("desktop profile");

    builder
        .add_pattern("Mozilla/5.0 (iPhone", phone)
        .expect("phone pattern");
    builder
        .add_pattern("Mozilla/5.0 (Windows", desktop)
        .expect("desktop pattern");

    builder
}

fn sample_data() -> Vec<u8> {
    sample_builder().build().expect("build sample dataset")
}

/// Patch raw bytes and restamp the checksum so only the intended damage
/// is visible to the loader.
fn patch(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
    let checksum = compute_checksum(data);
    data[CHECKSUM_START..CHECKSUM_END].copy_from_slice(&checksum);
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

// ============================================================================
// Header and Format Tests
// ============================================================================

#[test]
fn test_build_produces_valid_binary() {
    let data = sample_data();

    assert!(data.len() > HEADER_SIZE);
    assert_eq!(&data[0..8], &MAGIC);
    assert_eq!(read_u32(&data, 0x08), FORMAT_VERSION);

    let flags = FormatFlags::from_bits_truncate(read_u32(&data, 0x0C));
    assert!(flags.contains(FormatFlags::MMAP_SAFE));
    assert!(flags.contains(FormatFlags::CHECKSUM));
    assert!(flags.contains(FormatFlags::HAS_COPYRIGHT));
}

#[test]
fn test_header_counts() {
    let reader = DatasetReader::from_bytes(sample_data()).unwrap();
    let header = reader.header();

    assert_eq!(header.property_count, 3);
    assert_eq!(header.profile_count, 3);
    // Shared prefix "Mozilla/5.0 (" plus the two divergent tails plus
    // the root.
    assert!(header.node_count > "Mozilla/5.0 (".len() as u32);
}

#[test]
fn test_copyright_round_trip() {
    let reader = DatasetReader::from_bytes(sample_data()).unwrap();
    assert_eq!(reader.copyright(), "Sample Device Data 2026");
}

#[test]
fn test_empty_copyright() {
    let mut builder = DatasetBuilder::new();
    let name = builder.add_property("DeviceName", PropertyType::Text);
    builder
        .add_profile(vec![(name, "Unknown".into())])
        .unwrap();

    let reader = DatasetReader::from_bytes(builder.build().unwrap()).unwrap();
    assert_eq!(reader.copyright(), "");
    assert!(!reader
        .header()
        .format_flags()
        .contains(FormatFlags::HAS_COPYRIGHT));
}

// ============================================================================
// Round-trip Matching Tests
// ============================================================================

#[test]
fn test_round_trip_matching() {
    let reader = DatasetReader::from_bytes(sample_data()).unwrap();

    let phone = reader.match_ua("Mozilla/5.0 (iPhone");
    assert_eq!(
        reader.resolve(phone, "DeviceName").unwrap().to_string(),
        "Phone"
    );

    let desktop = reader.match_ua("Mozilla/5.0 (Windows");
    assert_eq!(
        reader.resolve(desktop, "DeviceName").unwrap().to_string(),
        "Desktop"
    );

    let unknown = reader.match_ua("");
    assert_eq!(unknown.profile, UNKNOWN_PROFILE);
}

#[test]
fn test_many_patterns() {
    let mut builder = DatasetBuilder::new();
    let name = builder.add_property("DeviceName", PropertyType::Text);
    builder
        .add_profile(vec![(name, "Unknown".into())])
        .unwrap();

    let mut profiles = Vec::new();
    for i in 0..1000 {
        let profile = builder
            .add_profile(vec![(name, format!("Device{}", i).into())])
            .unwrap();
        builder
            .add_pattern(&format!("Agent-{}/1.0", i), profile)
            .unwrap();
        profiles.push(profile);
    }

    let reader = DatasetReader::from_bytes(builder.build().unwrap()).unwrap();

    for (i, &profile) in profiles.iter().enumerate() {
        let leaf = reader.match_ua(&format!("Agent-{}/1.0", i));
        assert_eq!(leaf.profile, profile, "pattern {}", i);
    }
}

#[test]
fn test_shared_leaf_profiles() {
    // Multiple patterns may resolve to the same deduplicated profile.
    let mut builder = DatasetBuilder::new();
    let name = builder.add_property("DeviceName", PropertyType::Text);
    builder
        .add_profile(vec![(name, "Unknown".into())])
        .unwrap();
    let bot = builder.add_profile(vec![(name, "Bot".into())]).unwrap();

    builder.add_pattern("curl/7", bot).unwrap();
    builder.add_pattern("curl/8", bot).unwrap();
    builder.add_pattern("Wget/1", bot).unwrap();

    let reader = DatasetReader::from_bytes(builder.build().unwrap()).unwrap();
    assert_eq!(reader.match_ua("curl/7").profile, bot);
    assert_eq!(reader.match_ua("curl/8").profile, bot);
    assert_eq!(reader.match_ua("Wget/1").profile, bot);
}

#[test]
fn test_lookup_table_gap_bytes() {
    // Children 'a' and 'c' leave a gap at 'b' in the lookup range.
    let mut builder = DatasetBuilder::new();
    let name = builder.add_property("DeviceName", PropertyType::Text);
    builder
        .add_profile(vec![(name, "Unknown".into())])
        .unwrap();
    let a = builder.add_profile(vec![(name, "A".into())]).unwrap();
    let c = builder.add_profile(vec![(name, "C".into())]).unwrap();

    builder.add_pattern("a", a).unwrap();
    builder.add_pattern("c", c).unwrap();

    let reader = DatasetReader::from_bytes(builder.build().unwrap()).unwrap();
    assert_eq!(reader.match_ua("a").profile, a);
    assert_eq!(reader.match_ua("c").profile, c);
    // The gap byte maps to no child and no default exists at the root.
    assert_eq!(reader.match_ua("b").profile, UNKNOWN_PROFILE);
}

#[test]
fn test_wildcard_chain_round_trip() {
    let mut builder = DatasetBuilder::new();
    let name = builder.add_property("DeviceName", PropertyType::Text);
    builder
        .add_profile(vec![(name, "Unknown".into())])
        .unwrap();
    let tv = builder.add_profile(vec![(name, "SmartTV".into())]).unwrap();

    let mut steps: Vec<PatternStep> = b"TV-Model-".iter().map(|&b| PatternStep::Byte(b)).collect();
    steps.push(PatternStep::Any);
    steps.push(PatternStep::Any);
    builder.add_pattern_steps(&steps, tv).unwrap();

    let reader = DatasetReader::from_bytes(builder.build().unwrap()).unwrap();
    assert_eq!(reader.match_ua("TV-Model-01").profile, tv);
    assert_eq!(reader.match_ua("TV-Model-XZ").profile, tv);
    assert_eq!(reader.match_ua("TV-Model-XZ extra").profile, tv);
}

#[test]
fn test_idempotent_load() {
    let data = sample_data();
    let first = DatasetReader::from_bytes(data.clone()).unwrap();
    let second = DatasetReader::from_bytes(data).unwrap();

    for input in [
        "",
        "Mozilla/5.0 (iPhone",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0)",
        "SomethingElse/2.0",
        "mozilla/5.0 (iphone",
    ] {
        let a = first.match_ua(input);
        let b = second.match_ua(input);
        assert_eq!(a, b, "input {:?}", input);
        assert_eq!(
            first.resolve_all(a).unwrap(),
            second.resolve_all(b).unwrap()
        );
    }
}

#[test]
fn test_list_values_round_trip() {
    let mut builder = DatasetBuilder::new();
    let name = builder.add_property("DeviceName", PropertyType::Text);
    let formats = builder.add_property("ImageFormats", PropertyType::List);
    builder
        .add_profile(vec![(name, "Unknown".into())])
        .unwrap();
    let phone = builder
        .add_profile(vec![
            (name, "Phone".into()),
            (
                formats,
                PropertyValue::List(vec![
                    "gif".to_string(),
                    "jpeg".to_string(),
                    "png".to_string(),
                    "webp".to_string(),
                ]),
            ),
        ])
        .unwrap();
    builder.add_pattern("Phone/1", phone).unwrap();

    let reader = DatasetReader::from_bytes(builder.build().unwrap()).unwrap();
    let leaf = reader.match_ua("Phone/1");
    assert_eq!(
        reader.resolve(leaf, "ImageFormats").unwrap().as_list(),
        Some(&["gif", "jpeg", "png", "webp"][..])
    );
}

// ============================================================================
// Corruption Tests
// ============================================================================

#[test]
fn test_truncated_below_header() {
    let mut data = sample_data();
    data.truncate(HEADER_SIZE / 2);
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::InvalidHeaderSize { .. })
    ));
}

#[test]
fn test_truncated_payload() {
    let full = sample_data();
    for fraction in [2, 3, 4] {
        let mut data = full.clone();
        data.truncate(full.len() * (fraction - 1) / fraction);
        if data.len() < HEADER_SIZE {
            continue;
        }
        assert!(
            DatasetReader::from_bytes(data).is_err(),
            "truncation to 1/{} must fail",
            fraction
        );
    }
}

#[test]
fn test_zeroed_header() {
    let mut data = sample_data();
    for byte in data[..HEADER_SIZE].iter_mut() {
        *byte = 0;
    }
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::InvalidMagic)
    ));
}

#[test]
fn test_future_version_rejected() {
    let mut data = sample_data();
    patch(&mut data, 0x08, &(FORMAT_VERSION + 1).to_le_bytes());
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::UnsupportedVersion(_))
    ));
}

#[test]
fn test_checksum_detects_bit_rot() {
    let mut data = sample_data();
    // Flip one payload byte without restamping the checksum.
    let last = data.len() - 1;
    data[last] ^= 0x01;
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::ChecksumMismatch)
    ));
}

#[test]
fn test_node_table_offset_out_of_bounds() {
    let mut data = sample_data();
    let huge = (data.len() as u32) * 2;
    // node_table_offset lives at 0x60.
    patch(&mut data, 0x60, &huge.to_le_bytes());
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::SectionOutOfBounds { .. })
    ));
}

#[test]
fn test_pool_size_overflow_rejected() {
    let mut data = sample_data();
    // pool_size at 0x44; u32::MAX overflows past the file end.
    patch(&mut data, 0x44, &u32::MAX.to_le_bytes());
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::SectionOutOfBounds { .. })
    ));
}

#[test]
fn test_misaligned_node_table_rejected() {
    let mut data = sample_data();
    let offset = read_u32(&data, 0x60);
    patch(&mut data, 0x60, &(offset + 1).to_le_bytes());
    // Either the alignment or the size agreement check trips.
    assert!(DatasetReader::from_bytes(data).is_err());
}

#[test]
fn test_corrupt_node_profile_rejected() {
    let mut data = sample_data();
    let node_table_offset = read_u32(&data, 0x60) as usize;
    // First node's profile_index field sits 8 bytes into the record.
    patch(
        &mut data,
        node_table_offset + 8,
        &0xFFFF_FFF0u32.to_le_bytes(),
    );
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::CorruptNode { index: 0 })
    ));
}

#[test]
fn test_corrupt_default_child_rejected() {
    let mut data = sample_data();
    let node_table_offset = read_u32(&data, 0x60) as usize;
    let node_count = read_u32(&data, 0x70);
    // Point the root's default child past the node table (but not at the
    // NO_NODE sentinel).
    patch(
        &mut data,
        node_table_offset + 4,
        &(node_count + 5).to_le_bytes(),
    );
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::CorruptNode { index: 0 })
    ));
}

#[test]
fn test_corrupt_profile_entry_rejected() {
    let mut data = sample_data();
    let profile_table_offset = read_u32(&data, 0x50) as usize;
    let profile_count = read_u32(&data, 0x6C) as usize;
    // First entry array starts right after the directory; point its
    // property_id at a definition that does not exist.
    let entries_start = profile_table_offset + profile_count * 8;
    patch(&mut data, entries_start, &u16::MAX.to_le_bytes());
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::CorruptProfile { .. })
    ));
}

#[test]
fn test_corrupt_property_type_tag_rejected() {
    let mut data = sample_data();
    let property_table_offset = read_u32(&data, 0x48) as usize;
    // type_tag is byte 4 of the first property record.
    patch(&mut data, property_table_offset + 4, &[0x7F]);
    assert!(matches!(
        DatasetReader::from_bytes(data),
        Err(Error::CorruptProperty { index: 0 })
    ));
}

#[test]
fn test_zero_profiles_rejected() {
    let mut data = sample_data();
    // profile_count at 0x6C; a dataset without the reserved unknown
    // profile is structurally invalid.
    patch(&mut data, 0x6C, &0u32.to_le_bytes());
    assert!(DatasetReader::from_bytes(data).is_err());
}

#[test]
fn test_corruption_never_yields_reader() {
    // Whatever the specific error, a damaged file must never produce a
    // partially usable reader.
    let full = sample_data();
    for i in (0..full.len()).step_by(7) {
        let mut data = full.clone();
        data[i] ^= 0xA5;
        // The checksum covers every byte outside its own field, and a
        // flip inside the field mismatches the recomputed digest.
        assert!(
            DatasetReader::from_bytes(data).is_err(),
            "flip at {} produced a reader",
            i
        );
    }
}
