//! Binary dataset format constants and structures.

use bitflags::bitflags;
use sha2::{Digest, Sha256};

/// Magic bytes for identifying uatrie dataset files.
pub const MAGIC: [u8; 8] = *b"UATRIE\x00\x01";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Byte range of the checksum field within the header.
pub const CHECKSUM_START: usize = 0x18;
pub const CHECKSUM_END: usize = 0x38;

/// Sentinel node reference meaning "no node".
pub const NO_NODE: u32 = u32::MAX;

/// Sentinel lookup reference meaning "no explicit children".
pub const NO_LOOKUP: u32 = u32::MAX;

/// Index of the root node in the node table.
pub const ROOT_NODE: u32 = 0;

/// Index of the reserved unknown-device profile.
pub const UNKNOWN_PROFILE: u32 = 0;

/// Size of a lookup table header (lowest/highest byte pair).
pub const LOOKUP_HEADER_SIZE: usize = 2;

/// Size of one lookup table child entry.
pub const LOOKUP_ENTRY_SIZE: usize = 4;

bitflags! {
    /// Format flags for dataset files.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FormatFlags: u32 {
        /// File is designed for memory mapping.
        const MMAP_SAFE = 0b00000001;
        /// Header checksum is populated and must verify.
        const CHECKSUM = 0b00000010;
        /// Copyright section is populated.
        const HAS_COPYRIGHT = 0b00000100;
    }
}

/// Dataset file header (128 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DatasetHeader {
    /// Magic bytes: "UATRIE\x00\x01"
    pub magic: [u8; 8],
    /// Format version (u32 LE)
    pub version: u32,
    /// Format flags
    pub flags: u32,
    /// Unix timestamp the dataset was published (i64)
    pub published: i64,
    /// SHA-256 checksum of the entire file (excluding this field)
    pub checksum: [u8; 32],
    /// Offset to the copyright notice
    pub copyright_offset: u32,
    /// Size of the copyright notice
    pub copyright_size: u32,
    /// Offset to the value pool
    pub pool_offset: u32,
    /// Size of the value pool
    pub pool_size: u32,
    /// Offset to the property-definition table
    pub property_table_offset: u32,
    /// Size of the property-definition table
    pub property_table_size: u32,
    /// Offset to the profile table (directory + entry arrays)
    pub profile_table_offset: u32,
    /// Size of the profile table
    pub profile_table_size: u32,
    /// Offset to the lookup tables
    pub lookup_offset: u32,
    /// Size of the lookup tables
    pub lookup_size: u32,
    /// Offset to the node table
    pub node_table_offset: u32,
    /// Size of the node table
    pub node_table_size: u32,
    /// Number of property definitions
    pub property_count: u32,
    /// Number of device profiles
    pub profile_count: u32,
    /// Number of trie nodes
    pub node_count: u32,
    /// Reserved for future use
    pub reserved: [u8; 12],
}

impl DatasetHeader {
    /// Create a new header with default values.
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            flags: FormatFlags::MMAP_SAFE.bits(),
            published: 0,
            checksum: [0; 32],
            copyright_offset: HEADER_SIZE as u32,
            copyright_size: 0,
            pool_offset: HEADER_SIZE as u32,
            pool_size: 0,
            property_table_offset: HEADER_SIZE as u32,
            property_table_size: 0,
            profile_table_offset: HEADER_SIZE as u32,
            profile_table_size: 0,
            lookup_offset: HEADER_SIZE as u32,
            lookup_size: 0,
            node_table_offset: HEADER_SIZE as u32,
            node_table_size: 0,
            property_count: 0,
            profile_count: 0,
            node_count: 0,
            reserved: [0; 12],
        }
    }

    /// Validate the header magic and version.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.magic != MAGIC {
            return Err(crate::Error::InvalidMagic);
        }
        if self.version > FORMAT_VERSION {
            return Err(crate::Error::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Get format flags.
    pub fn format_flags(&self) -> FormatFlags {
        FormatFlags::from_bits_truncate(self.flags)
    }
}

impl Default for DatasetHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Trie node record (12 bytes).
///
/// Children are referenced by index into the flat node table, never by
/// address, so the structure maps directly from the file and is shareable
/// across threads.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// Offset of this node's explicit-child lookup table, relative to the
    /// lookup section start, or `NO_LOOKUP` when the node has no explicit
    /// children.
    pub lookup_offset: u32,
    /// Node index of the default (closest-match) child, or `NO_NODE`.
    pub default_child: u32,
    /// Profile of this node's closest leaf. Populated on every node.
    pub profile_index: u32,
}

/// Property-definition record (8 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyRecord {
    /// Offset of the length-prefixed property name in the value pool
    pub name_offset: u32,
    /// Value type tag (see `PropertyType`)
    pub type_tag: u8,
    /// Padding
    pub _padding: [u8; 3],
}

/// Profile directory record (8 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileRecord {
    /// Offset of this profile's entry array, relative to the profile
    /// table start
    pub entries_offset: u32,
    /// Number of entries in the array
    pub entry_count: u16,
    /// Padding
    pub _padding: [u8; 2],
}

/// Single (property, value) pair within a profile (8 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileEntry {
    /// Property-definition index
    pub property_id: u16,
    /// Padding
    pub _padding: [u8; 2],
    /// Raw value word: a pool offset for text/list values, the scalar
    /// itself for integer/boolean values
    pub value: u32,
}

/// Compute the header checksum over a complete dataset buffer.
///
/// The checksum field itself is replaced with zeros while hashing.
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&data[..CHECKSUM_START]);
    hasher.update([0u8; CHECKSUM_END - CHECKSUM_START]);
    hasher.update(&data[CHECKSUM_END..]);
    hasher.finalize().into()
}
