//! Dataset file reader with memory-mapping support.

use ahash::AHashMap;
use memmap2::Mmap;
use once_cell::sync::OnceCell;
use std::fs::File;
use std::path::Path;

use super::format::*;
use crate::{Error, Result};

/// Memory-mapped device dataset.
///
/// The dataset is validated once at load and never mutated afterwards, so
/// a single reader can serve any number of concurrent lookups without
/// locking. All node, profile, and value accesses are slices of the one
/// mapped buffer; value decoding is deferred to resolve time.
pub struct DatasetReader {
    mmap: Mmap,
    /// Property name -> index map, built on first name lookup.
    property_names: OnceCell<AHashMap<String, u16>>,
}

impl DatasetReader {
    /// Open a dataset file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let reader = Self {
            mmap,
            property_names: OnceCell::new(),
        };
        reader.validate()?;

        log::debug!(
            "loaded dataset: {} nodes, {} profiles, {} properties, {} bytes",
            reader.header().node_count,
            reader.header().profile_count,
            reader.header().property_count,
            reader.mmap.len()
        );

        Ok(reader)
    }

    /// Open a dataset from bytes.
    ///
    /// This writes the data to a temp file and then memory-maps it.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        use std::io::Write;

        if data.len() < HEADER_SIZE {
            return Err(Error::InvalidHeaderSize {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut temp_file = tempfile::tempfile()?;
        temp_file.write_all(&data)?;

        let mmap = unsafe { Mmap::map(&temp_file)? };

        let reader = Self {
            mmap,
            property_names: OnceCell::new(),
        };
        reader.validate()?;

        Ok(reader)
    }

    /// Get the file header.
    pub fn header(&self) -> &DatasetHeader {
        unsafe { &*(self.mmap.as_ptr() as *const DatasetHeader) }
    }

    /// Total size of the loaded dataset in bytes.
    pub fn data_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// The dataset's copyright notice, or an empty string if absent.
    pub fn copyright(&self) -> &str {
        let header = self.header();
        self.section(header.copyright_offset, header.copyright_size)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }

    /// Number of property definitions in the dataset.
    pub fn property_count(&self) -> u32 {
        self.header().property_count
    }

    /// Number of device profiles in the dataset.
    pub fn profile_count(&self) -> u32 {
        self.header().profile_count
    }

    /// Number of trie nodes in the dataset.
    pub fn node_count(&self) -> u32 {
        self.header().node_count
    }

    // ------------------------------------------------------------------
    // Raw table accessors. Structure is validated at load, so these only
    // need to guard against indexes the caller made up.
    // ------------------------------------------------------------------

    /// The node table as a typed slice.
    pub fn nodes(&self) -> &[NodeRecord] {
        let header = self.header();
        match self.section(header.node_table_offset, header.node_table_size) {
            Some(bytes) => unsafe {
                std::slice::from_raw_parts(
                    bytes.as_ptr() as *const NodeRecord,
                    header.node_count as usize,
                )
            },
            None => &[],
        }
    }

    /// A single node record by index.
    pub fn node(&self, index: u32) -> Option<NodeRecord> {
        self.nodes().get(index as usize).copied()
    }

    /// The property-definition table as a typed slice.
    pub fn property_records(&self) -> &[PropertyRecord] {
        let header = self.header();
        match self.section(header.property_table_offset, header.property_table_size) {
            Some(bytes) => unsafe {
                std::slice::from_raw_parts(
                    bytes.as_ptr() as *const PropertyRecord,
                    header.property_count as usize,
                )
            },
            None => &[],
        }
    }

    /// The profile directory as a typed slice.
    pub fn profile_records(&self) -> &[ProfileRecord] {
        let header = self.header();
        match self.section(header.profile_table_offset, header.profile_table_size) {
            Some(bytes) => unsafe {
                std::slice::from_raw_parts(
                    bytes.as_ptr() as *const ProfileRecord,
                    header.profile_count as usize,
                )
            },
            None => &[],
        }
    }

    /// The (property, value) entries of a profile, in insertion order.
    pub fn profile_entries(&self, profile_index: u32) -> &[ProfileEntry] {
        let header = self.header();
        let record = match self.profile_records().get(profile_index as usize) {
            Some(r) => *r,
            None => return &[],
        };

        let table = match self.section(header.profile_table_offset, header.profile_table_size) {
            Some(t) => t,
            None => return &[],
        };

        let start = record.entries_offset as usize;
        let len = record.entry_count as usize * std::mem::size_of::<ProfileEntry>();
        match table.get(start..start + len) {
            Some(bytes) => unsafe {
                std::slice::from_raw_parts(
                    bytes.as_ptr() as *const ProfileEntry,
                    record.entry_count as usize,
                )
            },
            None => &[],
        }
    }

    /// The raw value pool.
    pub fn pool(&self) -> &[u8] {
        let header = self.header();
        self.section(header.pool_offset, header.pool_size)
            .unwrap_or(&[])
    }

    /// Look up a node's explicit child for an input byte.
    ///
    /// Returns `None` when the byte falls outside the node's observed
    /// range or maps to no child.
    pub fn lookup_child(&self, node: &NodeRecord, byte: u8) -> Option<u32> {
        if node.lookup_offset == NO_LOOKUP {
            return None;
        }

        let header = self.header();
        let lookup = self.section(header.lookup_offset, header.lookup_size)?;
        let offset = node.lookup_offset as usize;

        let lowest = *lookup.get(offset)?;
        let highest = *lookup.get(offset + 1)?;
        if byte < lowest || byte > highest {
            return None;
        }

        let entry_offset =
            offset + LOOKUP_HEADER_SIZE + (byte - lowest) as usize * LOOKUP_ENTRY_SIZE;
        let bytes = lookup.get(entry_offset..entry_offset + LOOKUP_ENTRY_SIZE)?;
        let child = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        if child == NO_NODE {
            None
        } else {
            Some(child)
        }
    }

    /// Read a length-prefixed string from the value pool.
    pub fn read_pooled_str(&self, offset: u32) -> Result<&str> {
        let pool = self.pool();
        let start = offset as usize;

        let len_bytes = pool
            .get(start..start + 2)
            .ok_or(Error::CorruptValue { offset })?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;

        let bytes = pool
            .get(start + 2..start + 2 + len)
            .ok_or(Error::CorruptValue { offset })?;
        std::str::from_utf8(bytes).map_err(|_| Error::CorruptValue { offset })
    }

    /// Read a list of length-prefixed strings from the value pool.
    pub fn read_pooled_list(&self, offset: u32) -> Result<Vec<&str>> {
        let pool = self.pool();
        let start = offset as usize;

        let count_bytes = pool
            .get(start..start + 2)
            .ok_or(Error::CorruptValue { offset })?;
        let count = u16::from_le_bytes([count_bytes[0], count_bytes[1]]) as usize;

        let mut items = Vec::with_capacity(count);
        let mut cursor = start + 2;
        for _ in 0..count {
            let len_bytes = pool
                .get(cursor..cursor + 2)
                .ok_or(Error::CorruptValue { offset })?;
            let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
            let bytes = pool
                .get(cursor + 2..cursor + 2 + len)
                .ok_or(Error::CorruptValue { offset })?;
            let item = std::str::from_utf8(bytes).map_err(|_| Error::CorruptValue { offset })?;
            items.push(item);
            cursor += 2 + len;
        }
        Ok(items)
    }

    /// Property name -> index map, built lazily on first use.
    pub(crate) fn property_name_map(&self) -> &AHashMap<String, u16> {
        self.property_names.get_or_init(|| {
            let mut map = AHashMap::with_capacity(self.property_records().len());
            for (id, record) in self.property_records().iter().enumerate() {
                if let Ok(name) = self.read_pooled_str(record.name_offset) {
                    // First definition wins on (invalid) duplicates.
                    map.entry(name.to_string()).or_insert(id as u16);
                }
            }
            map
        })
    }

    fn section(&self, offset: u32, size: u32) -> Option<&[u8]> {
        let start = offset as usize;
        let end = start.checked_add(size as usize)?;
        self.mmap.get(start..end)
    }

    // ------------------------------------------------------------------
    // Load-time validation
    // ------------------------------------------------------------------

    /// Validate the structural integrity of the mapped file.
    ///
    /// One pass over the header, section bounds, and every node, profile,
    /// and property record. Pooled values are only bounds-sanity-checked
    /// here; full decoding stays deferred to resolve time.
    fn validate(&self) -> Result<()> {
        if self.mmap.len() < HEADER_SIZE {
            return Err(Error::InvalidHeaderSize {
                expected: HEADER_SIZE,
                actual: self.mmap.len(),
            });
        }

        let header = *self.header();
        header.validate()?;

        if header.format_flags().contains(FormatFlags::CHECKSUM) {
            let computed = compute_checksum(&self.mmap);
            if computed != header.checksum {
                return Err(Error::ChecksumMismatch);
            }
        }

        self.validate_section("copyright", header.copyright_offset, header.copyright_size)?;
        self.validate_section("value pool", header.pool_offset, header.pool_size)?;
        self.validate_section(
            "property table",
            header.property_table_offset,
            header.property_table_size,
        )?;
        self.validate_section(
            "profile table",
            header.profile_table_offset,
            header.profile_table_size,
        )?;
        self.validate_section("lookup tables", header.lookup_offset, header.lookup_size)?;
        self.validate_section(
            "node table",
            header.node_table_offset,
            header.node_table_size,
        )?;

        // Table sections hold fixed-layout records and are cast in place,
        // so their offsets must be aligned for the record types.
        for (section, offset) in [
            ("property table", header.property_table_offset),
            ("profile table", header.profile_table_offset),
            ("node table", header.node_table_offset),
        ] {
            if offset % 4 != 0 {
                return Err(Error::MisalignedSection { section });
            }
        }

        // Declared counts must agree with declared sizes.
        let node_bytes = header.node_count as u64 * std::mem::size_of::<NodeRecord>() as u64;
        if node_bytes != header.node_table_size as u64 {
            return Err(Error::SectionOutOfBounds {
                section: "node table",
            });
        }
        let property_bytes =
            header.property_count as u64 * std::mem::size_of::<PropertyRecord>() as u64;
        if property_bytes != header.property_table_size as u64 {
            return Err(Error::SectionOutOfBounds {
                section: "property table",
            });
        }
        let directory_bytes =
            header.profile_count as u64 * std::mem::size_of::<ProfileRecord>() as u64;
        if directory_bytes > header.profile_table_size as u64 {
            return Err(Error::SectionOutOfBounds {
                section: "profile table",
            });
        }

        // Every valid dataset carries a root node and the reserved
        // unknown-device profile.
        if header.node_count == 0 {
            return Err(Error::SectionOutOfBounds {
                section: "node table",
            });
        }
        if header.profile_count == 0 {
            return Err(Error::SectionOutOfBounds {
                section: "profile table",
            });
        }

        self.validate_properties()?;
        self.validate_profiles(&header)?;
        self.validate_nodes(&header)?;

        Ok(())
    }

    fn validate_section(&self, section: &'static str, offset: u32, size: u32) -> Result<()> {
        let end = (offset as u64)
            .checked_add(size as u64)
            .ok_or(Error::SectionOutOfBounds { section })?;
        if (offset as u64) < HEADER_SIZE as u64 && size > 0 {
            return Err(Error::SectionOutOfBounds { section });
        }
        if end > self.mmap.len() as u64 {
            return Err(Error::SectionOutOfBounds { section });
        }
        Ok(())
    }

    fn validate_properties(&self) -> Result<()> {
        for (index, record) in self.property_records().iter().enumerate() {
            let index = index as u32;
            if crate::PropertyType::from_tag(record.type_tag).is_none() {
                return Err(Error::CorruptProperty { index });
            }
            if self.read_pooled_str(record.name_offset).is_err() {
                return Err(Error::CorruptProperty { index });
            }
        }
        Ok(())
    }

    fn validate_profiles(&self, header: &DatasetHeader) -> Result<()> {
        let directory_end =
            header.profile_count as usize * std::mem::size_of::<ProfileRecord>();

        for (index, record) in self.profile_records().iter().enumerate() {
            let index = index as u32;

            let start = record.entries_offset as usize;
            let len = record.entry_count as usize * std::mem::size_of::<ProfileEntry>();
            let end = start
                .checked_add(len)
                .ok_or(Error::CorruptProfile { index })?;
            if start < directory_end && record.entry_count > 0 {
                return Err(Error::CorruptProfile { index });
            }
            if start % 4 != 0 || end > header.profile_table_size as usize {
                return Err(Error::CorruptProfile { index });
            }

            for entry in self.profile_entries(index) {
                if entry.property_id as u32 >= header.property_count {
                    return Err(Error::CorruptProfile { index });
                }
                // Pool-addressed values must at least start inside the
                // pool; lengths are walked lazily at decode time.
                let prop = self.property_records()[entry.property_id as usize];
                let is_pooled = matches!(
                    crate::PropertyType::from_tag(prop.type_tag),
                    Some(crate::PropertyType::Text) | Some(crate::PropertyType::List)
                );
                if is_pooled && entry.value >= header.pool_size {
                    return Err(Error::CorruptProfile { index });
                }
            }
        }
        Ok(())
    }

    fn validate_nodes(&self, header: &DatasetHeader) -> Result<()> {
        let lookup_size = header.lookup_size as usize;
        let lookup = self
            .section(header.lookup_offset, header.lookup_size)
            .unwrap_or(&[]);

        for (index, node) in self.nodes().iter().enumerate() {
            let index = index as u32;

            if node.profile_index >= header.profile_count {
                return Err(Error::CorruptNode { index });
            }
            if node.default_child != NO_NODE && node.default_child >= header.node_count {
                return Err(Error::CorruptNode { index });
            }
            if node.lookup_offset == NO_LOOKUP {
                continue;
            }

            let offset = node.lookup_offset as usize;
            if offset + LOOKUP_HEADER_SIZE > lookup_size {
                return Err(Error::CorruptNode { index });
            }
            let lowest = lookup[offset];
            let highest = lookup[offset + 1];
            if lowest > highest {
                return Err(Error::CorruptNode { index });
            }

            let span = highest as usize - lowest as usize + 1;
            let end = offset + LOOKUP_HEADER_SIZE + span * LOOKUP_ENTRY_SIZE;
            if end > lookup_size {
                return Err(Error::CorruptNode { index });
            }

            for slot in 0..span {
                let at = offset + LOOKUP_HEADER_SIZE + slot * LOOKUP_ENTRY_SIZE;
                let child = u32::from_le_bytes([
                    lookup[at],
                    lookup[at + 1],
                    lookup[at + 2],
                    lookup[at + 3],
                ]);
                if child != NO_NODE && child >= header.node_count {
                    return Err(Error::CorruptNode { index });
                }
            }
        }
        Ok(())
    }
}
