//! Dataset file writer and in-memory builder.
//!
//! `DatasetBuilder` is the intermediate representation an offline trainer
//! (or a test) assembles: property definitions, device profiles, and
//! trained match patterns. `DatasetWriter` serializes it to the binary
//! format, computing the closest-leaf annotation for every node and
//! stamping the header checksum.

use ahash::AHashMap;
use std::collections::{BTreeMap, VecDeque};

use super::format::*;
use crate::{Error, PropertyType, Result};

/// One element of a trained match pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternStep {
    /// Match this exact byte.
    Byte(u8),
    /// Consume any single byte (closest-match edge).
    Any,
}

/// An owned property value supplied to the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A single string
    Text(String),
    /// A signed integer
    Integer(i32),
    /// A boolean
    Boolean(bool),
    /// An ordered list of strings
    List(Vec<String>),
}

impl PropertyValue {
    fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Text(_) => PropertyType::Text,
            PropertyValue::Integer(_) => PropertyType::Integer,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::List(_) => PropertyType::List,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(items: Vec<String>) -> Self {
        PropertyValue::List(items)
    }
}

/// In-memory trie node used while building.
#[derive(Debug, Default)]
struct TrieNode {
    /// Explicit children keyed by input byte.
    children: BTreeMap<u8, usize>,
    /// Default (closest-match) child.
    default_child: Option<usize>,
    /// Profile this node terminates a pattern for.
    terminal: Option<u32>,
}

/// Intermediate representation of a dataset for binary serialization.
///
/// Profile index 0 is the reserved unknown-device profile and must be the
/// first profile added.
#[derive(Debug)]
pub struct DatasetBuilder {
    copyright: String,
    properties: Vec<(String, PropertyType)>,
    profiles: Vec<Vec<(u16, PropertyValue)>>,
    nodes: Vec<TrieNode>,
}

impl DatasetBuilder {
    /// Create a new empty builder. The trie starts as a lone root node.
    pub fn new() -> Self {
        Self {
            copyright: String::new(),
            properties: Vec::new(),
            profiles: Vec::new(),
            nodes: vec![TrieNode::default()],
        }
    }

    /// Set the dataset's copyright notice.
    pub fn set_copyright(&mut self, copyright: &str) {
        self.copyright = copyright.to_string();
    }

    /// Define a property and return its stable index.
    pub fn add_property(&mut self, name: &str, property_type: PropertyType) -> u16 {
        self.properties.push((name.to_string(), property_type));
        (self.properties.len() - 1) as u16
    }

    /// Add a device profile and return its index.
    ///
    /// Entry order is preserved in the dataset. Every entry must
    /// reference a defined property and carry a value of its declared
    /// type.
    pub fn add_profile(&mut self, entries: Vec<(u16, PropertyValue)>) -> Result<u32> {
        for (property_id, value) in &entries {
            let (name, declared) = self
                .properties
                .get(*property_id as usize)
                .ok_or_else(|| Error::Build(format!("undefined property id {}", property_id)))?;
            if value.property_type() != *declared {
                return Err(Error::Build(format!(
                    "property {} declared {} but profile supplies {}",
                    name,
                    declared,
                    value.property_type()
                )));
            }
        }
        self.profiles.push(entries);
        Ok((self.profiles.len() - 1) as u32)
    }

    /// Add a trained pattern of literal bytes leading to a profile.
    pub fn add_pattern(&mut self, pattern: &str, profile: u32) -> Result<()> {
        let steps: Vec<PatternStep> = pattern.bytes().map(PatternStep::Byte).collect();
        self.add_pattern_steps(&steps, profile)
    }

    /// Add a trained pattern that may contain wildcard steps.
    ///
    /// The last pattern added for an identical step sequence wins.
    pub fn add_pattern_steps(&mut self, steps: &[PatternStep], profile: u32) -> Result<()> {
        if profile as usize >= self.profiles.len() {
            return Err(Error::Build(format!(
                "pattern references undefined profile {}",
                profile
            )));
        }

        let mut current = 0usize;
        for step in steps {
            current = match step {
                PatternStep::Byte(byte) => match self.nodes[current].children.get(byte).copied() {
                    Some(next) => next,
                    None => {
                        let next = self.push_node();
                        self.nodes[current].children.insert(*byte, next);
                        next
                    }
                },
                PatternStep::Any => match self.nodes[current].default_child {
                    Some(next) => next,
                    None => {
                        let next = self.push_node();
                        self.nodes[current].default_child = Some(next);
                        next
                    }
                },
            };
        }
        self.nodes[current].terminal = Some(profile);
        Ok(())
    }

    /// Number of trie nodes built so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Serialize this builder to a complete dataset file.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut writer = DatasetWriter::new();
        writer.write(self)
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(TrieNode::default());
        self.nodes.len() - 1
    }

    /// Compute every node's closest-leaf profile annotation.
    ///
    /// A terminal node carries its own profile. The root, when not
    /// terminal, always carries the reserved unknown profile so that
    /// empty and entirely foreign input resolve to it. Any other
    /// non-terminal node takes the profile of the shallowest terminal in
    /// its subtree, visiting explicit children in byte order before the
    /// default edge.
    fn annotations(&self) -> Vec<u32> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| match node.terminal {
                Some(profile) => profile,
                None if index == 0 => UNKNOWN_PROFILE,
                None => self.closest_terminal(index),
            })
            .collect()
    }

    fn closest_terminal(&self, start: usize) -> u32 {
        // The builder trie is a tree, so a plain BFS terminates.
        let mut queue = VecDeque::from([start]);
        while let Some(index) = queue.pop_front() {
            let node = &self.nodes[index];
            if index != start {
                if let Some(profile) = node.terminal {
                    return profile;
                }
            }
            queue.extend(node.children.values().copied());
            queue.extend(node.default_child);
        }
        UNKNOWN_PROFILE
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary dataset writer.
pub struct DatasetWriter {
    buffer: Vec<u8>,
}

impl DatasetWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024 * 1024), // 1MB initial
        }
    }

    /// Write a builder's contents to the binary format.
    pub fn write(&mut self, builder: &DatasetBuilder) -> Result<Vec<u8>> {
        if builder.profiles.is_empty() {
            return Err(Error::Build(
                "dataset must define at least one profile (index 0 is the unknown profile)"
                    .to_string(),
            ));
        }
        if builder.properties.len() > u16::MAX as usize {
            return Err(Error::Build("too many properties".to_string()));
        }
        if builder.nodes.len() as u64 >= NO_NODE as u64 {
            return Err(Error::Build("too many nodes".to_string()));
        }
        let mut seen = AHashMap::new();
        for (name, _) in &builder.properties {
            if seen.insert(name.as_str(), ()).is_some() {
                return Err(Error::Build(format!("duplicate property name: {}", name)));
            }
        }

        self.buffer.clear();
        self.buffer.resize(HEADER_SIZE, 0);

        // Copyright
        let (copyright_offset, copyright_size) =
            self.append_section(builder.copyright.as_bytes());

        // Value pool: property names first, then profile values, with
        // identical payloads interned to a single pool offset.
        let mut pool = Vec::new();
        let mut interned: AHashMap<Vec<u8>, u32> = AHashMap::new();

        let mut property_records = Vec::with_capacity(builder.properties.len());
        for (name, property_type) in &builder.properties {
            let name_offset = intern_str(&mut pool, &mut interned, name)?;
            property_records.push(PropertyRecord {
                name_offset,
                type_tag: property_type.as_tag(),
                _padding: [0; 3],
            });
        }

        let mut profile_entry_arrays = Vec::with_capacity(builder.profiles.len());
        for entries in &builder.profiles {
            if entries.len() > u16::MAX as usize {
                return Err(Error::Build("too many entries in profile".to_string()));
            }
            let mut encoded = Vec::with_capacity(entries.len());
            for (property_id, value) in entries {
                let word = match value {
                    PropertyValue::Text(s) => intern_str(&mut pool, &mut interned, s)?,
                    PropertyValue::Integer(n) => *n as u32,
                    PropertyValue::Boolean(b) => *b as u32,
                    PropertyValue::List(items) => intern_list(&mut pool, &mut interned, items)?,
                };
                encoded.push(ProfileEntry {
                    property_id: *property_id,
                    _padding: [0; 2],
                    value: word,
                });
            }
            profile_entry_arrays.push(encoded);
        }

        let (pool_offset, pool_size) = self.append_section(&pool);

        // Property table
        let mut property_table = Vec::new();
        for record in &property_records {
            write_struct(&mut property_table, record);
        }
        let (property_table_offset, property_table_size) = self.append_section(&property_table);

        // Profile table: directory followed by the entry arrays.
        let directory_size = builder.profiles.len() * std::mem::size_of::<ProfileRecord>();
        let mut profile_table = Vec::new();
        let mut entries_offset = directory_size as u32;
        for encoded in &profile_entry_arrays {
            write_struct(
                &mut profile_table,
                &ProfileRecord {
                    entries_offset,
                    entry_count: encoded.len() as u16,
                    _padding: [0; 2],
                },
            );
            entries_offset += (encoded.len() * std::mem::size_of::<ProfileEntry>()) as u32;
        }
        for encoded in &profile_entry_arrays {
            for entry in encoded {
                write_struct(&mut profile_table, entry);
            }
        }
        let (profile_table_offset, profile_table_size) = self.append_section(&profile_table);

        // Lookup tables and node table.
        let annotations = builder.annotations();
        let mut lookup = Vec::new();
        let mut node_table = Vec::new();
        for (index, node) in builder.nodes.iter().enumerate() {
            let lookup_offset = if node.children.is_empty() {
                NO_LOOKUP
            } else {
                let offset = lookup.len() as u32;
                let lowest = *node.children.keys().next().unwrap_or(&0);
                let highest = *node.children.keys().next_back().unwrap_or(&0);
                lookup.push(lowest);
                lookup.push(highest);
                for byte in lowest..=highest {
                    let child = node
                        .children
                        .get(&byte)
                        .map(|&c| c as u32)
                        .unwrap_or(NO_NODE);
                    lookup.extend_from_slice(&child.to_le_bytes());
                }
                offset
            };

            write_struct(
                &mut node_table,
                &NodeRecord {
                    lookup_offset,
                    default_child: node.default_child.map(|c| c as u32).unwrap_or(NO_NODE),
                    profile_index: annotations[index],
                },
            );
        }
        let (lookup_offset, lookup_size) = self.append_section(&lookup);
        let (node_table_offset, node_table_size) = self.append_section(&node_table);

        // Header
        let mut flags = FormatFlags::MMAP_SAFE | FormatFlags::CHECKSUM;
        if !builder.copyright.is_empty() {
            flags |= FormatFlags::HAS_COPYRIGHT;
        }

        let header = DatasetHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            flags: flags.bits(),
            published: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            checksum: [0; 32], // Will be filled later
            copyright_offset,
            copyright_size,
            pool_offset,
            pool_size,
            property_table_offset,
            property_table_size,
            profile_table_offset,
            profile_table_size,
            lookup_offset,
            lookup_size,
            node_table_offset,
            node_table_size,
            property_count: builder.properties.len() as u32,
            profile_count: builder.profiles.len() as u32,
            node_count: builder.nodes.len() as u32,
            reserved: [0; 12],
        };

        let mut header_bytes = Vec::with_capacity(HEADER_SIZE);
        write_struct(&mut header_bytes, &header);
        self.buffer[..HEADER_SIZE].copy_from_slice(&header_bytes);

        let checksum = compute_checksum(&self.buffer);
        self.buffer[CHECKSUM_START..CHECKSUM_END].copy_from_slice(&checksum);

        Ok(std::mem::take(&mut self.buffer))
    }

    /// Append a section 8-byte aligned, returning its (offset, size).
    fn append_section(&mut self, data: &[u8]) -> (u32, u32) {
        while self.buffer.len() % 8 != 0 {
            self.buffer.push(0);
        }
        let offset = self.buffer.len() as u32;
        self.buffer.extend_from_slice(data);
        (offset, data.len() as u32)
    }
}

impl Default for DatasetWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn intern_str(pool: &mut Vec<u8>, interned: &mut AHashMap<Vec<u8>, u32>, s: &str) -> Result<u32> {
    if s.len() > u16::MAX as usize {
        return Err(Error::Build(format!("string too long: {} bytes", s.len())));
    }
    let mut encoded = Vec::with_capacity(2 + s.len());
    encoded.extend_from_slice(&(s.len() as u16).to_le_bytes());
    encoded.extend_from_slice(s.as_bytes());
    Ok(intern(pool, interned, encoded))
}

fn intern_list(
    pool: &mut Vec<u8>,
    interned: &mut AHashMap<Vec<u8>, u32>,
    items: &[String],
) -> Result<u32> {
    if items.len() > u16::MAX as usize {
        return Err(Error::Build(format!("list too long: {} items", items.len())));
    }
    let mut encoded = Vec::new();
    encoded.extend_from_slice(&(items.len() as u16).to_le_bytes());
    for item in items {
        if item.len() > u16::MAX as usize {
            return Err(Error::Build(format!(
                "list item too long: {} bytes",
                item.len()
            )));
        }
        encoded.extend_from_slice(&(item.len() as u16).to_le_bytes());
        encoded.extend_from_slice(item.as_bytes());
    }
    Ok(intern(pool, interned, encoded))
}

fn intern(pool: &mut Vec<u8>, interned: &mut AHashMap<Vec<u8>, u32>, encoded: Vec<u8>) -> u32 {
    if let Some(&offset) = interned.get(&encoded) {
        return offset;
    }
    let offset = pool.len() as u32;
    pool.extend_from_slice(&encoded);
    interned.insert(encoded, offset);
    offset
}

fn write_struct<T>(buffer: &mut Vec<u8>, value: &T) {
    let bytes = unsafe {
        std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>())
    };
    buffer.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_minimal_dataset() {
        let mut builder = DatasetBuilder::new();
        let name = builder.add_property("DeviceName", PropertyType::Text);
        builder
            .add_profile(vec![(name, "Unknown".into())])
            .unwrap();

        let data = builder.build().unwrap();
        assert!(data.len() >= HEADER_SIZE);
        assert_eq!(&data[0..8], &MAGIC);
    }

    #[test]
    fn test_empty_builder_rejected() {
        let builder = DatasetBuilder::new();
        assert!(matches!(builder.build(), Err(Error::Build(_))));
    }

    #[test]
    fn test_profile_type_mismatch_rejected() {
        let mut builder = DatasetBuilder::new();
        let is_mobile = builder.add_property("IsMobile", PropertyType::Boolean);
        let result = builder.add_profile(vec![(is_mobile, "yes".into())]);
        assert!(matches!(result, Err(Error::Build(_))));
    }

    #[test]
    fn test_undefined_property_rejected() {
        let mut builder = DatasetBuilder::new();
        let result = builder.add_profile(vec![(42, "x".into())]);
        assert!(matches!(result, Err(Error::Build(_))));
    }

    #[test]
    fn test_undefined_profile_pattern_rejected() {
        let mut builder = DatasetBuilder::new();
        let name = builder.add_property("DeviceName", PropertyType::Text);
        builder
            .add_profile(vec![(name, "Unknown".into())])
            .unwrap();
        assert!(matches!(
            builder.add_pattern("Mozilla", 7),
            Err(Error::Build(_))
        ));
    }

    #[test]
    fn test_duplicate_property_name_rejected() {
        let mut builder = DatasetBuilder::new();
        builder.add_property("DeviceName", PropertyType::Text);
        builder.add_property("DeviceName", PropertyType::Text);
        builder.add_profile(vec![]).unwrap();
        assert!(matches!(builder.build(), Err(Error::Build(_))));
    }

    #[test]
    fn test_shared_prefixes_share_nodes() {
        let mut builder = DatasetBuilder::new();
        let name = builder.add_property("DeviceName", PropertyType::Text);
        builder
            .add_profile(vec![(name, "Unknown".into())])
            .unwrap();
        let a = builder.add_profile(vec![(name, "A".into())]).unwrap();
        let b = builder.add_profile(vec![(name, "B".into())]).unwrap();

        builder.add_pattern("abcX", a).unwrap();
        let nodes_after_first = builder.node_count();
        builder.add_pattern("abcY", b).unwrap();

        // Only the diverging byte adds a node.
        assert_eq!(builder.node_count(), nodes_after_first + 1);
    }

    #[test]
    fn test_pool_interning_dedupes_values() {
        let mut builder = DatasetBuilder::new();
        let vendor = builder.add_property("Vendor", PropertyType::Text);
        builder
            .add_profile(vec![(vendor, "Apple".into())])
            .unwrap();
        builder
            .add_profile(vec![(vendor, "Apple".into())])
            .unwrap();

        let mut single = DatasetBuilder::new();
        let vendor = single.add_property("Vendor", PropertyType::Text);
        single
            .add_profile(vec![(vendor, "Apple".into())])
            .unwrap();

        let two = builder.build().unwrap();
        let one = single.build().unwrap();

        // The duplicated value adds a profile record and entry but no
        // pool bytes.
        let pool_size = |data: &[u8]| {
            u32::from_le_bytes([data[0x44], data[0x45], data[0x46], data[0x47]])
        };
        assert_eq!(pool_size(&two), pool_size(&one));
    }
}
