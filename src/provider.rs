//! Provider facade owning a loaded dataset.
//!
//! The provider performs exactly one load at `open`, serves concurrent
//! lookups against the immutable dataset without locking, and tears the
//! dataset down at `close`. Match results hold their own reference to
//! the dataset, so `close` is safe to call while lookups are in flight;
//! the mapping is released when the last reference drops.

use arc_swap::ArcSwapOption;
use quick_cache::sync::Cache;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::binary::DatasetReader;
use crate::matcher::LeafRef;
use crate::metadata::DatasetMetadata;
use crate::{Error, Result, Value};

/// Default cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Gzip file magic.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Cache entry key for a match input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    /// Hash of the raw input bytes. Matching is case-sensitive, so the
    /// key is too.
    hash: u64,
}

impl CacheKey {
    fn new(input: &[u8]) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = ahash::AHasher::default();
        input.hash(&mut hasher);
        Self {
            hash: hasher.finish(),
        }
    }
}

/// Configuration for a provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Maximum number of entries in the match cache.
    pub cache_capacity: usize,
    /// Whether to enable the match cache.
    pub cache_enabled: bool,
    /// Restrict `get_all`/CSV output to these properties. Names not
    /// defined in the dataset are skipped with a warning. `None` means
    /// all properties.
    pub required_properties: Option<Vec<String>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_enabled: true,
            required_properties: None,
        }
    }
}

impl ProviderConfig {
    /// Create a new configuration with the specified cache capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache_capacity: capacity,
            cache_enabled: true,
            required_properties: None,
        }
    }

    /// Create a configuration with caching disabled.
    pub fn no_cache() -> Self {
        Self {
            cache_capacity: 0,
            cache_enabled: false,
            required_properties: None,
        }
    }

    /// Restrict resolved output to the named properties.
    pub fn with_properties(mut self, names: &[&str]) -> Self {
        self.required_properties = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Device detection provider.
///
/// # Example
///
/// ```ignore
/// use uatrie::Provider;
/// use std::path::Path;
///
/// let provider = Provider::open(Path::new("devices.trie"))?;
/// let result = provider.match_ua("Mozilla/5.0 (iPhone; ...)")?;
/// let device = result.get("DeviceName")?;
/// provider.close();
/// ```
pub struct Provider {
    /// The loaded dataset; `None` once the provider is closed.
    dataset: ArcSwapOption<DatasetReader>,
    /// LRU cache of match results.
    cache: Option<Cache<u64, LeafRef>>,
    /// Preselected property indexes, when configured.
    required: Option<Arc<[u16]>>,
    /// Configuration.
    config: ProviderConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Provider {
    /// Open a dataset file with default configuration.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, ProviderConfig::default())
    }

    /// Open a dataset file with custom configuration.
    ///
    /// Gzip-compressed files are detected by magic and inflated before
    /// loading.
    pub fn open_with_config(path: &Path, config: ProviderConfig) -> Result<Self> {
        let reader = if is_gzip_file(path)? {
            let raw = std::fs::read(path)?;
            DatasetReader::from_bytes(decompress(&raw)?)?
        } else {
            DatasetReader::open(path)?
        };
        Self::build(reader, config)
    }

    /// Create a provider from dataset bytes with default configuration.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_config(data, ProviderConfig::default())
    }

    /// Create a provider from dataset bytes with custom configuration.
    pub fn from_bytes_with_config(data: Vec<u8>, config: ProviderConfig) -> Result<Self> {
        let data = if data.len() >= 2 && data[..2] == GZIP_MAGIC {
            decompress(&data)?
        } else {
            data
        };
        let reader = DatasetReader::from_bytes(data)?;
        Self::build(reader, config)
    }

    fn build(reader: DatasetReader, config: ProviderConfig) -> Result<Self> {
        let required = match &config.required_properties {
            Some(names) => {
                let mut indexes = Vec::with_capacity(names.len());
                for name in names {
                    match reader.property_index(name) {
                        Some(index) => indexes.push(index),
                        None => log::warn!("unknown required property: {}", name),
                    }
                }
                Some(Arc::from(indexes.as_slice()))
            }
            None => None,
        };

        let cache = if config.cache_enabled && config.cache_capacity > 0 {
            Some(Cache::new(config.cache_capacity))
        } else {
            None
        };

        Ok(Self {
            dataset: ArcSwapOption::from_pointee(reader),
            cache,
            required,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Match a User-Agent string with caching.
    pub fn match_ua(&self, user_agent: &str) -> Result<MatchResult> {
        self.match_bytes(user_agent.as_bytes())
    }

    /// Match an arbitrary byte sequence with caching.
    ///
    /// Fails only with [`Error::ProviderClosed`]; any input, including
    /// empty or non-UTF8 bytes, resolves to a profile.
    pub fn match_bytes(&self, input: &[u8]) -> Result<MatchResult> {
        let guard = self.dataset.load();
        let dataset = guard.as_ref().ok_or(Error::ProviderClosed)?.clone();

        let leaf = match &self.cache {
            Some(cache) => {
                let key = CacheKey::new(input).hash;
                match cache.get(&key) {
                    Some(leaf) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        leaf
                    }
                    None => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        let leaf = dataset.match_bytes(input);
                        cache.insert(key, leaf);
                        leaf
                    }
                }
            }
            None => dataset.match_bytes(input),
        };

        Ok(MatchResult {
            dataset,
            leaf,
            required: self.required.clone(),
        })
    }

    /// Metadata of the loaded dataset.
    pub fn metadata(&self) -> Result<DatasetMetadata> {
        let guard = self.dataset.load();
        let dataset = guard.as_ref().ok_or(Error::ProviderClosed)?;
        Ok(DatasetMetadata::from_reader(dataset))
    }

    /// Get a handle to the underlying dataset.
    ///
    /// Primarily for inspection/debugging and low-level access.
    pub fn dataset(&self) -> Result<Arc<DatasetReader>> {
        let guard = self.dataset.load();
        guard.as_ref().cloned().ok_or(Error::ProviderClosed)
    }

    /// Close the provider.
    ///
    /// Atomically drops the dataset handle and clears the cache. Match
    /// calls issued after this fail with [`Error::ProviderClosed`];
    /// results obtained before stay valid through their own reference.
    pub fn close(&self) {
        self.dataset.store(None);
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        log::info!("provider closed");
    }

    /// Whether the provider has been closed.
    pub fn is_closed(&self) -> bool {
        self.dataset.load().is_none()
    }

    /// Clear the match cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        let (capacity, len, enabled) = match &self.cache {
            Some(cache) => (self.config.cache_capacity, cache.len(), true),
            None => (0, 0, false),
        };
        CacheStats {
            capacity,
            len,
            enabled,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Maximum cache capacity.
    pub capacity: usize,
    /// Current number of entries in the cache.
    pub len: usize,
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that fell through to the trie.
    pub misses: u64,
}

/// Result of matching one input against the dataset.
///
/// Properties are resolved lazily on demand, never eagerly at match
/// time.
pub struct MatchResult {
    dataset: Arc<DatasetReader>,
    leaf: LeafRef,
    required: Option<Arc<[u16]>>,
}

impl MatchResult {
    /// The matched leaf reference.
    pub fn leaf(&self) -> LeafRef {
        self.leaf
    }

    /// The matched device profile identifier.
    pub fn profile_id(&self) -> u32 {
        self.leaf.profile
    }

    /// Resolve one property by name.
    pub fn get(&self, name: &str) -> Result<Value<'_>> {
        self.dataset.resolve(self.leaf, name)
    }

    /// Resolve the profile's properties in its own entry order.
    ///
    /// Honors the provider's required-properties preselection when one
    /// was configured; properties the profile does not carry are
    /// skipped.
    pub fn get_all(&self) -> Result<Vec<(&str, Value<'_>)>> {
        match &self.required {
            None => self.dataset.resolve_all(self.leaf),
            Some(ids) => {
                let mut resolved = Vec::with_capacity(ids.len());
                for &id in ids.iter() {
                    match self.dataset.resolve_by_id(self.leaf, id) {
                        Ok(value) => resolved.push((self.dataset.property_name(id)?, value)),
                        Err(Error::PropertyNotFound(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(resolved)
            }
        }
    }

    /// Render the matched profile as `name|value` lines.
    pub fn to_csv(&self) -> Result<String> {
        use std::fmt::Write;

        let mut out = String::new();
        for (name, value) in self.get_all()? {
            // Formatting into a String cannot fail.
            let _ = writeln!(out, "{}|{}", name, value);
        }
        Ok(out)
    }
}

fn is_gzip_file(path: &Path) -> Result<bool> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        // Shorter than two bytes: not gzip; the loader will reject it.
        Err(_) => Ok(false),
    }
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
