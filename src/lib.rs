//! uatrie - A high-performance User-Agent device detection engine.
//!
//! This crate identifies the device, browser, and platform
//! characteristics of an HTTP client from its User-Agent string, using a
//! precompiled trie dataset in a compact binary format.
//!
//! # Features
//!
//! - **Closest-match trie lookup**: byte-wise traversal that always
//!   resolves to a device profile, even for never-seen input
//! - **Memory-mapped binary format**: datasets load in one validated
//!   pass with no per-node allocation
//! - **Lazy property decoding**: values stay in the mapped pool until a
//!   caller asks for them
//! - **Thread-safe**: one provider serves any number of concurrent
//!   lookups without locking
//! - **Result caching**: optional LRU cache keyed by input bytes
//! - **Gzip datasets**: compressed dataset files load transparently
//!
//! # Quick Start
//!
//! ```ignore
//! use uatrie::Provider;
//! use std::path::Path;
//!
//! // Load a dataset once at startup
//! let provider = Provider::open(Path::new("devices.trie"))?;
//!
//! // Match a User-Agent and read properties lazily
//! let result = provider.match_ua("Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) ...")?;
//! println!("device = {}", result.get("DeviceName")?);
//! println!("mobile = {}", result.get("IsMobile")?);
//!
//! // Tear down when done; in-flight results stay valid
//! provider.close();
//! ```
//!
//! # Matching Semantics
//!
//! Matching is byte-exact and case-sensitive, exactly as the dataset was
//! trained. Input that diverges from every trained pattern degrades
//! gracefully: each node carries the profile of its closest leaf, so the
//! walk stops at the deepest reachable node and returns that annotation.
//! Empty input and input sharing no prefix with any pattern resolve to
//! the dataset's reserved unknown-device profile.
//!
//! # Building Datasets
//!
//! The offline training pipeline is a separate system; this crate ships
//! [`DatasetBuilder`] as the serialization target it (and the test
//! suite) writes through.

mod error;
mod matcher;
mod metadata;
mod property;
mod provider;
mod resolver;

pub mod binary;

// Re-export core types
pub use error::{Error, Result};
pub use property::{PropertyType, Value};

// Re-export matching types
pub use matcher::{LeafRef, MAX_MATCH_DEPTH};

// Re-export the provider facade
pub use provider::{CacheStats, MatchResult, Provider, ProviderConfig};

// Re-export metadata
pub use metadata::DatasetMetadata;

// Re-export dataset access and construction for advanced usage
pub use binary::{DatasetBuilder, DatasetReader, DatasetWriter, PatternStep, PropertyValue};
