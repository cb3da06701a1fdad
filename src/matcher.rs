//! Closest-match trie traversal.
//!
//! Matching walks the node table one input byte at a time. At each node
//! the byte is looked up in the node's explicit-child table; failing
//! that, the node's default (closest-match) child consumes the byte; and
//! when neither exists the walk stops and the node's closest-leaf
//! annotation is the answer. The walk is total: any byte sequence,
//! including empty and non-UTF8 input, resolves to a profile.

use crate::binary::{DatasetReader, NodeRecord, NO_NODE, ROOT_NODE, UNKNOWN_PROFILE};

/// Maximum traversal depth.
///
/// Bounds worst-case latency on adversarially long input. Real trained
/// tries are far shallower than this.
pub const MAX_MATCH_DEPTH: usize = 512;

/// Reference to the leaf a match resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafRef {
    /// Index of the node where traversal stopped.
    pub node: u32,
    /// Index of the matched device profile.
    pub profile: u32,
}

impl DatasetReader {
    /// Match a User-Agent string to its closest device profile.
    pub fn match_ua(&self, user_agent: &str) -> LeafRef {
        self.match_bytes(user_agent.as_bytes())
    }

    /// Match an arbitrary byte sequence to its closest device profile.
    ///
    /// Matching is byte-exact and case-sensitive; this never fails and
    /// never allocates. Identical input on an identical dataset always
    /// returns the identical leaf.
    pub fn match_bytes(&self, input: &[u8]) -> LeafRef {
        let mut node_index = ROOT_NODE;
        let mut node: NodeRecord = match self.node(node_index) {
            Some(n) => n,
            // Unreachable on a validated dataset; degrade to the
            // reserved unknown-device profile rather than panic.
            None => {
                return LeafRef {
                    node: ROOT_NODE,
                    profile: UNKNOWN_PROFILE,
                }
            }
        };

        for (depth, &byte) in input.iter().enumerate() {
            if depth >= MAX_MATCH_DEPTH {
                break;
            }

            let next = match self.lookup_child(&node, byte) {
                Some(child) => child,
                None if node.default_child != NO_NODE => node.default_child,
                None => break,
            };

            match self.node(next) {
                Some(n) => {
                    node_index = next;
                    node = n;
                }
                None => break,
            }
        }

        LeafRef {
            node: node_index,
            profile: node.profile_index,
        }
    }
}
