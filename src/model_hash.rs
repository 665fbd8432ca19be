//! Content hash of a kinematic model, used as the cache key of its self-collision matrix.
//!
//! The hash is computed over the canonical URDF text (see [`KinematicGraph::to_urdf`]), so two
//! models hash equal exactly when they serialize to the same description. Any change to a link,
//! joint, limit, origin or geometry produces a different key.

use std::fmt;
use sha2::{Digest, Sha256};
use crate::kinematic_graph::KinematicGraph;

/// Lowercase hex SHA-256 digest of a robot description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHash(String);

impl ModelHash {
    pub fn of_description(description: &str) -> Self {
        let digest = Sha256::digest(description.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            hex.push_str(&format!("{:02x}", byte));
        }
        ModelHash(hex)
    }

    pub fn of_graph(graph: &KinematicGraph) -> Self {
        Self::of_description(&graph.to_urdf())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
