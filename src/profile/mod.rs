//! Profile store: display metadata for staff identities and device nodes.
//!
//! The pipeline only reads profiles. [`ProfileDirectory`] is a file-backed
//! store loaded from a directory of TOML files, each holding any number of
//! `[[staff]]` and `[[node]]` tables.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{NodeProfile, StaffProfile};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn staff(&self, identity: &str) -> Result<Option<StaffProfile>>;

    async fn node(&self, node_id: &str) -> Result<Option<NodeProfile>>;
}

/// Top-level TOML layout of one profile file.
#[derive(Debug, Default, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    staff: Vec<StaffProfile>,
    #[serde(default)]
    node: Vec<NodeProfile>,
}

/// Profiles loaded from disk, indexed by identity and node ID.
#[derive(Debug, Default)]
pub struct ProfileDirectory {
    staff: HashMap<String, StaffProfile>,
    nodes: HashMap<String, NodeProfile>,
}

impl ProfileDirectory {
    /// Create an empty directory with no profiles.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load all `.toml` files from a directory. Later files override earlier
    /// ones (files are read in name order).
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Profile(format!("cannot read profile dir {}: {e}", dir.display()))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut directory = Self::empty();
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            let file: ProfileFile = toml::from_str(&content).map_err(|e| {
                Error::Profile(format!("bad profile file {}: {e}", path.display()))
            })?;
            debug!(
                path = %path.display(),
                staff = file.staff.len(),
                nodes = file.node.len(),
                "loaded profile file"
            );
            for staff in file.staff {
                directory.insert_staff(staff);
            }
            for node in file.node {
                directory.insert_node(node);
            }
        }

        Ok(directory)
    }

    pub fn insert_staff(&mut self, profile: StaffProfile) {
        self.staff.insert(profile.identity.clone(), profile);
    }

    pub fn insert_node(&mut self, profile: NodeProfile) {
        self.nodes.insert(profile.node_id.clone(), profile);
    }

    /// All staff profiles, sorted by identity.
    pub fn staff_profiles(&self) -> Vec<&StaffProfile> {
        let mut all: Vec<_> = self.staff.values().collect();
        all.sort_by(|a, b| a.identity.cmp(&b.identity));
        all
    }

    /// All node profiles, sorted by node ID.
    pub fn node_profiles(&self) -> Vec<&NodeProfile> {
        let mut all: Vec<_> = self.nodes.values().collect();
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }
}

#[async_trait]
impl ProfileStore for ProfileDirectory {
    async fn staff(&self, identity: &str) -> Result<Option<StaffProfile>> {
        Ok(self.staff.get(identity).cloned())
    }

    async fn node(&self, node_id: &str) -> Result<Option<NodeProfile>> {
        Ok(self.nodes.get(node_id).cloned())
    }
}
