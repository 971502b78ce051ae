//! The top-level KeePass document: metadata plus the root group tree.

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::group::Group;

/// A complete KeePass document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeePassFile {
    #[serde(rename = "Meta", default)]
    pub meta: Meta,

    #[serde(rename = "Root", default)]
    pub root: Root,
}

impl KeePassFile {
    /// All entries in the document, depth first.
    pub fn entries(&self) -> Vec<&Entry> {
        self.root
            .groups
            .iter()
            .flat_map(|group| group.entries_recursive())
            .collect()
    }
}

/// Database metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "Generator", default)]
    pub generator: String,

    #[serde(rename = "DatabaseName", default)]
    pub database_name: String,

    #[serde(
        rename = "DatabaseDescription",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub database_description: String,
}

/// The document root; holds the top-level groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Root {
    #[serde(rename = "Group", default)]
    pub groups: Vec<Group>,
}

/// Builder for a writable document: metadata plus a top group named after
/// the database.
pub struct KeePassFileBuilder {
    meta: Meta,
    top_group: Group,
}

impl KeePassFileBuilder {
    pub fn new(database_name: impl Into<String>) -> Self {
        let database_name = database_name.into();
        Self {
            meta: Meta {
                generator: "kdbx2-core".to_string(),
                database_name: database_name.clone(),
                database_description: String::new(),
            },
            top_group: Group::new(database_name),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.database_description = description.into();
        self
    }

    /// Add entries directly under the top group.
    pub fn add_top_entries(mut self, entries: impl IntoIterator<Item = Entry>) -> Self {
        self.top_group.entries.extend(entries);
        self
    }

    /// Add subgroups under the top group.
    pub fn add_top_groups(mut self, groups: impl IntoIterator<Item = Group>) -> Self {
        self.top_group.groups.extend(groups);
        self
    }

    pub fn build(self) -> KeePassFile {
        KeePassFile {
            meta: self.meta,
            root: Root {
                groups: vec![self.top_group],
            },
        }
    }
}
