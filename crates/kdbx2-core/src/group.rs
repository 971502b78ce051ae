//! Group types: the hierarchical containers of entries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::{Entry, Times};

/// A group of entries and subgroups.
///
/// Field order is document order in the serialized file: entries come
/// before subgroups, which is also the order the inner stream cipher
/// walks protected values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "UUID", with = "crate::xml::uuid_b64")]
    pub uuid: Uuid,

    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "IconID", default, skip_serializing_if = "Option::is_none")]
    pub icon_id: Option<i32>,

    #[serde(rename = "Times", default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Times>,

    #[serde(rename = "Entry", default)]
    pub entries: Vec<Entry>,

    #[serde(rename = "Group", default)]
    pub groups: Vec<Group>,
}

impl Group {
    /// Create a group with a fresh UUID and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            icon_id: None,
            times: Some(Times::now()),
            entries: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// All entries under this group, depth first, entries before subgroups.
    pub fn entries_recursive(&self) -> Vec<&Entry> {
        let mut out: Vec<&Entry> = self.entries.iter().collect();
        for group in &self.groups {
            out.extend(group.entries_recursive());
        }
        out
    }
}

/// Builder for creating groups.
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            group: Group::new(name),
        }
    }

    pub fn icon(mut self, icon_id: i32) -> Self {
        self.group.icon_id = Some(icon_id);
        self
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        self.group.entries.push(entry);
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.group.groups.push(group);
        self
    }

    pub fn build(self) -> Group {
        self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryBuilder;

    #[test]
    fn entries_recursive_walks_entries_before_subgroups() {
        let inner = GroupBuilder::new("inner")
            .entry(EntryBuilder::new("deep").build())
            .build();
        let group = GroupBuilder::new("outer")
            .entry(EntryBuilder::new("shallow").build())
            .group(inner)
            .build();

        let titles: Vec<_> = group
            .entries_recursive()
            .iter()
            .map(|e| e.title().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["shallow", "deep"]);
    }
}
