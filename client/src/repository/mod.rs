//! Repository descriptor: refs, releases, languages, types and tags, plus the TTL cache in
//! front of the metadata endpoint.

mod cache;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use cache::{MetadataCache, DEFAULT_METADATA_TTL};

/// A content version. The master ref is the latest published content; every other ref is a
/// release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ref {
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub is_master_ref: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// The metadata document served at the API endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    #[serde(default)]
    pub refs: Vec<Ref>,
    #[serde(default)]
    pub integration_fields_ref: Option<String>,
    #[serde(default)]
    pub languages: Vec<Language>,
    #[serde(default)]
    pub types: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub forms: BTreeMap<String, Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

impl Repository {
    pub fn master_ref(&self) -> Option<&Ref> {
        self.refs.iter().find(|r| r.is_master_ref)
    }

    /// Every non-master ref.
    pub fn releases(&self) -> impl Iterator<Item = &Ref> {
        self.refs.iter().filter(|r| !r.is_master_ref)
    }

    pub fn ref_by_id(&self, id: &str) -> Option<&Ref> {
        self.refs.iter().find(|r| r.id == id)
    }

    pub fn ref_by_label(&self, label: &str) -> Option<&Ref> {
        self.refs.iter().find(|r| r.label == label)
    }

    pub fn release_by_id(&self, id: &str) -> Option<&Ref> {
        self.releases().find(|r| r.id == id)
    }

    pub fn release_by_label(&self, label: &str) -> Option<&Ref> {
        self.releases().find(|r| r.label == label)
    }
}
