//! Keyed storage of the inputs, outputs and metadata attached to a pipeline.
//!
//! Every entry is addressed by `(section, index)`. Adding an existing entry
//! and reading an absent one are both errors; entries are never removed
//! individually. Metadata is a single flat bucket: indexed entries and
//! [`Resources::merge_metadata`] write into the same map.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::{Error, Params};

/// The three resource sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Inputs,
    Outputs,
    Metadata,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Inputs => "inputs",
            Section::Outputs => "outputs",
            Section::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource registry of one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    inputs: BTreeMap<String, Params>,
    outputs: BTreeMap<String, Params>,
    metadata: Params,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `payload` under `(section, index)`.
    pub fn add(&mut self, section: Section, index: impl Into<String>, payload: Params) -> Result<()> {
        let index = index.into();
        let present = match section {
            Section::Inputs => self.inputs.contains_key(&index),
            Section::Outputs => self.outputs.contains_key(&index),
            Section::Metadata => self.metadata.contains(&index),
        };
        if present {
            return Err(Error::DuplicateResource {
                section: section.to_string(),
                index,
            });
        }
        match section {
            Section::Inputs => {
                self.inputs.insert(index, payload);
            }
            Section::Outputs => {
                self.outputs.insert(index, payload);
            }
            Section::Metadata => {
                self.metadata.insert(index, payload.into_value());
            }
        }
        Ok(())
    }

    /// Shallow merge `payload` into the entry at `(section, index)`,
    /// creating it when absent.
    pub fn update(&mut self, section: Section, index: impl Into<String>, payload: &Params) {
        let index = index.into();
        match section {
            Section::Inputs => self.inputs.entry(index).or_default().merge(payload),
            Section::Outputs => self.outputs.entry(index).or_default().merge(payload),
            Section::Metadata => {
                let mut entry = self
                    .metadata
                    .remove(&index)
                    .and_then(|v| Params::from_value(v).ok())
                    .unwrap_or_default();
                entry.merge(payload);
                self.metadata.insert(index, entry.into_value());
            }
        }
    }

    /// Append to a file section under the next free 1-based numeric index.
    /// Returns the index used.
    pub fn push(&mut self, section: Section, payload: Params) -> Result<String> {
        let count = match section {
            Section::Inputs => self.inputs.len(),
            Section::Outputs => self.outputs.len(),
            Section::Metadata => self.metadata.len(),
        };
        let mut n = count + 1;
        let index = loop {
            let candidate = n.to_string();
            let taken = match section {
                Section::Inputs => self.inputs.contains_key(&candidate),
                Section::Outputs => self.outputs.contains_key(&candidate),
                Section::Metadata => self.metadata.contains(&candidate),
            };
            if !taken {
                break candidate;
            }
            n += 1;
        };
        self.add(section, index.clone(), payload)?;
        Ok(index)
    }

    /// Payload stored under `(section, index)`.
    ///
    /// Metadata entries must hold an object; use [`Resources::metadata`]
    /// for scalar values.
    pub fn get(&self, section: Section, index: &str) -> Result<Params> {
        let missing = || Error::MissingResource {
            section: section.to_string(),
            index: index.to_string(),
        };
        match section {
            Section::Inputs => self.inputs.get(index).cloned().ok_or_else(missing),
            Section::Outputs => self.outputs.get(index).cloned().ok_or_else(missing),
            Section::Metadata => {
                let value = self.metadata.get(index).cloned().ok_or_else(missing)?;
                Params::from_value(value)
            }
        }
    }

    /// `path` of the file resource at `(section, index)`.
    pub fn path(&self, section: Section, index: &str) -> Result<PathBuf> {
        self.get(section, index)?.require_path("path")
    }

    /// Every entry of a section, numeric indexes first in numeric order.
    pub fn get_all(&self, section: Section) -> Vec<(String, Params)> {
        let mut all: Vec<(String, Params)> = match section {
            Section::Inputs => self.inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Section::Outputs => self.outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Section::Metadata => self
                .metadata
                .iter()
                .filter_map(|(k, v)| Params::from_value(v.clone()).ok().map(|p| (k.clone(), p)))
                .collect(),
        };
        all.sort_by(|(a, _), (b, _)| index_order(a, b));
        all
    }

    pub fn contains(&self, section: Section, index: &str) -> bool {
        match section {
            Section::Inputs => self.inputs.contains_key(index),
            Section::Outputs => self.outputs.contains_key(index),
            Section::Metadata => self.metadata.contains(index),
        }
    }

    pub fn len(&self, section: Section) -> usize {
        match section {
            Section::Inputs => self.inputs.len(),
            Section::Outputs => self.outputs.len(),
            Section::Metadata => self.metadata.len(),
        }
    }

    /// Shallow, last-write-wins merge into the metadata bucket.
    pub fn merge_metadata(&mut self, map: &Params) {
        self.metadata.merge(map);
    }

    /// Set a single metadata key, replacing any previous value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key, value);
    }

    pub fn metadata(&self) -> &Params {
        &self.metadata
    }
}

fn index_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
