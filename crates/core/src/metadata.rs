//! Layered key/value metadata stamped onto a unit of work.
//!
//! A [`Metadata`] value is never mutated once built. Adding entries with
//! [`Metadata::layer`] returns a new value whose lookups fall back to the
//! layer it was built on, so a child sees every ancestor entry it does not
//! override.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable, cheaply cloneable metadata.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    layer: Option<Arc<Layer>>,
}

#[derive(Debug)]
struct Layer {
    entries: BTreeMap<String, String>,
    parent: Metadata,
}

impl Metadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a new value with `entries` layered over `self`.
    pub fn layer<I, K, V>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: BTreeMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if entries.is_empty() {
            return self.clone();
        }
        Self {
            layer: Some(Arc::new(Layer {
                entries,
                parent: self.clone(),
            })),
        }
    }

    /// Look up a key, nearest layer first.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut current = self.layer.as_deref();
        while let Some(layer) = current {
            if let Some(value) = layer.entries.get(key) {
                return Some(value.as_str());
            }
            current = layer.parent.layer.as_deref();
        }
        None
    }

    /// Whether any layer defines `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Whether no layer holds any entry.
    pub fn is_empty(&self) -> bool {
        self.layer.is_none()
    }

    /// Flatten every layer into one map; nearer layers win.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut chain = Vec::new();
        let mut current = self.layer.as_deref();
        while let Some(layer) = current {
            chain.push(&layer.entries);
            current = layer.parent.layer.as_deref();
        }

        let mut flat = BTreeMap::new();
        for entries in chain.into_iter().rev() {
            for (k, v) in entries {
                flat.insert(k.clone(), v.clone());
            }
        }
        flat
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Metadata::new().layer(iter)
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.to_map() == other.to_map()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}
