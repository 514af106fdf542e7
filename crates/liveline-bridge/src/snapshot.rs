//! Snapshots of cache entries populated during server-side rendering.
//!
//! A server scope dehydrates its cache into a [`Snapshot`] after loaders have resolved. The
//! client scope hydrates its own cache from the snapshot before any reader runs, so hydrated
//! reads resolve without waiting for a subscription.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::Descriptor;
use crate::BridgeResult;

/// A dehydrated cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// The stable hash of the descriptor.
    pub hash: String,
    /// The descriptor of the entry.
    pub descriptor: Descriptor,
    /// The value of the entry.
    pub value: Value,
}

/// Serialized ready entries of a cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub(crate) fn new(mut entries: Vec<SnapshotEntry>) -> Self {
        entries.sort_by(|l, r| l.hash.cmp(&r.hash));

        Self { entries }
    }

    /// Returns the entries.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes the snapshot as JSON.
    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encodes the snapshot as JSON that can be embedded in a `<script>` element.
    ///
    /// `<`, `>` and `&` are escaped so the content can never close the element.
    pub fn to_script_json(&self) -> BridgeResult<String> {
        let s = self.to_json()?;
        let mut escaped = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '<' => escaped.push_str("\\u003c"),
                '>' => escaped.push_str("\\u003e"),
                '&' => escaped.push_str("\\u0026"),
                m => escaped.push(m),
            }
        }

        Ok(escaped)
    }

    /// Decodes a snapshot from JSON.
    pub fn from_json(s: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::KeyCodec;

    fn entry(operation: &str, value: Value) -> SnapshotEntry {
        let descriptor = Descriptor::unit(operation).unwrap();

        SnapshotEntry {
            hash: KeyCodec::hash(&descriptor).unwrap(),
            descriptor,
            value,
        }
    }

    #[test]
    fn script_json_cannot_close_the_element() {
        let snapshot = Snapshot::new(vec![entry(
            "notes:get",
            json!("</script><script>alert(1)</script>"),
        )]);

        let s = snapshot.to_script_json().unwrap();
        assert!(!s.contains("</script>"));
        assert!(!s.contains('<'));

        // the escaped form is still valid JSON.
        assert_eq!(Snapshot::from_json(&s).unwrap(), snapshot);
    }

    #[test]
    fn entries_are_ordered_by_hash() {
        let snapshot = Snapshot::new(vec![
            entry("todos:list", json!([])),
            entry("todos:count", json!(0)),
            entry("users:me", json!(null)),
        ]);

        let hashes = snapshot
            .entries()
            .iter()
            .map(|m| m.hash.as_str())
            .collect::<Vec<_>>();
        let mut sorted = hashes.clone();
        sorted.sort_unstable();

        assert_eq!(hashes, sorted);
        assert_eq!(snapshot.len(), 3);
    }
}
