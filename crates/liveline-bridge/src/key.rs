//! Query descriptors and their cache keys.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::finite;
use crate::{BridgeError, BridgeResult};

/// Identifies a remote read by operation name and arguments.
///
/// Arguments are kept in a sorted map, so two descriptors built from the same arguments in a
/// different insertion order are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    operation: String,
    arguments: BTreeMap<String, Value>,
}

impl Descriptor {
    /// Creates a descriptor.
    ///
    /// `arguments` must serialize into an object, or into unit / null for an operation without
    /// arguments.
    pub fn new<O, A>(operation: O, arguments: A) -> BridgeResult<Self>
    where
        O: Into<String>,
        A: Serialize,
    {
        let operation = operation.into();
        validate_operation(&operation)?;

        if let Err(e) = finite::check(&arguments) {
            return Err(BridgeError::InvalidDescriptor(format!(
                "arguments of `{operation}` are not serializable: {e}"
            )));
        }

        let arguments = match serde_json::to_value(arguments) {
            Ok(Value::Object(m)) => m.into_iter().collect(),
            Ok(Value::Null) => BTreeMap::new(),
            Ok(m) => {
                return Err(BridgeError::InvalidDescriptor(format!(
                    "arguments of `{operation}` must be an object, found {}",
                    kind_of(&m)
                )))
            }
            Err(e) => {
                return Err(BridgeError::InvalidDescriptor(format!(
                    "arguments of `{operation}` are not serializable: {e}"
                )))
            }
        };

        Ok(Self {
            operation,
            arguments,
        })
    }

    /// Creates a descriptor without arguments.
    pub fn unit<O>(operation: O) -> BridgeResult<Self>
    where
        O: Into<String>,
    {
        Self::from_parts(operation, BTreeMap::new())
    }

    /// Creates a descriptor from an argument map.
    pub fn from_parts<O>(operation: O, arguments: BTreeMap<String, Value>) -> BridgeResult<Self>
    where
        O: Into<String>,
    {
        let operation = operation.into();
        validate_operation(&operation)?;

        Ok(Self {
            operation,
            arguments,
        })
    }

    /// Returns the operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the arguments.
    pub fn arguments(&self) -> &BTreeMap<String, Value> {
        &self.arguments
    }

    /// Returns the arguments as a JSON object.
    pub fn arguments_value(&self) -> Value {
        Value::Object(
            self.arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.operation)?;
        f.write_str("(")?;
        for (index, (k, v)) in self.arguments.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str(")")
    }
}

fn validate_operation(operation: &str) -> BridgeResult<()> {
    if operation.trim().is_empty() {
        return Err(BridgeError::InvalidDescriptor(
            "operation name must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The key of a cache entry.
///
/// Equality is decided by the canonical encoding of the descriptor, never by the hash alone.
#[derive(Clone)]
pub struct CacheKey {
    canonical: Arc<str>,
    hash: Arc<str>,
}

impl CacheKey {
    /// Returns the canonical encoding of the descriptor.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Returns the stable hash of the descriptor.
    ///
    /// The hash does not change between process restarts and can be persisted.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.canonical).finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Canonicalizes descriptors into cache keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCodec;

impl KeyCodec {
    /// Returns the cache key of a descriptor.
    pub fn canonicalize(descriptor: &Descriptor) -> BridgeResult<CacheKey> {
        let canonical = Self::encode(descriptor)?;
        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));

        Ok(CacheKey {
            canonical: canonical.into(),
            hash: hash.into(),
        })
    }

    /// Returns the stable hash of a descriptor.
    pub fn hash(descriptor: &Descriptor) -> BridgeResult<String> {
        Self::canonicalize(descriptor).map(|m| m.hash().to_owned())
    }

    fn encode(descriptor: &Descriptor) -> BridgeResult<String> {
        // descriptors may also come from deserialization.
        validate_operation(descriptor.operation())?;

        let mut s = String::with_capacity(descriptor.operation().len() + 16);
        s.push_str(descriptor.operation());
        s.push(':');

        s.push('{');
        for (index, (k, v)) in descriptor.arguments().iter().enumerate() {
            if index > 0 {
                s.push(',');
            }
            write_string(&mut s, k)?;
            s.push(':');
            write_canonical(&mut s, v)?;
        }
        s.push('}');

        Ok(s)
    }
}

fn write_string(s: &mut String, value: &str) -> BridgeResult<()> {
    s.push_str(&serde_json::to_string(value)?);
    Ok(())
}

// Objects are written in lexical key order regardless of how the map preserves order.
fn write_canonical(s: &mut String, value: &Value) -> BridgeResult<()> {
    match value {
        Value::Object(m) => {
            let mut entries = m.iter().collect::<Vec<_>>();
            entries.sort_unstable_by(|l, r| l.0.cmp(r.0));

            s.push('{');
            for (index, (k, v)) in entries.into_iter().enumerate() {
                if index > 0 {
                    s.push(',');
                }
                write_string(s, k)?;
                s.push(':');
                write_canonical(s, v)?;
            }
            s.push('}');
        }
        Value::Array(m) => {
            s.push('[');
            for (index, v) in m.iter().enumerate() {
                if index > 0 {
                    s.push(',');
                }
                write_canonical(s, v)?;
            }
            s.push(']');
        }
        m => s.push_str(&serde_json::to_string(m)?),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn argument_order_is_irrelevant() {
        let left =
            Descriptor::new("todos:list", json!({ "a": 1, "b": { "y": 2, "x": 1 } })).unwrap();

        let mut right = serde_json::Map::new();
        right.insert("b".into(), json!({ "x": 1, "y": 2 }));
        right.insert("a".into(), json!(1));
        let right = Descriptor::new("todos:list", right).unwrap();

        assert_eq!(left, right);
        assert_eq!(
            KeyCodec::canonicalize(&left).unwrap(),
            KeyCodec::canonicalize(&right).unwrap()
        );
        assert_eq!(
            KeyCodec::hash(&left).unwrap(),
            KeyCodec::hash(&right).unwrap()
        );
    }

    #[test]
    fn canonical_form_is_stable() {
        let descriptor = Descriptor::new("todos:list", json!({ "b": [1, 2], "a": "x" })).unwrap();
        let key = KeyCodec::canonicalize(&descriptor).unwrap();

        assert_eq!(key.canonical(), r#"todos:list:{"a":"x","b":[1,2]}"#);
        // sha256 of the canonical form, persisted in snapshots.
        assert_eq!(key.hash().len(), 64);
        assert_eq!(
            key.hash(),
            hex::encode(Sha256::digest(br#"todos:list:{"a":"x","b":[1,2]}"#))
        );
    }

    #[test]
    fn unit_arguments() {
        let from_unit = Descriptor::new("todos:list", ()).unwrap();
        let from_empty = Descriptor::new("todos:list", json!({})).unwrap();

        assert_eq!(from_unit, from_empty);
        assert_eq!(from_unit, Descriptor::unit("todos:list").unwrap());
        assert_eq!(
            KeyCodec::canonicalize(&from_unit).unwrap().canonical(),
            "todos:list:{}"
        );
    }

    #[test]
    fn operation_participates_in_key() {
        let left = KeyCodec::canonicalize(&Descriptor::unit("todos:list").unwrap()).unwrap();
        let right = KeyCodec::canonicalize(&Descriptor::unit("todos:count").unwrap()).unwrap();

        assert_ne!(left, right);
        assert_ne!(left.hash(), right.hash());
    }

    #[test]
    fn rejects_empty_operation() {
        assert!(matches!(
            Descriptor::unit(""),
            Err(BridgeError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            Descriptor::new("  ", json!({})),
            Err(BridgeError::InvalidDescriptor(_))
        ));

        let forged: Descriptor =
            serde_json::from_value(json!({ "operation": "", "arguments": {} })).unwrap();
        assert!(matches!(
            KeyCodec::canonicalize(&forged),
            Err(BridgeError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn rejects_non_object_arguments() {
        assert!(matches!(
            Descriptor::new("todos:get", 5),
            Err(BridgeError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            Descriptor::new("todos:get", vec!["a"]),
            Err(BridgeError::InvalidDescriptor(_))
        ));
    }

    #[derive(Serialize)]
    struct Point {
        x: f64,
    }

    #[test]
    fn rejects_non_finite_arguments() {
        for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Descriptor::new("todos:get", Point { x }),
                Err(BridgeError::InvalidDescriptor(_))
            ));
        }

        let finite = Descriptor::new("todos:get", Point { x: 0.5 }).unwrap();
        let null = Descriptor::new("todos:get", json!({ "x": null })).unwrap();
        assert_ne!(
            KeyCodec::canonicalize(&finite).unwrap(),
            KeyCodec::canonicalize(&null).unwrap()
        );
    }

    #[test]
    fn rejects_non_serializable_arguments() {
        let mut args = HashMap::new();
        args.insert((1, 2), "tuple keys cannot become JSON object keys");

        assert!(matches!(
            Descriptor::new("todos:get", args),
            Err(BridgeError::InvalidDescriptor(_))
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|m| json!(m)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];

        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_arguments() -> impl Strategy<Value = Vec<(String, Value)>> {
        prop::collection::btree_map("[a-z]{1,4}", arb_value(), 0..5)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn equal_keys_iff_equal_descriptors(
            left_op in "[a-z]{1,3}:[a-z]{1,3}",
            right_op in "[a-z]{1,3}:[a-z]{1,3}",
            left_args in arb_arguments(),
            right_args in arb_arguments(),
            seed in any::<u64>(),
        ) {
            let mut shuffled = left_args.clone();
            let len = shuffled.len().max(1);
            shuffled.rotate_left((seed as usize) % len);

            let left =
                Descriptor::from_parts(left_op.clone(), left_args.into_iter().collect()).unwrap();
            let same = Descriptor::from_parts(left_op, shuffled.into_iter().collect()).unwrap();
            let right = Descriptor::from_parts(right_op, right_args.into_iter().collect()).unwrap();

            prop_assert_eq!(
                KeyCodec::canonicalize(&left).unwrap(),
                KeyCodec::canonicalize(&same).unwrap()
            );
            prop_assert_eq!(
                left == right,
                KeyCodec::canonicalize(&left).unwrap() == KeyCodec::canonicalize(&right).unwrap()
            );
        }
    }
}
