//! Fingerprint derivation for field invocations
//!
//! A fingerprint is computed from the owning object type, the field name, the
//! call variables and an identity for the object being resolved. All inputs
//! are canonicalized first, so that map iteration order never leaks into the
//! hash.
//!
//! Identity is resolved in this order:
//! 1. the object's own [`CacheIdentity::cache_identity`] (e.g. its `id` field),
//! 2. the canonical JSON serialization of the whole object,
//! 3. for root-level calls without an object, the raw query text.

use crate::cache::types::Fingerprint;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, 64-bit
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// The part of the surrounding call that participates in the key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldContext {
    /// Name of the type owning the field (e.g. `Query`, `Todo`)
    pub object_type: String,

    /// Name of the field being resolved
    pub field_name: String,

    /// Operation variables for this call
    pub variables: HashMap<String, Value>,

    /// Raw operation text, used as identity for root-level fields
    pub raw_query: Option<String>,
}

impl FieldContext {
    /// Create a context for `object_type.field_name` with no variables
    pub fn new(object_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            field_name: field_name.into(),
            variables: HashMap::new(),
            raw_query: None,
        }
    }

    /// Replace the call variables
    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Add a single variable
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Set the raw operation text
    pub fn with_raw_query(mut self, query: impl Into<String>) -> Self {
        self.raw_query = Some(query.into());
        self
    }
}

/// Capability for objects that can name themselves.
///
/// Objects that return `None` are identified by their canonical serialization.
pub trait CacheIdentity: Serialize {
    /// Stable identifier for this object, if it has one
    fn cache_identity(&self) -> Option<String> {
        None
    }
}

impl CacheIdentity for Value {
    /// Looks for a top-level key equal to `id`, ignoring ASCII case.
    fn cache_identity(&self) -> Option<String> {
        let fields = self.as_object()?;
        fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("id"))
            .and_then(|(_, id)| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

impl CacheIdentity for str {
    fn cache_identity(&self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl CacheIdentity for String {
    fn cache_identity(&self) -> Option<String> {
        Some(self.clone())
    }
}

/// How the resolved object was identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectIdentity {
    /// Explicit identifier exposed by the object
    Id(String),
    /// Canonical serialization of the object
    Content(String),
    /// Raw query text of a root-level call
    Query(String),
}

impl ObjectIdentity {
    fn tag(&self) -> &'static str {
        match self {
            ObjectIdentity::Id(_) => "id",
            ObjectIdentity::Content(_) => "content",
            ObjectIdentity::Query(_) => "query",
        }
    }

    fn value(&self) -> &str {
        match self {
            ObjectIdentity::Id(v) | ObjectIdentity::Content(v) | ObjectIdentity::Query(v) => v,
        }
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag(), self.value())
    }
}

/// Result of a successful derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// Hash of the canonical key material
    pub fingerprint: Fingerprint,

    /// Human-readable form of the key material, for logs
    pub diagnostic: String,
}

/// Serialize `value` to JSON with object keys sorted at every level.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(value))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut sorted: Vec<(String, Value)> = fields.into_iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::with_capacity(sorted.len());
            for (name, field) in sorted {
                out.insert(name, sort_keys(field));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Work out the identity of the object being resolved.
///
/// Returns `None` when no identity can be established: the object cannot be
/// serialized, or there is no object and no query text to fall back on.
pub fn object_identity<O>(ctx: &FieldContext, object: Option<&O>) -> Option<ObjectIdentity>
where
    O: CacheIdentity + ?Sized,
{
    match object {
        Some(object) => {
            if let Some(id) = object.cache_identity() {
                return Some(ObjectIdentity::Id(id));
            }
            match canonical_json(object) {
                Ok(content) => Some(ObjectIdentity::Content(content)),
                Err(e) => {
                    debug!(
                        field = %ctx.field_name,
                        error = %e,
                        "object cannot be serialized, skipping cache"
                    );
                    None
                }
            }
        }
        None => match ctx.raw_query.as_deref() {
            Some(query) if !query.is_empty() => Some(ObjectIdentity::Query(query.to_owned())),
            _ => None,
        },
    }
}

/// Derive the fingerprint for a field invocation.
///
/// `None` means the invocation is not cacheable.
pub fn derive_key<O>(ctx: &FieldContext, object: Option<&O>) -> Option<DerivedKey>
where
    O: CacheIdentity + ?Sized,
{
    let identity = object_identity(ctx, object)?;
    let variables = match canonical_json(&ctx.variables) {
        Ok(v) => v,
        Err(e) => {
            debug!(field = %ctx.field_name, error = %e, "variables cannot be serialized");
            return None;
        }
    };

    let mut material = Vec::new();
    for segment in [
        ctx.object_type.as_str(),
        ctx.field_name.as_str(),
        variables.as_str(),
        identity.tag(),
        identity.value(),
    ] {
        material.extend_from_slice(segment.len().to_string().as_bytes());
        material.push(b':');
        material.extend_from_slice(segment.as_bytes());
    }

    Some(DerivedKey {
        fingerprint: Fingerprint::from_hash(fnv1a_64(&material)),
        diagnostic: format!(
            "{}.{}({}) {}",
            ctx.object_type, ctx.field_name, variables, identity
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::{Error as _, Serializer};
    use serde_json::json;

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "y": [ {"d": 1, "c": 2} ]}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"y":[{"c":2,"d":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_value_identity_is_case_insensitive() {
        assert_eq!(json!({"ID": "t-1"}).cache_identity(), Some("t-1".to_string()));
        assert_eq!(json!({"Id": 7}).cache_identity(), Some("7".to_string()));
        assert_eq!(json!({"id": null}).cache_identity(), None);
        assert_eq!(json!({"name": "x"}).cache_identity(), None);
        assert_eq!(json!([1, 2]).cache_identity(), None);
    }

    #[test]
    fn test_string_object_is_its_own_identity() {
        let ctx = FieldContext::new("Todo", "text");
        let identity = object_identity(&ctx, Some("abc")).unwrap();
        assert_eq!(identity, ObjectIdentity::Id("abc".to_string()));
    }

    #[test]
    fn test_object_without_id_uses_content() {
        let ctx = FieldContext::new("Todo", "user");
        let object = json!({"text": "x", "done": false});
        let identity = object_identity(&ctx, Some(&object)).unwrap();
        assert_eq!(
            identity,
            ObjectIdentity::Content(r#"{"done":false,"text":"x"}"#.to_string())
        );
    }

    #[test]
    fn test_root_call_uses_raw_query() {
        let ctx = FieldContext::new("Query", "todos").with_raw_query("{ todos { id } }");
        let key = derive_key::<Value>(&ctx, None).unwrap();
        assert!(key.diagnostic.ends_with("query={ todos { id } }"));
    }

    #[test]
    fn test_root_call_without_query_is_not_cacheable() {
        let ctx = FieldContext::new("Query", "todos");
        assert!(derive_key::<Value>(&ctx, None).is_none());

        let ctx = ctx.with_raw_query("");
        assert!(derive_key::<Value>(&ctx, None).is_none());
    }

    #[test]
    fn test_variable_order_does_not_matter() {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        let names: Vec<String> = (0..32).map(|i| format!("arg{}", i)).collect();
        for (i, name) in names.iter().enumerate() {
            forward.insert(name.clone(), json!({"n": i, "m": [i, "x"]}));
        }
        for (i, name) in names.iter().enumerate().rev() {
            backward.insert(name.clone(), json!({"m": [i, "x"], "n": i}));
        }

        let a = FieldContext::new("Todo", "user").with_variables(forward);
        let b = FieldContext::new("Todo", "user").with_variables(backward);
        let object = json!({"id": "1"});

        assert_eq!(
            derive_key(&a, Some(&object)).unwrap(),
            derive_key(&b, Some(&object)).unwrap()
        );
    }

    #[test]
    fn test_inputs_change_the_fingerprint() {
        let object = json!({"id": "1"});
        let base = FieldContext::new("Todo", "user").variable("first", json!(10));
        let fp = |ctx: &FieldContext, obj: &Value| derive_key(ctx, Some(obj)).unwrap().fingerprint;

        let reference = fp(&base, &object);
        assert_ne!(reference, fp(&FieldContext { field_name: "owner".into(), ..base.clone() }, &object));
        assert_ne!(reference, fp(&FieldContext { object_type: "Post".into(), ..base.clone() }, &object));
        assert_ne!(reference, fp(&base.clone().variable("first", json!(11)), &object));
        assert_ne!(reference, fp(&base, &json!({"id": "2"})));
    }

    #[test]
    fn test_segment_boundaries_are_unambiguous() {
        let object = json!({"id": "x"});
        let a = FieldContext::new("ab", "c");
        let b = FieldContext::new("a", "bc");
        assert_ne!(
            derive_key(&a, Some(&object)).unwrap().fingerprint,
            derive_key(&b, Some(&object)).unwrap().fingerprint
        );
    }

    #[test]
    fn test_id_and_content_identities_do_not_collide() {
        let ctx = FieldContext::new("Todo", "user");
        let with_id = "{\"k\":1}".to_string();
        let without_id = json!({"k": 1});
        assert_ne!(
            derive_key(&ctx, Some(&with_id)).unwrap().fingerprint,
            derive_key(&ctx, Some(&without_id)).unwrap().fingerprint
        );
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("opaque handle"))
        }
    }

    impl CacheIdentity for Unserializable {}

    #[test]
    fn test_unserializable_object_skips() {
        let ctx = FieldContext::new("Todo", "user");
        assert!(derive_key(&ctx, Some(&Unserializable)).is_none());
    }

    struct Named(&'static str);

    impl Serialize for Named {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("never called"))
        }
    }

    impl CacheIdentity for Named {
        fn cache_identity(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn test_explicit_identity_skips_serialization() {
        let ctx = FieldContext::new("User", "name");
        let key = derive_key(&ctx, Some(&Named("u-9"))).unwrap();
        assert!(key.diagnostic.ends_with("id=u-9"));
    }
}
