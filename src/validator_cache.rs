//! # Schema Validator Cache Module
//!
//! Compiled JSON Schema validators shared by every document of one catalog load.
//!
//! ## Overview
//!
//! Compiling a validator is far more expensive than running it. Each parameter
//! and body schema of every operation is compiled once while a document is
//! built and the resulting [`CompiledSchema`] is shared through `Arc`.
//!
//! Catalogs often carry the same document (or the same component schemas)
//! under several schema IDs. The cache is keyed by the content hash of the
//! compile root, so identical schemas compile once per catalog load no matter
//! how many documents declare them.
//!
//! ## Lifecycle
//!
//! A cache is created for each catalog load and is owned by the resulting
//! store. When hot reload swaps the store out, the old cache and every
//! validator it holds are dropped with it.
//!
//! ## Thread Safety
//!
//! `RwLock<HashMap>` with a double-checked insert: concurrent builders never
//! compile the same key twice and readers never block each other.

use crate::spec::{schema::strip_patterns, SchemaDialect};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// A compiled validator together with the schema it was compiled from.
///
/// The schema is kept so error locations (`schema_path`) can be mapped back to
/// keyword values such as the `pattern` source or `minimum` bound.
pub struct CompiledSchema {
    validator: Validator,
    root: Value,
    patterns_stripped: bool,
}

impl CompiledSchema {
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// True when the document's `pattern` keywords could not be compiled and
    /// were dropped.
    pub fn patterns_stripped(&self) -> bool {
        self.patterns_stripped
    }

    /// Value found at a JSON Schema evaluation path.
    ///
    /// Evaluation paths may pass through `$ref`; those segments are followed
    /// by resolving the reference against the compile root.
    pub fn keyword_value(&self, schema_path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for raw in schema_path.split('/').skip(1) {
            let token = raw.replace("~1", "/").replace("~0", "~");
            if token == "$ref" {
                let reference = current.get("$ref")?.as_str()?;
                current = self.root.pointer(reference.strip_prefix('#')?)?;
                continue;
            }
            current = match current {
                Value::Object(map) => map.get(&token)?,
                Value::Array(list) => list.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("root", &self.root)
            .field("patterns_stripped", &self.patterns_stripped)
            .finish()
    }
}

/// Error from compiling a schema, even after dropping patterns.
#[derive(Debug, thiserror::Error)]
#[error("schema does not compile: {0}")]
pub struct CompileError(pub String);

/// Cache key: dialect plus the first 16 hex chars of the SHA-256 of the root.
pub fn schema_key(dialect: SchemaDialect, root: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    let tag = match dialect {
        SchemaDialect::Oas30 => "d4",
        SchemaDialect::Oas31 => "d2020",
    };
    format!("{tag}:{hex}")
}

fn compile(dialect: SchemaDialect, root: &Value) -> Result<Validator, String> {
    let draft = match dialect {
        SchemaDialect::Oas30 => Draft::Draft4,
        SchemaDialect::Oas31 => Draft::Draft202012,
    };
    jsonschema::options()
        .with_draft(draft)
        .should_validate_formats(false)
        .build(root)
        .map_err(|e| e.to_string())
}

/// Thread-safe cache of compiled validators, see module docs.
#[derive(Default)]
pub struct ValidatorCache {
    cache: RwLock<HashMap<String, Arc<CompiledSchema>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached validator or compile and cache a new one.
    ///
    /// A schema whose `pattern` regexes the engine rejects is retried without
    /// them rather than failing the whole document.
    pub fn get_or_compile(
        &self,
        dialect: SchemaDialect,
        root: Value,
    ) -> Result<Arc<CompiledSchema>, CompileError> {
        let key = schema_key(dialect, &root);

        if let Ok(cache) = self.cache.read() {
            if let Some(found) = cache.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(found));
            }
        }

        let mut cache = self
            .cache
            .write()
            .map_err(|_| CompileError("validator cache lock poisoned".to_string()))?;
        // Another builder may have compiled it while we waited for the lock.
        if let Some(found) = cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(found));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let compiled = match compile(dialect, &root) {
            Ok(validator) => CompiledSchema {
                validator,
                root,
                patterns_stripped: false,
            },
            Err(first) => {
                let mut relaxed = root;
                strip_patterns(&mut relaxed);
                let validator = compile(dialect, &relaxed).map_err(|_| CompileError(first.clone()))?;
                warn!(key = %key, error = %first, "schema compiled without pattern keywords");
                CompiledSchema {
                    validator,
                    root: relaxed,
                    patterns_stripped: true,
                }
            }
        };
        debug!(key = %key, "compiled schema validator");
        let compiled = Arc::new(compiled);
        cache.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hits, misses) = self.stats();
        f.debug_struct("ValidatorCache")
            .field("entries", &self.len())
            .field("hits", &hits)
            .field("misses", &misses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_schemas_compile_once() {
        let cache = ValidatorCache::new();
        let schema = json!({"type": "object", "required": ["name"]});
        let a = cache
            .get_or_compile(SchemaDialect::Oas30, schema.clone())
            .unwrap();
        let b = cache.get_or_compile(SchemaDialect::Oas30, schema).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_dialect_is_part_of_key() {
        let schema = json!({"type": "string"});
        assert_ne!(
            schema_key(SchemaDialect::Oas30, &schema),
            schema_key(SchemaDialect::Oas31, &schema)
        );
    }

    #[test]
    fn test_bad_pattern_is_dropped() {
        let cache = ValidatorCache::new();
        let compiled = cache
            .get_or_compile(
                SchemaDialect::Oas30,
                json!({"type": "string", "pattern": "(unclosed", "maxLength": 3}),
            )
            .unwrap();
        assert!(compiled.patterns_stripped());
        assert!(compiled.is_valid(&json!("abc")));
        assert!(!compiled.is_valid(&json!("abcd")));
    }

    #[test]
    fn test_keyword_value_follows_ref() {
        let cache = ValidatorCache::new();
        let root = json!({
            "allOf": [{"$ref": "#/components/schemas/Id"}],
            "components": {"schemas": {"Id": {"type": "integer", "minimum": 3}}}
        });
        let compiled = cache.get_or_compile(SchemaDialect::Oas30, root).unwrap();
        assert_eq!(
            compiled.keyword_value("/allOf/0/$ref/minimum"),
            Some(&json!(3))
        );
        assert_eq!(compiled.keyword_value("/allOf/0/$ref/maximum"), None);
    }
}
