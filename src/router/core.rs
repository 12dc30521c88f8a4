//! Router core module - hot path for request routing.
//!
//! One [`Router`] per schema, built from its document's operations, and a
//! [`RouterSet`] holding every schema's router for one store publication.

use crate::spec::{OpenApiDocument, Operation};
use crate::store::SpecStore;
use http::Method;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::radix::{Lookup, MethodSet, RouteError, Tree};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 4;

/// Captured path parameters, still percent-encoded, in pattern order.
///
/// Styles such as `label` and `matrix` split on delimiters that may be
/// escaped inside a value, so decoding happens after splitting.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Result of successfully matching a request path to an operation.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub operation: Arc<Operation>,
    /// Joined pattern (`base_path + operation path`) that matched.
    pub pattern: Arc<str>,
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Raw (still escaped) path parameter by name.
    ///
    /// Uses "last write wins" semantics when a name repeats.
    #[inline]
    #[must_use]
    pub fn raw_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Percent-decoded path parameter by name.
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<Cow<'_, str>> {
        self.raw_path_param(name).map(percent_decode)
    }
}

#[derive(Debug, Clone)]
pub enum RouteLookup {
    Found(RouteMatch),
    /// The path exists but not for this method.
    MethodNotAllowed(MethodSet),
    NotFound,
}

#[derive(Debug, Clone)]
struct RouteEntry {
    operation: Arc<Operation>,
    pattern: Arc<str>,
}

/// Routing table of one OpenAPI document.
#[derive(Debug, Clone)]
pub struct Router {
    tree: Tree<RouteEntry>,
}

/// Join the server base path with an operation path and URL-unescape it.
pub fn joined_path(base_path: &str, path: &str) -> String {
    let joined = format!("{base_path}{path}");
    match urlencoding::decode(&joined) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => joined,
    }
}

/// Percent-decode a path segment, keeping the input when it is malformed.
pub fn percent_decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    match urlencoding::decode(raw) {
        Ok(d) => Cow::Owned(d.into_owned()),
        Err(_) => Cow::Borrowed(raw),
    }
}

impl Router {
    /// Build the routing table for `doc`.
    ///
    /// A later `(method, pattern)` replaces an earlier one. An invalid pattern
    /// fails the whole router.
    pub fn from_document(doc: &OpenApiDocument) -> Result<Self, RouteError> {
        let mut tree = Tree::new();
        for op in &doc.operations {
            let pattern = joined_path(&doc.base_path, &op.path);
            let entry = RouteEntry {
                operation: Arc::clone(op),
                pattern: Arc::from(pattern.as_str()),
            };
            tree.insert(op.method.clone(), &pattern, entry)?;
        }
        Ok(Self { tree })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Resolve a raw request path.
    ///
    /// The raw path is tried first; if nothing matches and it carries
    /// percent-escapes, the decoded path is tried too. Captured values are
    /// returned as they appear in the matched path.
    pub fn find(&self, method: &Method, path: &str) -> RouteLookup {
        let first = self.lookup(method, path);
        if matches!(first, RouteLookup::NotFound) && path.contains('%') {
            if let Ok(decoded) = urlencoding::decode(path) {
                if decoded != path {
                    return self.lookup(method, &decoded);
                }
            }
        }
        first
    }

    fn lookup(&self, method: &Method, path: &str) -> RouteLookup {
        match self.tree.find(method, path) {
            Lookup::Found { endpoint, values } => {
                let path_params = endpoint
                    .param_keys
                    .iter()
                    .zip(values.iter())
                    .map(|(k, v)| (Arc::clone(k), (*v).to_string()))
                    .collect();
                RouteLookup::Found(RouteMatch {
                    operation: Arc::clone(&endpoint.value.operation),
                    pattern: Arc::clone(&endpoint.value.pattern),
                    path_params,
                })
            }
            Lookup::MethodNotAllowed(allowed) => RouteLookup::MethodNotAllowed(allowed),
            Lookup::NotFound => RouteLookup::NotFound,
        }
    }
}

/// Routers of every schema in a store.
#[derive(Debug, Default)]
pub struct RouterSet {
    routers: BTreeMap<i64, Router>,
    failed: BTreeMap<i64, RouteError>,
}

impl RouterSet {
    pub fn build(store: &SpecStore) -> Self {
        let mut set = Self::default();
        for entry in store.entries() {
            let id = entry.record.schema_id;
            match Router::from_document(&entry.document) {
                Ok(router) => {
                    debug!(schema_id = id, routes = router.len(), "router built");
                    set.routers.insert(id, router);
                }
                Err(e) => {
                    warn!(schema_id = id, error = %e, "router build failed");
                    set.failed.insert(id, e);
                }
            }
        }
        set
    }

    pub fn get(&self, schema_id: i64) -> Option<&Router> {
        self.routers.get(&schema_id)
    }

    /// Schemas whose documents contained an invalid routing pattern.
    pub fn failed(&self) -> &BTreeMap<i64, RouteError> {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }
}
