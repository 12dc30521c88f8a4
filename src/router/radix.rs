//! Radix tree for HTTP route matching
//!
//! A compact prefix tree keyed on raw pattern bytes. Static runs of a pattern
//! share prefix nodes (`/api/v1/` is stored once), and each `{param}`,
//! `{param:regexp}` or trailing `*` becomes its own typed node.
//!
//! ## Node kinds and priority
//!
//! Children are grouped by kind and tried in this order during lookup:
//!
//! 1. **Static**: exact prefix match, one candidate per leading byte
//! 2. **Regexp**: `{name:re}`, the captured segment must match `^re$`
//! 3. **Param**: `{name}`, captures up to the next tail byte
//! 4. **Catch-all**: `*`, captures the rest of the path (pattern end only)
//!
//! Within a kind, nodes are sorted by label byte; param and regexp nodes whose
//! tail is `/` are moved last so a `{name}.json` style node gets the first try.
//!
//! A capture never contains `/` except for the catch-all.
//!
//! ## Methods
//!
//! Every leaf holds one endpoint per method. When a path reaches a leaf that
//! lacks the requested method, the methods it does have are collected so the
//! caller can tell *method not allowed* from *not found*.

use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum NodeKind {
    Static = 0,
    Regexp = 1,
    Param = 2,
    CatchAll = 3,
}

const KINDS: [NodeKind; 4] = [
    NodeKind::Static,
    NodeKind::Regexp,
    NodeKind::Param,
    NodeKind::CatchAll,
];

/// Pattern rejected at insert time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route param closing delimiter '}}' is missing in {0:?}")]
    UnclosedParam(String),
    #[error("wildcard '*' must be the last value in a route: {0:?}")]
    WildcardNotLast(String),
    #[error("routing pattern {pattern:?} contains duplicate param key {key:?}")]
    DuplicateParam { pattern: String, key: String },
    #[error("invalid regexp {regexp:?} in {pattern:?}: {reason}")]
    BadRegexp {
        pattern: String,
        regexp: String,
        reason: String,
    },
}

/// Set of HTTP methods as a bitmap.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MethodSet(u16);

static METHOD_BITS: [Method; 9] = [
    Method::CONNECT,
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::POST,
    Method::PUT,
    Method::TRACE,
];

impl MethodSet {
    fn bit(method: &Method) -> u16 {
        METHOD_BITS
            .iter()
            .position(|m| m == method)
            .map_or(0, |i| 1 << i)
    }

    pub fn insert(&mut self, method: &Method) {
        self.0 |= Self::bit(method);
    }

    pub fn contains(&self, method: &Method) -> bool {
        let bit = Self::bit(method);
        bit != 0 && self.0 & bit != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Method> + '_ {
        METHOD_BITS
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, m)| m)
    }
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Value stored per `(pattern, method)`.
#[derive(Debug, Clone)]
pub struct Endpoint<H> {
    pub value: H,
    pub pattern: String,
    /// Parameter names in pattern order; `*` for the catch-all.
    pub param_keys: SmallVec<[Arc<str>; 4]>,
}

#[derive(Debug, Clone)]
struct Node<H> {
    kind: NodeKind,
    /// First byte of the prefix (static) or the opening `{`/`*`.
    label: u8,
    /// Byte that terminates a param capture; `/` by default.
    tail: u8,
    /// Static text, or the anchored regexp source for regexp nodes.
    prefix: String,
    rex: Option<Regex>,
    endpoints: Vec<(Method, Endpoint<H>)>,
    children: [Vec<Node<H>>; 4],
}

impl<H> Node<H> {
    fn new(kind: NodeKind, label: u8, tail: u8, prefix: &str) -> Self {
        Self {
            kind,
            label,
            tail,
            prefix: prefix.to_string(),
            rex: None,
            endpoints: Vec::new(),
            children: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
        }
    }

    fn is_leaf(&self) -> bool {
        !self.endpoints.is_empty()
    }

    fn endpoint(&self, method: &Method) -> Option<&Endpoint<H>> {
        self.endpoints
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, e)| e)
    }

    fn set_endpoint(&mut self, method: Method, endpoint: Endpoint<H>) {
        match self.endpoints.iter_mut().find(|(m, _)| *m == method) {
            Some(slot) => slot.1 = endpoint,
            None => self.endpoints.push((method, endpoint)),
        }
    }

    fn push_child(&mut self, child: Node<H>) {
        let list = &mut self.children[child.kind as usize];
        list.push(child);
        list.sort_by_key(|n| n.label);
        // Param/regexp nodes delimited by '/' go last.
        if let Some(i) = list
            .iter()
            .rposition(|n| n.kind > NodeKind::Static && n.tail == b'/')
        {
            let last = list.len() - 1;
            list.swap(i, last);
        }
    }

    fn edge_index(&self, kind: NodeKind, label: u8, tail: u8, prefix: &str) -> Option<usize> {
        self.children[kind as usize].iter().position(|n| {
            n.label == label
                && n.tail == tail
                && (kind != NodeKind::Regexp || n.prefix == prefix)
        })
    }

    fn static_edge(&self, label: u8) -> Option<&Node<H>> {
        let list = &self.children[NodeKind::Static as usize];
        list.binary_search_by_key(&label, |n| n.label)
            .ok()
            .map(|i| &list[i])
    }
}

/// One parsed pattern segment.
#[derive(Debug, PartialEq, Eq)]
struct Segment<'p> {
    kind: NodeKind,
    key: &'p str,
    regexp: String,
    tail: u8,
    start: usize,
    end: usize,
}

fn next_segment(pattern: &str) -> Result<Segment<'_>, RouteError> {
    let ps = pattern.find('{');
    let ws = pattern.find('*');
    if ps.is_none() && ws.is_none() {
        return Ok(Segment {
            kind: NodeKind::Static,
            key: "",
            regexp: String::new(),
            tail: 0,
            start: 0,
            end: pattern.len(),
        });
    }
    if let (Some(p), Some(w)) = (ps, ws) {
        if w < p {
            return Err(RouteError::WildcardNotLast(pattern.to_string()));
        }
    }

    if let Some(ps) = ps {
        let mut depth = 0usize;
        let mut pe = None;
        for (i, c) in pattern[ps..].bytes().enumerate() {
            match c {
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        pe = Some(ps + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let pe = pe.ok_or_else(|| RouteError::UnclosedParam(pattern.to_string()))?;
        let mut key = &pattern[ps + 1..pe];
        let end = pe + 1;
        let tail = pattern.as_bytes().get(end).copied().unwrap_or(b'/');
        let mut kind = NodeKind::Param;
        let mut regexp = String::new();
        if let Some(idx) = key.find(':') {
            kind = NodeKind::Regexp;
            regexp = key[idx + 1..].to_string();
            key = &key[..idx];
        }
        if !regexp.is_empty() {
            if !regexp.starts_with('^') {
                regexp.insert(0, '^');
            }
            if !regexp.ends_with('$') {
                regexp.push('$');
            }
        }
        return Ok(Segment {
            kind,
            key,
            regexp,
            tail,
            start: ps,
            end,
        });
    }

    // Only a wildcard remains; it has to close the pattern.
    let ws = ws.unwrap_or_default();
    if ws + 1 < pattern.len() {
        return Err(RouteError::WildcardNotLast(pattern.to_string()));
    }
    Ok(Segment {
        kind: NodeKind::CatchAll,
        key: "*",
        regexp: String::new(),
        tail: 0,
        start: ws,
        end: pattern.len(),
    })
}

/// Parameter names of `pattern`, rejecting duplicates.
pub fn param_keys(pattern: &str) -> Result<SmallVec<[Arc<str>; 4]>, RouteError> {
    let mut keys: SmallVec<[Arc<str>; 4]> = SmallVec::new();
    let mut rest = pattern;
    loop {
        let seg = next_segment(rest)?;
        if seg.kind == NodeKind::Static {
            return Ok(keys);
        }
        if keys.iter().any(|k| k.as_ref() == seg.key) {
            return Err(RouteError::DuplicateParam {
                pattern: pattern.to_string(),
                key: seg.key.to_string(),
            });
        }
        keys.push(Arc::from(seg.key));
        rest = &rest[seg.end..];
    }
}

fn longest_prefix(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Outcome of a lookup.
#[derive(Debug)]
pub enum Lookup<'t, 'p, H> {
    Found {
        endpoint: &'t Endpoint<H>,
        /// Captured values, aligned with `endpoint.param_keys`.
        values: SmallVec<[&'p str; 4]>,
    },
    MethodNotAllowed(MethodSet),
    NotFound,
}

struct FindCtx<'p> {
    values: SmallVec<[&'p str; 4]>,
    allowed: MethodSet,
}

/// Radix tree of routing patterns.
#[derive(Debug, Clone)]
pub struct Tree<H> {
    root: Node<H>,
    routes: usize,
}

impl<H> Default for Tree<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Tree<H> {
    pub fn new() -> Self {
        Self {
            root: Node::new(NodeKind::Static, 0, 0, ""),
            routes: 0,
        }
    }

    /// Number of `(method, pattern)` pairs inserted, replacements included.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    /// Insert `value` for `(method, pattern)`, replacing any previous value.
    pub fn insert(&mut self, method: Method, pattern: &str, value: H) -> Result<(), RouteError> {
        let endpoint = Endpoint {
            value,
            pattern: pattern.to_string(),
            param_keys: param_keys(pattern)?,
        };
        insert_at(&mut self.root, pattern, method, endpoint)?;
        self.routes += 1;
        Ok(())
    }

    /// Resolve `path` for `method`.
    pub fn find<'t, 'p>(&'t self, method: &Method, path: &'p str) -> Lookup<'t, 'p, H> {
        if path.is_empty() {
            return Lookup::NotFound;
        }
        let mut ctx = FindCtx {
            values: SmallVec::new(),
            allowed: MethodSet::default(),
        };
        match find_route(&self.root, &mut ctx, method, path) {
            Some(endpoint) => Lookup::Found {
                endpoint,
                values: ctx.values,
            },
            None if !ctx.allowed.is_empty() => Lookup::MethodNotAllowed(ctx.allowed),
            None => Lookup::NotFound,
        }
    }
}

fn insert_at<H>(
    node: &mut Node<H>,
    search: &str,
    method: Method,
    endpoint: Endpoint<H>,
) -> Result<(), RouteError> {
    let Some(&label) = search.as_bytes().first() else {
        node.set_endpoint(method, endpoint);
        return Ok(());
    };

    let seg = if label == b'{' || label == b'*' {
        Some(next_segment(search)?)
    } else {
        None
    };
    let (kind, tail, seg_end, prefix) = match &seg {
        Some(s) => (s.kind, s.tail, s.end, s.regexp.as_str()),
        None => (NodeKind::Static, 0, 0, ""),
    };

    let Some(idx) = node.edge_index(kind, label, tail, prefix) else {
        let child = Node::new(NodeKind::Static, label, tail, search);
        node.push_child(build_chain(child, search, method, endpoint)?);
        return Ok(());
    };

    if kind > NodeKind::Static {
        let child = &mut node.children[kind as usize][idx];
        return insert_at(child, &search[seg_end..], method, endpoint);
    }

    let child_prefix_len = node.children[0][idx].prefix.len();
    let common = longest_prefix(search, &node.children[0][idx].prefix);
    if common == child_prefix_len {
        let child = &mut node.children[0][idx];
        return insert_at(child, &search[common..], method, endpoint);
    }

    // Split the edge at the common prefix. The new branch is built first so a
    // bad pattern leaves the tree untouched.
    let rest = &search[common..];
    let mut split = Node::new(NodeKind::Static, label, 0, &search[..common]);
    match rest.as_bytes().first() {
        None => split.set_endpoint(method, endpoint),
        Some(&l) => {
            let sub = Node::new(NodeKind::Static, l, 0, rest);
            split.push_child(build_chain(sub, rest, method, endpoint)?);
        }
    }
    let mut old = node.children[0].remove(idx);
    old.prefix = old.prefix[common..].to_string();
    old.label = old.prefix.as_bytes()[0];
    split.push_child(old);
    node.push_child(split);
    Ok(())
}

/// Turn `child` (whose prefix is the whole `search`) into a chain of typed
/// nodes, one per pattern segment, with the endpoint on the last one.
fn build_chain<H>(
    mut child: Node<H>,
    search: &str,
    method: Method,
    endpoint: Endpoint<H>,
) -> Result<Node<H>, RouteError> {
    let seg = next_segment(search)?;
    if seg.kind == NodeKind::Static {
        child.kind = NodeKind::Static;
        child.set_endpoint(method, endpoint);
        return Ok(child);
    }

    if seg.kind == NodeKind::Regexp {
        let rex = Regex::new(&seg.regexp).map_err(|e| RouteError::BadRegexp {
            pattern: endpoint.pattern.clone(),
            regexp: seg.regexp.clone(),
            reason: e.to_string(),
        })?;
        child.prefix = seg.regexp.clone();
        child.rex = Some(rex);
    }

    if seg.start == 0 {
        child.kind = seg.kind;
        child.tail = seg.tail;
        if seg.kind != NodeKind::Regexp {
            child.prefix.clear();
        }
        let next = if seg.kind == NodeKind::CatchAll {
            search.len()
        } else {
            seg.end
        };
        match search.as_bytes().get(next) {
            None => child.set_endpoint(method, endpoint),
            Some(&l) => {
                let rest = &search[next..];
                let sub = Node::new(NodeKind::Static, l, 0, rest);
                child.push_child(build_chain(sub, rest, method, endpoint)?);
            }
        }
    } else {
        child.kind = NodeKind::Static;
        child.prefix = search[..seg.start].to_string();
        child.rex = None;
        child.tail = 0;
        let rest = &search[seg.start..];
        let sub = Node::new(seg.kind, rest.as_bytes()[0], seg.tail, rest);
        child.push_child(build_chain(sub, rest, method, endpoint)?);
    }
    Ok(child)
}

fn collect_allowed<H>(node: &Node<H>, allowed: &mut MethodSet) {
    for (m, _) in &node.endpoints {
        allowed.insert(m);
    }
}

fn find_route<'t, 'p, H>(
    node: &'t Node<H>,
    ctx: &mut FindCtx<'p>,
    method: &Method,
    search: &'p str,
) -> Option<&'t Endpoint<H>> {
    for kind in KINDS {
        let nodes = &node.children[kind as usize];
        if nodes.is_empty() {
            continue;
        }
        match kind {
            NodeKind::Static => {
                let Some(&label) = search.as_bytes().first() else {
                    continue;
                };
                let Some(xn) = node.static_edge(label) else {
                    continue;
                };
                let Some(xsearch) = search.strip_prefix(xn.prefix.as_str()) else {
                    continue;
                };
                if let Some(found) = descend(xn, ctx, method, xsearch) {
                    return Some(found);
                }
            }
            NodeKind::Param | NodeKind::Regexp => {
                if search.is_empty() {
                    continue;
                }
                for xn in nodes {
                    let p = match search.bytes().position(|b| b == xn.tail) {
                        Some(0) if kind == NodeKind::Regexp => continue,
                        Some(p) => p,
                        None if xn.tail == b'/' => search.len(),
                        None => continue,
                    };
                    let captured = &search[..p];
                    if captured.contains('/') {
                        continue;
                    }
                    if let Some(rex) = &xn.rex {
                        if !rex.is_match(captured) {
                            continue;
                        }
                    }
                    let mark = ctx.values.len();
                    ctx.values.push(captured);
                    if let Some(found) = descend(xn, ctx, method, &search[p..]) {
                        return Some(found);
                    }
                    ctx.values.truncate(mark);
                }
            }
            NodeKind::CatchAll => {
                let xn = &nodes[0];
                let mark = ctx.values.len();
                ctx.values.push(search);
                if let Some(found) = descend(xn, ctx, method, "") {
                    return Some(found);
                }
                ctx.values.truncate(mark);
            }
        }
    }
    None
}

fn descend<'t, 'p, H>(
    xn: &'t Node<H>,
    ctx: &mut FindCtx<'p>,
    method: &Method,
    xsearch: &'p str,
) -> Option<&'t Endpoint<H>> {
    if xsearch.is_empty() && xn.is_leaf() {
        if let Some(ep) = xn.endpoint(method) {
            return Some(ep);
        }
        collect_allowed(xn, &mut ctx.allowed);
    }
    find_route(xn, ctx, method, xsearch)
}
