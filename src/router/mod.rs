//! # Router Module
//!
//! Resolves `(method, path)` to an OpenAPI operation for one schema.
//!
//! ## Overview
//!
//! - [`radix`](self::radix) holds the generic prefix tree: static, regexp,
//!   param and catch-all nodes, with method bitmaps on every leaf.
//! - [`Router`] fills a tree with a document's operations, keyed by
//!   `servers[0]` base path joined with the operation path.
//! - [`RouterSet`] holds one router per schema of a store publication. It is
//!   immutable; hot reload builds a new one alongside a new store.
//!
//! ## Example
//!
//! ```rust,ignore
//! use api_firewall::router::{RouteLookup, Router};
//!
//! let router = Router::from_document(&doc)?;
//! match router.find(&http::Method::GET, "/pet/42") {
//!     RouteLookup::Found(m) => println!("petId = {:?}", m.get_path_param("petId")),
//!     RouteLookup::MethodNotAllowed(allowed) => println!("allowed: {allowed:?}"),
//!     RouteLookup::NotFound => println!("no route"),
//! }
//! ```

mod core;
pub mod radix;

pub use core::{joined_path, percent_decode, ParamVec, RouteLookup, RouteMatch, Router, RouterSet};
pub use radix::{MethodSet, RouteError};
