//! OpenAPI document model and parser.
//!
//! Raw catalog bytes go through [`parse_document`]: YAML/JSON parse, a
//! structural check of the OpenAPI object model, then [`build_document`]
//! which resolves every `$ref` into the [`SchemaArena`] and precompiles
//! parameter and body validators.

mod build;
mod load;
pub mod schema;
mod types;

pub use build::{base_path, build_document, BuildError};
pub use load::{parse_document, SpecError, SpecFormat};
pub use schema::{AdditionalProperties, SchemaArena, SchemaId, SchemaNode, SchemaType};
pub use types::*;
