//! # Request Validation
//!
//! Checks one HTTP request against the OpenAPI operation it was routed to and
//! turns every failure into a [`ValidationError`] value. Nothing here panics
//! or returns an error across the worker boundary: the result is always a
//! [`Verdict`].
//!
//! ## Order of checks
//!
//! 1. Security requirements ([`security`]), presence only.
//! 2. Path, header and cookie parameters, then query parameters, each decoded
//!    with its style (see [`crate::decode`]) and validated with its compiled
//!    schema.
//! 3. The request body: required-ness, content type, decoding (see
//!    [`crate::body`]) and schema validation.
//! 4. Optionally, unknown query parameters and body fields ([`unknown`]).
//!
//! Schema failures are mapped to report fields in [`schema`]: a missing
//! `required` property becomes a `*_missed` code, anything else an
//! `*_invalid_value` code with `expected_type`, `pattern` and
//! `current_value` details.

mod errors;
mod request;
pub mod schema;
pub mod security;
pub mod unknown;

pub use errors::{ErrorCode, FieldDetail, ValidationError};
pub use request::{RequestValidator, RequestView, ValidationOptions, Verdict};
pub use security::{PresenceProvider, SecurityProvider};

#[cfg(test)]
mod tests;
