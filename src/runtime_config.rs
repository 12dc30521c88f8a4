//! Coroutine runtime tuning.
//!
//! `APIFW_STACK_SIZE` sets the stack of every validation coroutine, in bytes,
//! decimal (`65536`) or hex (`0x10000`). Deeply nested bodies and large
//! schemas recurse during validation; raise it when workers overflow.

use std::env;

pub const DEFAULT_STACK_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        match env::var("APIFW_STACK_SIZE") {
            Ok(raw) => Self::from_value(&raw),
            Err(_) => Self::default(),
        }
    }

    fn from_value(raw: &str) -> Self {
        let raw = raw.trim();
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => usize::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };
        Self {
            stack_size: parsed.filter(|n| *n > 0).unwrap_or(DEFAULT_STACK_SIZE),
        }
    }
}
