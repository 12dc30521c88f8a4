use crate::validator::ValidationError;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

/// Verdict of one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub schema_id: i64,
    pub status_code: u16,
    /// Query string with defaults applied, when rewriting is on and changed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
}

impl SchemaSummary {
    pub fn new(schema_id: i64, status_code: u16) -> Self {
        Self {
            schema_id,
            status_code,
            rewritten_query: None,
        }
    }
}

/// API-mode response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub summary: Vec<SchemaSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Whether every schema accepted the request.
    pub fn passed(&self) -> bool {
        self.summary.iter().all(|s| s.status_code == 200)
    }

    pub fn status_of(&self, schema_id: i64) -> Option<u16> {
        self.summary
            .iter()
            .find(|s| s.schema_id == schema_id)
            .map(|s| s.status_code)
    }

    /// Keep at most `max` errors chosen uniformly at random; `0` keeps all.
    ///
    /// Survivors keep their relative order.
    pub fn sample_errors(&mut self, max: usize) {
        if max == 0 || self.errors.len() <= max {
            return;
        }
        let mut rng = rand::thread_rng();
        let mut keep = sample(&mut rng, self.errors.len(), max).into_vec();
        keep.sort_unstable();
        let mut keep = keep.into_iter().peekable();
        let mut i = 0usize;
        self.errors.retain(|_| {
            let hit = keep.peek() == Some(&i);
            if hit {
                keep.next();
            }
            i += 1;
            hit
        });
    }
}
