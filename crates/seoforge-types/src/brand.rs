//! Typed view over the opaque brand-config blob.
//!
//! Storage keeps `BrandConfig.v2_schema` as raw JSON; components deserialize
//! it into [`BrandSettings`] at entry so business logic never touches
//! `serde_json::Value` directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Brand vocabulary constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub banned: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
}

/// Typed brand configuration used by the writer and quality checker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandSettings {
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub vocabulary: Vocabulary,
    #[serde(default)]
    pub min_word_count: Option<u32>,
    #[serde(default)]
    pub max_word_count: Option<u32>,
    #[serde(default)]
    pub tone: Option<String>,
}

impl BrandSettings {
    /// Deserialize from the stored blob; unknown fields are ignored and a
    /// missing/null blob yields defaults so services degrade gracefully.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Re-serialize for persistence, merging over the existing blob so
    /// fields this struct does not model survive round-trips.
    pub fn merge_into(&self, existing: &Value) -> Value {
        let mut base = match existing {
            Value::Object(map) => map.clone(),
            _ => Default::default(),
        };
        if let Ok(Value::Object(update)) = serde_json::to_value(self) {
            for (k, v) in update {
                base.insert(k, v);
            }
        }
        Value::Object(base)
    }
}
