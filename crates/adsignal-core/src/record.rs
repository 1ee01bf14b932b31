//! Classified ad records as the signal engine sees them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Ingestion lifecycle state of a record. The engine only reads `Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Queued,
    Processing,
    Processed,
    NeedsReview,
    Failed,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Queued => "queued",
            RecordStatus::Processing => "processing",
            RecordStatus::Processed => "processed",
            RecordStatus::NeedsReview => "needs_review",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RecordStatus::Queued),
            "processing" => Ok(RecordStatus::Processing),
            "processed" => Ok(RecordStatus::Processed),
            "needs_review" => Ok(RecordStatus::NeedsReview),
            "failed" => Ok(RecordStatus::Failed),
            other => Err(format!("unknown record status: {other}")),
        }
    }
}

/// One classified creative.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    /// Owning organization; webhook notifications are scoped to it.
    pub org_id: Option<Uuid>,
    /// Brand assigned upstream. Falls back to `digest.meta.brand_guess`.
    pub brand: Option<String>,
    pub media_url: Option<String>,
    pub status: RecordStatus,
    pub digest: Digest,
    /// Lazily backfilled by the anomaly detector.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// The brand identifier used for history lookups, if any.
    #[must_use]
    pub fn brand_key(&self) -> Option<&str> {
        non_blank(self.brand.as_deref()).or_else(|| non_blank(self.digest.meta.brand_guess.as_deref()))
    }

    #[must_use]
    pub fn exemplar(&self) -> Exemplar {
        Exemplar {
            id: self.id,
            media_url: self.media_url.clone(),
            created_at: self.created_at,
        }
    }

    /// Text fed to the embedding service for this record.
    ///
    /// Absent parts are left empty; newlines are flattened to spaces.
    #[must_use]
    pub fn embedding_input(&self) -> String {
        let text = format!(
            "Brand: {} | Trigger: {} | Position: {} | Subtext: {}",
            self.brand_key().unwrap_or_default(),
            self.digest.classification.trigger_mechanic.as_deref().unwrap_or_default(),
            self.digest.strategy.positioning_claim.as_deref().unwrap_or_default(),
            self.digest.strategy.semiotic_subtext.as_deref().unwrap_or_default(),
        );
        text.replace(['\n', '\r'], " ")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A concrete record backing an aggregate signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exemplar {
    pub id: Uuid,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The structured digest produced upstream for one creative.
///
/// Every field is optional and wrongly-typed values read as absent, so a
/// malformed digest never fails a pass; it simply contributes no signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Digest {
    #[serde(deserialize_with = "lenient")]
    pub meta: Meta,
    #[serde(deserialize_with = "lenient")]
    pub classification: Classification,
    #[serde(deserialize_with = "lenient")]
    pub strategy: Strategy,
}

impl Digest {
    /// Parse a stored JSON digest; anything unreadable becomes an empty digest.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    #[serde(deserialize_with = "lenient")]
    pub brand_guess: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub product_category_guess: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    #[serde(deserialize_with = "lenient")]
    pub trigger_mechanic: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub narrative_framework: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub offer_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub claim_type: Option<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub visual_style: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub emotion_tone: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategy {
    #[serde(deserialize_with = "lenient")]
    pub positioning_claim: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub semiotic_subtext: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Accepts an array of strings (non-string members dropped) or a lone string.
fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    })
}
