//! Match records discovered by a matching run and their deduplicating index.

pub mod index;

/// One side of a match: a patient id with its originating server.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientRef {
    /// Patient id, unique per server.
    pub patient_id: String,
    /// Originating server id; `None` for a local patient.
    pub server_id: Option<String>,
}

impl PatientRef {
    /// Construct, normalizing an empty server id to local.
    pub fn new(patient_id: &str, server_id: Option<&str>) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            server_id: server_id.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Return whether the patient is hosted locally.
    pub fn is_local(&self) -> bool {
        self.server_id.is_none()
    }
}

/// Lifecycle status of a match record.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    /// Freshly discovered, not yet triaged.
    #[default]
    Uncategorized,
    /// Kept by a user.
    Saved,
    /// Dismissed by a user.
    Rejected,
}

/// A scored match between two patients.
///
/// Two records are considered the same match when all four identifying
/// fields (both patient ids and both server ids) coincide; scores and status
/// do not participate in that comparison.
#[serde_with::skip_serializing_none]
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct MatchRecord {
    /// The patient the match was found for.
    pub reference: PatientRef,
    /// The patient found to be similar.
    pub matched: PatientRef,
    /// Combined score.
    pub score: f64,
    /// Phenotype similarity score.
    pub phenotype_score: f64,
    /// Genotype similarity score.
    pub genotype_score: f64,
    /// Triage status.
    #[serde(default)]
    pub status: MatchStatus,
    /// Whether the patient owners were notified about the match.
    #[serde(default)]
    pub notified: bool,
    /// Feature/gene snapshot of the reference side at match time.
    pub reference_details: Option<serde_json::Value>,
    /// Feature/gene snapshot of the matched side at match time.
    pub matched_details: Option<serde_json::Value>,
    /// When the match was found.
    pub found: chrono::DateTime<chrono::Utc>,
}

impl MatchRecord {
    /// Construct a fresh record with default status and no detail snapshots.
    pub fn new(
        reference: PatientRef,
        matched: PatientRef,
        score: f64,
        phenotype_score: f64,
        genotype_score: f64,
    ) -> Self {
        Self {
            reference,
            matched,
            score,
            phenotype_score,
            genotype_score,
            status: MatchStatus::default(),
            notified: false,
            reference_details: None,
            matched_details: None,
            found: chrono::Utc::now(),
        }
    }

    /// Return whether both records describe the same ordered patient pair.
    pub fn has_same_patients(&self, other: &MatchRecord) -> bool {
        self.reference == other.reference && self.matched == other.matched
    }

    /// Return whether `other` describes the same unordered pair with the
    /// roles swapped.
    pub fn is_equivalent(&self, other: &MatchRecord) -> bool {
        self.reference == other.matched && self.matched == other.reference
    }

    /// Return whether the given patient is the reference side.
    pub fn is_reference(&self, patient_id: &str, server_id: Option<&str>) -> bool {
        self.reference == PatientRef::new(patient_id, server_id)
    }

    /// Return whether the given patient is the matched side.
    pub fn is_matched(&self, patient_id: &str, server_id: Option<&str>) -> bool {
        self.matched == PatientRef::new(patient_id, server_id)
    }
}
