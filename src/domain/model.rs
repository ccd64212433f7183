use crate::domain::error::RegistryError;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Registry identity code: exactly seven ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SuklCode(String);

impl SuklCode {
    pub const LEN: usize = 7;

    /// Trims and left-pads shorter numeric input with zeros.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RegistryError::validation("SUKL code must not be empty"));
        }
        if trimmed.len() > Self::LEN || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RegistryError::validation(format!(
                "invalid SUKL code '{}': expected up to {} digits",
                trimmed,
                Self::LEN
            )));
        }
        Ok(Self(format!("{:0>7}", trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuklCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Bulk-only pricing attached to a medicine after a merge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pricing {
    pub max_producer_price: Option<f64>,
    pub max_retail_price: Option<f64>,
    pub reimbursement_amount: Option<f64>,
    pub patient_copay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicineRecord {
    pub code: SuklCode,
    pub name: String,
    pub strength: Option<String>,
    pub form_code: Option<String>,
    pub package: Option<String>,
    pub supplement: Option<String>,
    pub atc_code: Option<String>,
    pub registration_status: Option<String>,
    pub registration_number: Option<String>,
    pub dispensing_mode: Option<String>,
    pub route: Option<String>,
    pub holder: Option<String>,
    pub is_available: bool,
    pub substances: Vec<String>,
    pub pricing: Option<Pricing>,
    pub documents: Option<DocumentRecord>,
}

impl MedicineRecord {
    /// Returns a copy carrying the fields the remote service never provides.
    ///
    /// Everything the remote record already has wins; only absent values are
    /// taken from the bulk row.
    pub fn merged_with_bulk(
        &self,
        bulk: Option<&MedicineRecord>,
        reimbursement: Option<&ReimbursementRecord>,
        documents: Option<&DocumentRecord>,
    ) -> MedicineRecord {
        let mut merged = self.clone();
        if let Some(bulk) = bulk {
            if merged.substances.is_empty() {
                merged.substances = bulk.substances.clone();
            }
            merged.strength = merged.strength.or_else(|| bulk.strength.clone());
            merged.package = merged.package.or_else(|| bulk.package.clone());
            merged.atc_code = merged.atc_code.or_else(|| bulk.atc_code.clone());
            merged.route = merged.route.or_else(|| bulk.route.clone());
            merged.holder = merged.holder.or_else(|| bulk.holder.clone());
        }
        merged.pricing = reimbursement.map(ReimbursementRecord::pricing);
        merged.documents = documents.cloned();
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReimbursementRecord {
    pub code: SuklCode,
    pub max_producer_price: Option<f64>,
    pub max_retail_price: Option<f64>,
    pub reimbursement_amount: Option<f64>,
    pub patient_copay: Option<f64>,
    pub reimbursement_group: Option<String>,
    pub indication_limit: Option<String>,
    pub prescription_limit: Option<String>,
    pub specialist_only: bool,
}

impl ReimbursementRecord {
    pub fn is_reimbursed(&self) -> bool {
        self.reimbursement_amount.is_some_and(|amount| amount > 0.0)
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            max_producer_price: self.max_producer_price,
            max_retail_price: self.max_retail_price,
            reimbursement_amount: self.reimbursement_amount,
            patient_copay: self.patient_copay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub pil: Option<String>,
    pub spc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PharmacyRecord {
    pub id: String,
    pub name: String,
    pub street: Option<String>,
    pub city: String,
    pub postal_code: Option<String>,
    pub district: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub web: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub operator: Option<String>,
    pub has_24h_service: bool,
    pub has_internet_sales: bool,
    pub has_preparation_lab: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtcGroup {
    pub code: String,
    pub name: String,
    pub name_en: Option<String>,
    pub level: u8,
}

impl AtcGroup {
    /// ATC level from code length: 1, 3, 4, 5 and 7 characters map to 1..=5.
    pub fn level_for(code: &str) -> u8 {
        match code.len() {
            0 | 1 => 1,
            2 | 3 => 2,
            4 => 3,
            5 | 6 => 4,
            _ => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Fuzzy,
    Substring,
    Prefix,
    Exact,
}

/// Why a result was answered from the bulk dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    Unavailable,
    Malformed,
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Remote,
    Bulk,
    BulkFallback(FallbackCause),
}

impl Provenance {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Provenance::BulkFallback(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Remote => f.write_str("remote"),
            Provenance::Bulk => f.write_str("bulk"),
            Provenance::BulkFallback(FallbackCause::Unavailable) => {
                f.write_str("bulk_fallback_unavailable")
            }
            Provenance::BulkFallback(FallbackCause::Malformed) => {
                f.write_str("bulk_fallback_malformed")
            }
            Provenance::BulkFallback(FallbackCause::RateLimited) => {
                f.write_str("bulk_fallback_rate_limited")
            }
        }
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchFilters {
    pub only_available: bool,
    pub only_reimbursed: bool,
}

impl SearchFilters {
    pub fn is_active(&self) -> bool {
        self.only_available || self.only_reimbursed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub record: MedicineRecord,
    pub score: u32,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub provenance: Provenance,
    /// Codes the remote search returned whose detail fetch failed.
    pub omitted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailResult {
    pub record: MedicineRecord,
    pub provenance: Provenance,
    pub bulk_merged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alternative {
    pub code: SuklCode,
    pub name: String,
    pub strength: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityInfo {
    pub code: SuklCode,
    pub name: String,
    pub is_available: bool,
    pub registration_status: Option<String>,
    pub dispensing_mode: Option<String>,
    pub alternatives: Vec<Alternative>,
    pub provenance: Provenance,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReimbursementInfo {
    pub code: SuklCode,
    pub name: String,
    pub is_reimbursed: bool,
    pub reimbursement: Option<ReimbursementRecord>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default)]
pub struct PharmacyCriteria {
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub has_24h: bool,
    pub has_online_sales: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PharmacyResult {
    pub pharmacies: Vec<PharmacyRecord>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtcInfo {
    pub group: AtcGroup,
    pub children: Vec<AtcGroup>,
    pub total_children: usize,
    pub provenance: Provenance,
}

/// Remote list selector (`typSeznamu`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    Dlpo,
    Scau,
    Scup,
    Sneh,
    Splp,
    Vpois,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Dlpo => "dlpo",
            ListType::Scau => "scau",
            ListType::Scup => "scup",
            ListType::Sneh => "sneh",
            ListType::Splp => "splp",
            ListType::Vpois => "vpois",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub reachable: bool,
    pub latency_ms: u128,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub stale_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotVersion {
    pub sequence: u64,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
    pub medicines: usize,
    pub substances: usize,
    pub pharmacies: usize,
    pub atc_groups: usize,
    pub reimbursements: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub remote: HealthStatus,
    pub dataset: Option<SnapshotVersion>,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_zero_padded() {
        assert_eq!(SuklCode::parse(" 254045 ").unwrap().as_str(), "0254045");
        assert_eq!(SuklCode::parse("0012345").unwrap().as_str(), "0012345");
    }

    #[test]
    fn code_rejects_garbage() {
        assert!(SuklCode::parse("").is_err());
        assert!(SuklCode::parse("12a4567").is_err());
        assert!(SuklCode::parse("12345678").is_err());
    }

    #[test]
    fn provenance_renders_tags() {
        assert_eq!(Provenance::Remote.to_string(), "remote");
        assert_eq!(
            Provenance::BulkFallback(FallbackCause::Unavailable).to_string(),
            "bulk_fallback_unavailable"
        );
        let json = serde_json::to_string(&Provenance::Bulk).unwrap();
        assert_eq!(json, "\"bulk\"");
    }

    #[test]
    fn match_kinds_order_by_strength() {
        assert!(MatchKind::Exact > MatchKind::Prefix);
        assert!(MatchKind::Prefix > MatchKind::Substring);
        assert!(MatchKind::Substring > MatchKind::Fuzzy);
    }

    #[test]
    fn atc_levels() {
        assert_eq!(AtcGroup::level_for("N"), 1);
        assert_eq!(AtcGroup::level_for("N02"), 2);
        assert_eq!(AtcGroup::level_for("N02B"), 3);
        assert_eq!(AtcGroup::level_for("N02BE"), 4);
        assert_eq!(AtcGroup::level_for("N02BE01"), 5);
    }
}
