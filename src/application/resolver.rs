use crate::domain::error::{ErrorKind, RegistryError};
use crate::domain::matcher::{normalize, MatchScore};
use crate::domain::model::{
    AtcInfo, AvailabilityInfo, DetailResult, FallbackCause, HealthReport, ListType,
    MedicineRecord, PharmacyCriteria, PharmacyResult, Provenance, ReimbursementInfo,
    SearchFilters, SearchHit, SearchResult, SuklCode,
};
use crate::infrastructure::network::client::RemoteClient;
use crate::infrastructure::storage::dataset::BulkDataset;
use crate::infrastructure::storage::snapshot::Snapshot;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub const MAX_LIMIT: usize = 100;
pub const MAX_QUERY_LEN: usize = 200;
/// Alternatives offered for an unavailable medicine.
pub const MAX_ALTERNATIVES: usize = 5;

fn validate_limit(limit: usize) -> Result<(), RegistryError> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(RegistryError::validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_LIMIT, limit
        )));
    }
    Ok(())
}

fn validate_query(query: &str) -> Result<&str, RegistryError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RegistryError::validation("search query must not be empty"));
    }
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(RegistryError::validation(format!(
            "search query is longer than {} characters",
            MAX_QUERY_LEN
        )));
    }
    Ok(query)
}

fn validate_atc(code: &str) -> Result<String, RegistryError> {
    let code = code.trim().to_uppercase();
    let valid = (1..=7).contains(&code.len())
        && code.starts_with(|c: char| c.is_ascii_alphabetic())
        && code.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(RegistryError::validation(format!(
            "invalid ATC code '{}': expected 1 to 7 letters and digits",
            code
        )));
    }
    Ok(code)
}

fn validate_criteria(criteria: &PharmacyCriteria) -> Result<(), RegistryError> {
    validate_limit(criteria.limit)?;
    if let Some(psc) = &criteria.postal_code {
        let digits: String = psc.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RegistryError::validation(format!(
                "invalid postal code '{}': expected 5 digits",
                psc
            )));
        }
    }
    if let Some(city) = &criteria.city {
        if city.trim().is_empty() || city.chars().count() > MAX_QUERY_LEN {
            return Err(RegistryError::validation("city must be 1 to 200 characters"));
        }
    }
    Ok(())
}

fn fallback_cause(err: &RegistryError) -> FallbackCause {
    match err {
        RegistryError::MalformedResponse(_) => FallbackCause::Malformed,
        RegistryError::RateLimitExceeded(_) => FallbackCause::RateLimited,
        _ => FallbackCause::Unavailable,
    }
}

/// Bulk failures leave the core as `DataUnavailable`; a rejected archive
/// keeps its own kind.
fn data_unavailable(err: RegistryError) -> RegistryError {
    match err.kind() {
        ErrorKind::ZipBomb | ErrorKind::DataUnavailable => match err {
            RegistryError::Dataset(detail) => RegistryError::DataUnavailable(detail),
            other => other,
        },
        _ => RegistryError::DataUnavailable(format!("bulk dataset could not be loaded: {}", err)),
    }
}

fn rank_order(a: &SearchHit, b: &SearchHit) -> std::cmp::Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.record.name.chars().count().cmp(&b.record.name.chars().count()))
        .then_with(|| a.record.code.cmp(&b.record.code))
}

/// Answers every core operation from the remote service or the bulk
/// dataset, and says which one it used.
pub struct HybridResolver {
    remote: Arc<RemoteClient>,
    dataset: Arc<BulkDataset>,
    batch_concurrency: usize,
}

impl HybridResolver {
    pub fn new(
        remote: Arc<RemoteClient>,
        dataset: Arc<BulkDataset>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            remote,
            dataset,
            batch_concurrency,
        }
    }

    async fn bulk_snapshot(&self) -> Result<Arc<Snapshot>, RegistryError> {
        self.dataset.snapshot().await.map_err(data_unavailable)
    }

    pub async fn search(
        &self,
        query: &str,
        filters: SearchFilters,
        limit: usize,
    ) -> Result<SearchResult, RegistryError> {
        let query = validate_query(query)?;
        validate_limit(limit)?;

        match self.search_remote(query, filters, limit).await {
            Ok(result) => Ok(result),
            Err(e) if e.kind().triggers_fallback() => {
                warn!("Remote search failed, answering from bulk dataset: {}", e);
                let snapshot = self.bulk_snapshot().await?;
                let mut hits = snapshot.search_by_substance_or_atc(
                    self.dataset.matcher(),
                    query,
                    limit,
                    filters,
                );
                hits.sort_by(rank_order);
                Ok(SearchResult {
                    query: query.to_string(),
                    hits,
                    provenance: Provenance::BulkFallback(fallback_cause(&e)),
                    omitted: 0,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn search_remote(
        &self,
        query: &str,
        filters: SearchFilters,
        limit: usize,
    ) -> Result<SearchResult, RegistryError> {
        let wanted = if filters.is_active() {
            (limit * 3).min(MAX_LIMIT)
        } else {
            limit
        };
        let found = self.remote.search(query, ListType::default(), wanted).await?;
        let outcome = self
            .remote
            .get_batch(&found.codes, self.batch_concurrency)
            .await;

        if outcome.records.is_empty() {
            // nothing fetched because the service went away mid-batch
            if let Some((_, e)) = outcome
                .failed
                .iter()
                .find(|(_, e)| e.kind().triggers_fallback())
            {
                return Err(e.clone());
            }
        }

        let snapshot = if filters.only_reimbursed {
            Some(self.bulk_snapshot().await?)
        } else {
            self.dataset.current()
        };

        let matcher = self.dataset.matcher();
        let normalized = normalize(query);
        let mut hits: Vec<SearchHit> = outcome
            .records
            .iter()
            .filter(|record| !filters.only_available || record.is_available)
            .filter(|record| {
                !filters.only_reimbursed
                    || snapshot
                        .as_ref()
                        .is_some_and(|s| s.is_reimbursed(&record.code))
            })
            .map(|record| {
                let name = normalize(&record.name);
                let atc = record.atc_code.as_deref().map(normalize);
                let score = matcher
                    .match_fields(&normalized, std::iter::once(name.as_str()).chain(atc.as_deref()))
                    .unwrap_or_else(|| MatchScore::weakest(name.chars().count()));
                let record = match &snapshot {
                    Some(s) => Self::merge(record, s),
                    None => record.clone(),
                };
                SearchHit {
                    record,
                    score: score.score(),
                    kind: score.kind,
                }
            })
            .collect();
        hits.sort_by(rank_order);
        hits.truncate(limit);

        debug!(
            "Remote search '{}': {} codes, {} hits, {} omitted",
            query,
            found.total,
            hits.len(),
            outcome.omitted()
        );
        Ok(SearchResult {
            query: query.to_string(),
            hits,
            provenance: Provenance::Remote,
            omitted: outcome.omitted(),
        })
    }

    fn merge(record: &MedicineRecord, snapshot: &Snapshot) -> MedicineRecord {
        record.merged_with_bulk(
            snapshot.lookup_by_code(&record.code),
            snapshot.reimbursement(&record.code),
            snapshot.documents(&record.code),
        )
    }

    pub async fn get_detail(&self, code: &str) -> Result<DetailResult, RegistryError> {
        let code = SuklCode::parse(code)?;

        match self.remote.get_detail(&code).await {
            Ok(record) => match self.dataset.snapshot().await {
                Ok(snapshot) => Ok(DetailResult {
                    record: Self::merge(&record, &snapshot),
                    provenance: Provenance::Remote,
                    bulk_merged: true,
                }),
                Err(e) => {
                    warn!("Bulk fields for {} unavailable: {}", code, e);
                    Ok(DetailResult {
                        record,
                        provenance: Provenance::Remote,
                        bulk_merged: false,
                    })
                }
            },
            Err(e) if e.kind().triggers_fallback() => {
                warn!("Remote detail for {} failed, using bulk dataset: {}", code, e);
                let snapshot = self.bulk_snapshot().await?;
                let record = snapshot
                    .lookup_by_code(&code)
                    .cloned()
                    .ok_or_else(|| RegistryError::not_found(format!("medicine {}", code)))?;
                Ok(DetailResult {
                    record,
                    provenance: Provenance::BulkFallback(fallback_cause(&e)),
                    bulk_merged: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Availability with generic alternatives when the medicine is not
    /// being supplied. Alternatives are best effort.
    pub async fn check_availability(&self, code: &str) -> Result<AvailabilityInfo, RegistryError> {
        let detail = self.get_detail(code).await?;
        let record = detail.record;

        let alternatives = if record.is_available {
            Vec::new()
        } else {
            match self.dataset.snapshot().await {
                Ok(snapshot) => snapshot.generic_alternatives(&record.code, MAX_ALTERNATIVES),
                Err(e) => {
                    warn!("No alternatives for {}: {}", record.code, e);
                    Vec::new()
                }
            }
        };

        Ok(AvailabilityInfo {
            code: record.code,
            name: record.name,
            is_available: record.is_available,
            registration_status: record.registration_status,
            dispensing_mode: record.dispensing_mode,
            alternatives,
            provenance: detail.provenance,
            checked_at: Utc::now(),
        })
    }

    pub async fn get_reimbursement(&self, code: &str) -> Result<ReimbursementInfo, RegistryError> {
        let code = SuklCode::parse(code)?;
        let snapshot = self.bulk_snapshot().await?;
        let record = snapshot
            .lookup_by_code(&code)
            .ok_or_else(|| RegistryError::not_found(format!("medicine {}", code)))?;
        let reimbursement = snapshot.reimbursement(&code).cloned();

        Ok(ReimbursementInfo {
            is_reimbursed: reimbursement.as_ref().is_some_and(|r| r.is_reimbursed()),
            name: record.name.clone(),
            code,
            reimbursement,
            provenance: Provenance::Bulk,
        })
    }

    pub async fn find_pharmacies(
        &self,
        criteria: &PharmacyCriteria,
    ) -> Result<PharmacyResult, RegistryError> {
        validate_criteria(criteria)?;
        let snapshot = self.bulk_snapshot().await?;
        Ok(PharmacyResult {
            pharmacies: snapshot.find_pharmacies(criteria),
            provenance: Provenance::Bulk,
        })
    }

    pub async fn get_atc_info(&self, code: &str) -> Result<AtcInfo, RegistryError> {
        let code = validate_atc(code)?;
        let snapshot = self.bulk_snapshot().await?;
        let tree = snapshot
            .atc_group(&code)
            .ok_or_else(|| RegistryError::not_found(format!("ATC group {}", code)))?;
        Ok(AtcInfo {
            group: tree.group,
            children: tree.children,
            total_children: tree.total_children,
            provenance: Provenance::Bulk,
        })
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            remote: self.remote.health_check().await,
            dataset: self.dataset.current().map(|s| s.version().clone()),
            cache: self.remote.cache_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ZipBombStage;

    #[test]
    fn limits_and_queries_are_validated() {
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(101).is_err());
        assert!(validate_limit(100).is_ok());
        assert!(validate_query("   ").is_err());
        assert_eq!(validate_query("  ibuprofen ").unwrap(), "ibuprofen");
        assert!(validate_query(&"a".repeat(201)).is_err());
    }

    #[test]
    fn atc_codes_are_validated() {
        assert_eq!(validate_atc(" n02be01 ").unwrap(), "N02BE01");
        assert!(validate_atc("").is_err());
        assert!(validate_atc("N02BE012").is_err());
        assert!(validate_atc("02").is_err());
        assert!(validate_atc("N0-").is_err());
    }

    #[test]
    fn postal_codes_are_validated() {
        let mut criteria = PharmacyCriteria {
            postal_code: Some("110 00".into()),
            limit: 10,
            ..Default::default()
        };
        assert!(validate_criteria(&criteria).is_ok());
        criteria.postal_code = Some("1100".into());
        assert!(validate_criteria(&criteria).is_err());
        criteria.postal_code = None;
        criteria.limit = 0;
        assert!(validate_criteria(&criteria).is_err());
    }

    #[test]
    fn bulk_failures_become_data_unavailable() {
        let err = data_unavailable(RegistryError::Dataset("bad zip".into()));
        assert!(matches!(err, RegistryError::DataUnavailable(_)));
        let err = data_unavailable(RegistryError::RemoteUnavailable("dns".into()));
        assert!(matches!(err, RegistryError::DataUnavailable(_)));
        let bomb = RegistryError::ZipBomb {
            stage: ZipBombStage::Declared,
            size: 2,
            cap: 1,
        };
        assert!(matches!(data_unavailable(bomb), RegistryError::ZipBomb { .. }));
    }

    #[test]
    fn fallback_causes() {
        assert_eq!(
            fallback_cause(&RegistryError::MalformedResponse("x".into())),
            FallbackCause::Malformed
        );
        assert_eq!(
            fallback_cause(&RegistryError::RateLimitExceeded("x".into())),
            FallbackCause::RateLimited
        );
        assert_eq!(
            fallback_cause(&RegistryError::RemoteUnavailable("x".into())),
            FallbackCause::Unavailable
        );
    }
}
