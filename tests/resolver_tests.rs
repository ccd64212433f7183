//! End-to-end behaviour of the hybrid resolver over scripted transports

mod common;

use common::*;
use std::collections::HashMap;
use sukl_registry::infrastructure::config::RateLimitMode;
use sukl_registry::{
    ErrorKind, FallbackCause, MatchKind, PharmacyCriteria, Provenance, RegistryError,
    SearchFilters,
};

fn ibuprofen_registry() -> std::sync::Arc<ScriptedTransport> {
    let details = HashMap::from([
        ("0012345".to_string(), detail_json("0012345", "NUROFEN", "M01AE01", true)),
        ("0000101".to_string(), detail_json("0000101", "IBUPROFEN AL", "M01AE01", true)),
        ("0000102".to_string(), detail_json("0000102", "IBALGIN", "M01AE01", false)),
        ("0000103".to_string(), detail_json("0000103", "BRUFEN", "M01AE01", true)),
        ("0000104".to_string(), detail_json("0000104", "MODAFEN", "M01AE51", true)),
        ("0000105".to_string(), detail_json("0000105", "IBUPROFEN", "M01AE01", true)),
    ]);
    ScriptedTransport::registry(
        vec!["0012345", "0000101", "0000102", "0000103", "0000104", "0000105"],
        details,
    )
}

#[tokio::test]
async fn test_search_remote_healthy() {
    let core = core(ibuprofen_registry());
    let result = core
        .resolver
        .search("ibuprofen", SearchFilters::default(), 5)
        .await
        .unwrap();

    assert_eq!(result.provenance, Provenance::Remote);
    assert_eq!(result.hits.len(), 5);
    assert_eq!(result.omitted, 0);
    assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(result.hits[0].record.name, "IBUPROFEN AL");
    assert_eq!(result.hits[0].kind, MatchKind::Prefix);
    // the bulk archive is never touched on the happy path
    assert_eq!(core.dataset.load_count(), 0);
}

#[tokio::test]
async fn test_search_falls_back_when_remote_down() {
    let transport = ScriptedTransport::down();
    let core = core(transport.clone());
    let result = core
        .resolver
        .search("ibuprofen", SearchFilters::default(), 5)
        .await
        .unwrap();

    assert_eq!(
        result.provenance,
        Provenance::BulkFallback(FallbackCause::Unavailable)
    );
    assert_eq!(result.provenance.to_string(), "bulk_fallback_unavailable");
    // all exact on the substance: shorter name first, then code
    let names: Vec<&str> = result.hits.iter().map(|h| h.record.name.as_str()).collect();
    assert_eq!(names, vec!["BRUFEN", "IBALGIN", "MODAFEN", "NUROFEN", "IBUPROFEN AL"]);
    assert!(result
        .hits
        .iter()
        .all(|h| h.record.substances.iter().any(|s| s == "IBUPROFEN")));
    // three attempts for the search, then no more remote calls
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_search_filters_on_remote_path() {
    let core = core(ibuprofen_registry());
    let filters = SearchFilters {
        only_available: false,
        only_reimbursed: true,
    };
    let result = core.resolver.search("ibuprofen", filters, 2).await.unwrap();

    assert_eq!(result.provenance, Provenance::Remote);
    assert_eq!(result.hits.len(), 1);
    let record = &result.hits[0].record;
    assert_eq!(record.code.as_str(), "0012345");
    assert_eq!(
        record.pricing.as_ref().and_then(|p| p.reimbursement_amount),
        Some(45.1)
    );
}

#[tokio::test]
async fn test_search_only_available_in_fallback() {
    let core = core(ScriptedTransport::down());
    let filters = SearchFilters {
        only_available: true,
        only_reimbursed: false,
    };
    let result = core.resolver.search("ibuprofen", filters, 10).await.unwrap();
    assert!(result.provenance.is_fallback());
    assert!(result.hits.iter().all(|h| h.record.is_available));
    assert!(result.hits.iter().all(|h| h.record.code.as_str() != "0000102"));
}

#[tokio::test]
async fn test_search_repeated_is_served_from_cache() {
    let transport = ibuprofen_registry();
    let core = core(transport.clone());
    core.resolver
        .search("Ibuprofen", SearchFilters::default(), 5)
        .await
        .unwrap();
    let after_first = transport.calls();
    assert_eq!(after_first, 6);

    core.resolver
        .search(" ibuprofen", SearchFilters::default(), 5)
        .await
        .unwrap();
    assert_eq!(transport.calls(), after_first);
    assert_eq!(core.limiter.in_window(), after_first);
}

#[tokio::test]
async fn test_detail_merges_remote_and_bulk_fields() {
    let core = core(ibuprofen_registry());
    let result = core.resolver.get_detail("12345").await.unwrap();

    assert_eq!(result.provenance, Provenance::Remote);
    assert!(result.bulk_merged);
    let record = &result.record;
    assert_eq!(record.code.as_str(), "0012345");
    // registration fields come from the remote record
    assert_eq!(record.registration_status.as_deref(), Some("R"));
    assert_eq!(record.registration_number.as_deref(), Some("29/ 123/91-C"));
    // price and documents only exist in the bulk dataset
    let pricing = record.pricing.as_ref().unwrap();
    assert_eq!(pricing.max_retail_price, Some(89.9));
    assert_eq!(
        record.documents.as_ref().and_then(|d| d.pil.as_deref()),
        Some("PI123.pdf")
    );
    assert_eq!(record.substances, vec!["IBUPROFEN".to_string()]);
}

#[tokio::test]
async fn test_detail_not_found_does_not_fall_back() {
    let transport = ScriptedTransport::registry(vec![], HashMap::new());
    let core = core(transport.clone());
    let err = core.resolver.get_detail("0012345").await.unwrap_err();

    assert!(matches!(err, RegistryError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(transport.calls(), 1);
    assert_eq!(core.dataset.load_count(), 0);
}

#[tokio::test]
async fn test_detail_malformed_response_falls_back() {
    let core = core(ScriptedTransport::new(|_| json(200, "<html>maintenance</html>")));
    let result = core.resolver.get_detail("0012345").await.unwrap();

    assert_eq!(
        result.provenance,
        Provenance::BulkFallback(FallbackCause::Malformed)
    );
    assert_eq!(result.record.name, "NUROFEN");
    assert_eq!(
        result.record.registration_number.as_deref(),
        Some("07/ 123/91-C")
    );
}

#[tokio::test]
async fn test_detail_fallback_missing_code_is_not_found() {
    let core = core(ScriptedTransport::down());
    let err = core.resolver.get_detail("7654321").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_detail_degrades_when_bulk_unavailable() {
    let core = core_with(
        test_config(),
        ibuprofen_registry(),
        b"not an archive".to_vec(),
        1024 * 1024,
    );
    let result = core.resolver.get_detail("0012345").await.unwrap();
    assert_eq!(result.provenance, Provenance::Remote);
    assert!(!result.bulk_merged);
    assert!(result.record.pricing.is_none());
}

#[tokio::test]
async fn test_fallback_with_broken_archive_is_data_unavailable() {
    let core = core_with(
        test_config(),
        ScriptedTransport::down(),
        b"not an archive".to_vec(),
        1024 * 1024,
    );
    let err = core
        .resolver
        .search("ibuprofen", SearchFilters::default(), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::DataUnavailable(_)));
    assert!(err.kind().is_terminal());
    assert!(core.dataset.current().is_none());
}

#[tokio::test]
async fn test_oversized_archive_is_rejected() {
    let core = core_with(
        test_config(),
        ScriptedTransport::down(),
        sample_archive(),
        512,
    );
    let err = core
        .resolver
        .search("ibuprofen", SearchFilters::default(), 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ZipBomb);
    assert!(core.dataset.current().is_none());

    // the next access tries again and fails the same way
    let again = core.resolver.get_reimbursement("0012345").await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::ZipBomb);
    assert_eq!(core.dataset.load_count(), 2);
}

#[tokio::test]
async fn test_rate_limited_remote_falls_back() {
    let mut config = test_config();
    config.rate_limit.max_requests_per_minute = 1;
    config.rate_limit.mode = RateLimitMode::FailFast;
    let core = core_with(config, ibuprofen_registry(), sample_archive(), 1 << 26);

    let result = core
        .resolver
        .search("ibuprofen", SearchFilters::default(), 3)
        .await
        .unwrap();
    assert_eq!(result.provenance.to_string(), "bulk_fallback_rate_limited");
    assert_eq!(result.hits.len(), 3);
}

#[tokio::test]
async fn test_validation_fails_before_any_call() {
    let transport = ibuprofen_registry();
    let core = core(transport.clone());

    let err = core
        .resolver
        .search("   ", SearchFilters::default(), 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = core
        .resolver
        .search("ibuprofen", SearchFilters::default(), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = core.resolver.get_detail("12a45").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = core.resolver.get_atc_info("1234").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(transport.calls(), 0);
    assert_eq!(core.dataset.load_count(), 0);
}

#[tokio::test]
async fn test_availability_lists_alternatives() {
    let core = core(ibuprofen_registry());
    let info = core.resolver.check_availability("102").await.unwrap();

    assert_eq!(info.code.as_str(), "0000102");
    assert!(!info.is_available);
    assert_eq!(info.provenance, Provenance::Remote);
    let names: Vec<&str> = info.alternatives.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["BRUFEN", "IBUPROFEN AL", "NUROFEN"]);
    assert!(info.alternatives.iter().all(|a| a.is_available));
}

#[tokio::test]
async fn test_availability_of_supplied_medicine_has_no_alternatives() {
    let core = core(ibuprofen_registry());
    let info = core.resolver.check_availability("0012345").await.unwrap();
    assert!(info.is_available);
    assert!(info.alternatives.is_empty());
}

#[tokio::test]
async fn test_reimbursement_is_bulk_sourced() {
    let transport = ibuprofen_registry();
    let core = core(transport.clone());

    let info = core.resolver.get_reimbursement("12345").await.unwrap();
    assert_eq!(info.provenance, Provenance::Bulk);
    assert!(info.is_reimbursed);
    let record = info.reimbursement.unwrap();
    assert_eq!(record.max_retail_price, Some(89.9));
    assert_eq!(record.reimbursement_group.as_deref(), Some("12"));

    let info = core.resolver.get_reimbursement("101").await.unwrap();
    assert!(!info.is_reimbursed);
    let info = core.resolver.get_reimbursement("201").await.unwrap();
    assert!(info.reimbursement.is_none());

    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_find_pharmacies() {
    let core = core(ScriptedTransport::down());
    let resolver = &core.resolver;

    let prague = PharmacyCriteria {
        city: Some("praha".into()),
        limit: 10,
        ..Default::default()
    };
    let found = resolver.find_pharmacies(&prague).await.unwrap();
    assert_eq!(found.provenance, Provenance::Bulk);
    // the inactive one is left out
    assert_eq!(found.pharmacies.len(), 1);
    assert_eq!(found.pharmacies[0].name, "Lékárna U Anděla");
    assert!(found.pharmacies[0].has_24h_service);

    let by_postal = PharmacyCriteria {
        postal_code: Some("602 00".into()),
        has_online_sales: true,
        limit: 10,
        ..Default::default()
    };
    let found = resolver.find_pharmacies(&by_postal).await.unwrap();
    assert_eq!(found.pharmacies.len(), 1);
    assert_eq!(found.pharmacies[0].city, "Brno");

    let nonstop_brno = PharmacyCriteria {
        city: Some("Brno".into()),
        has_24h: true,
        limit: 10,
        ..Default::default()
    };
    assert!(resolver
        .find_pharmacies(&nonstop_brno)
        .await
        .unwrap()
        .pharmacies
        .is_empty());
}

#[tokio::test]
async fn test_atc_info() {
    let core = core(ScriptedTransport::down());
    let info = core.resolver.get_atc_info("m01a").await.unwrap();

    assert_eq!(info.group.code, "M01A");
    assert_eq!(info.group.level, 3);
    assert_eq!(info.total_children, 3);
    let codes: Vec<&str> = info.children.iter().map(|g| g.code.as_str()).collect();
    assert_eq!(codes, vec!["M01AE", "M01AE01", "M01AE51"]);

    let err = core.resolver.get_atc_info("X01").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_health_report() {
    let core = core(ibuprofen_registry());
    let report = core.resolver.health().await;
    assert!(report.remote.reachable);
    assert_eq!(report.remote.status_code, Some(404));
    assert!(report.dataset.is_none());

    core.resolver.get_reimbursement("12345").await.unwrap();
    let report = core.resolver.health().await;
    let version = report.dataset.unwrap();
    assert_eq!(version.sequence, 1);
    assert_eq!(version.medicines, 7);
    assert_eq!(version.pharmacies, 3);

    core.shutdown();
    assert!(core.dataset.current().is_none());
}

#[tokio::test]
async fn test_health_report_when_down() {
    let transport = ScriptedTransport::down();
    let core = core(transport.clone());
    let report = core.resolver.health().await;
    assert!(!report.remote.reachable);
    assert!(report.remote.error.is_some());
    assert_eq!(transport.calls(), 1);
}
