use crate::domain::error::RegistryError;
use crate::domain::model::{CacheStats, HealthStatus, ListType, MedicineRecord, SuklCode};
use crate::domain::traits::{RemoteReply, RemoteRequest, RemoteTransport};
use crate::infrastructure::config::RemoteConfig;
use crate::infrastructure::network::rate_limit::RateLimiter;
use crate::infrastructure::storage::cache::{CacheKey, ResponseCache};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MEDICINES_PATH: &str = "/dlp/v1/lecive-pripravky";
/// Known registration used as the health probe.
pub const HEALTH_PROBE_CODE: &str = "0254045";

// The registry answers with codes either as strings or as bare numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeValue {
    Text(String),
    Number(u64),
}

impl CodeValue {
    fn parse(&self) -> Result<SuklCode, RegistryError> {
        match self {
            CodeValue::Text(text) => SuklCode::parse(text),
            CodeValue::Number(n) => SuklCode::parse(&n.to_string()),
        }
    }
}

// Detail payload of /dlp/v1/lecive-pripravky/{code}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteMedicine {
    #[serde(rename = "kodSUKL")]
    kod_sukl: Option<CodeValue>,
    nazev: String,
    sila: Option<String>,
    lekova_forma_kod: Option<String>,
    baleni: Option<String>,
    #[serde(rename = "ATCkod")]
    atc_kod: Option<String>,
    stav_registrace_kod: Option<String>,
    zpusob_vydeje_kod: Option<String>,
    je_dodavka: Option<bool>,
    doplnek: Option<String>,
    registracni_cislo: Option<String>,
    drzitel_kod: Option<String>,
    cesta_kod: Option<String>,
}

impl RemoteMedicine {
    fn into_record(self, requested: &SuklCode) -> MedicineRecord {
        let code = self
            .kod_sukl
            .as_ref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_else(|| requested.clone());
        let text = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        MedicineRecord {
            code,
            name: self.nazev,
            strength: text(self.sila),
            form_code: text(self.lekova_forma_kod),
            package: text(self.baleni),
            supplement: text(self.doplnek),
            atc_code: text(self.atc_kod).map(|a| a.to_uppercase()),
            registration_status: text(self.stav_registrace_kod),
            registration_number: text(self.registracni_cislo),
            dispensing_mode: text(self.zpusob_vydeje_kod),
            route: text(self.cesta_kod),
            holder: text(self.drzitel_kod),
            is_available: self.je_dodavka.unwrap_or(false),
            substances: Vec::new(),
            pricing: None,
            documents: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    kod_chyby: Option<serde_json::Value>,
    popis_chyby: Option<String>,
}

fn error_detail(reply: &RemoteReply) -> String {
    match serde_json::from_slice::<ApiErrorBody>(&reply.body) {
        Ok(ApiErrorBody {
            popis_chyby: Some(text),
            kod_chyby,
        }) => match kod_chyby {
            Some(code) => format!("HTTP {} ({}): {}", reply.status, code, text),
            None => format!("HTTP {}: {}", reply.status, text),
        },
        _ => format!("HTTP {}", reply.status),
    }
}

/// Codes returned by a remote search, truncated to the requested limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCodes {
    pub codes: Vec<SuklCode>,
    pub total: usize,
}

/// Result of a batch detail fetch. Failed codes are left out of `records`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<MedicineRecord>,
    pub failed: Vec<(SuklCode, RegistryError)>,
}

impl BatchOutcome {
    pub fn omitted(&self) -> usize {
        self.failed.len()
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Codes(SearchCodes),
    Detail(MedicineRecord),
}

/// Exponential backoff with proportional jitter.
///
/// `retry` is zero-based: the first retry waits about `base`, the second
/// about `2 * base`. Jitter adds up to `jitter * delay` on top.
pub fn calculate_backoff(retry: u32, base: Duration, jitter: f64) -> Duration {
    let delay_ms = base.as_millis() as f64 * 2f64.powi(retry as i32);
    let jitter_ms = rand::random::<f64>() * jitter.clamp(0.0, 1.0) * delay_ms;
    Duration::from_millis((delay_ms + jitter_ms) as u64)
}

/// Rate-limited, cached, retrying client of the registry API.
pub struct RemoteClient {
    transport: Arc<dyn RemoteTransport>,
    limiter: Arc<RateLimiter>,
    cache: ResponseCache<Cached>,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        limiter: Arc<RateLimiter>,
        cache_ttl: Duration,
        cache_enabled: bool,
        config: RemoteConfig,
    ) -> Self {
        info!(
            "Remote client for {} (cache {}, ttl {}s)",
            config.base_url,
            if cache_enabled { "on" } else { "off" },
            cache_ttl.as_secs()
        );
        Self {
            transport,
            limiter,
            cache: ResponseCache::new(cache_ttl, cache_enabled),
            config,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        list_type: ListType,
        limit: usize,
    ) -> Result<SearchCodes, RegistryError> {
        let limit_text = limit.to_string();
        let key = CacheKey::new(
            "search",
            &[
                ("nazev", query),
                ("typSeznamu", list_type.as_str()),
                ("limit", limit_text.as_str()),
            ],
        );
        if let Some(Cached::Codes(codes)) = self.cache.get(&key) {
            return Ok(codes);
        }

        let request = RemoteRequest::get(MEDICINES_PATH, self.config.request_timeout())
            .param("nazev", query.trim())
            .param("typSeznamu", list_type.as_str());
        let body = self.execute(&request).await?;

        let raw: Vec<CodeValue> = serde_json::from_slice(&body)?;
        let total = raw.len();
        let mut codes = Vec::with_capacity(limit.min(total));
        for value in &raw {
            if codes.len() == limit {
                break;
            }
            match value.parse() {
                Ok(code) => codes.push(code),
                Err(e) => debug!("Ignoring search result: {}", e),
            }
        }
        let result = SearchCodes { codes, total };
        self.cache.put(key, Cached::Codes(result.clone()));
        Ok(result)
    }

    pub async fn get_detail(&self, code: &SuklCode) -> Result<MedicineRecord, RegistryError> {
        let key = CacheKey::new("detail", &[("code", code.as_str())]);
        if let Some(Cached::Detail(record)) = self.cache.get(&key) {
            return Ok(record);
        }

        let request = RemoteRequest::get(
            format!("{}/{}", MEDICINES_PATH, code),
            self.config.request_timeout(),
        );
        let body = self.execute(&request).await.map_err(|e| match e {
            RegistryError::NotFound(detail) => {
                RegistryError::NotFound(format!("medicine {} ({})", code, detail))
            }
            other => other,
        })?;
        let record = serde_json::from_slice::<RemoteMedicine>(&body)?.into_record(code);
        self.cache.put(key, Cached::Detail(record.clone()));
        Ok(record)
    }

    /// Fetches details with at most `max_concurrent` requests in flight.
    /// Result order follows `codes`.
    pub async fn get_batch(&self, codes: &[SuklCode], max_concurrent: usize) -> BatchOutcome {
        let results: Vec<(SuklCode, Result<MedicineRecord, RegistryError>)> =
            stream::iter(codes.iter().cloned())
                .map(|code| async move {
                    let result = self.get_detail(&code).await;
                    (code, result)
                })
                .buffered(max_concurrent.max(1))
                .collect()
                .await;

        let mut outcome = BatchOutcome::default();
        for (code, result) in results {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(e) => {
                    warn!("Batch detail for {} failed: {}", code, e);
                    outcome.failed.push((code, e));
                }
            }
        }
        outcome
    }

    /// One probe with the short health timeout; no cache, no retry.
    pub async fn health_check(&self) -> HealthStatus {
        if let Err(e) = self.limiter.admit().await {
            return HealthStatus {
                reachable: false,
                latency_ms: 0,
                status_code: None,
                error: Some(e.to_string()),
            };
        }
        let request = RemoteRequest::get(
            format!("{}/{}", MEDICINES_PATH, HEALTH_PROBE_CODE),
            self.config.health_timeout(),
        );
        let started = Instant::now();
        let result = self.transport.get(&request).await;
        let latency_ms = started.elapsed().as_millis();
        match result {
            Ok(reply) => HealthStatus {
                reachable: reply.status < 500,
                latency_ms,
                status_code: Some(reply.status),
                error: (reply.status >= 500).then(|| error_detail(&reply)),
            },
            Err(e) => HealthStatus {
                reachable: false,
                latency_ms,
                status_code: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Runs one request under the retry policy and returns the 2xx body.
    ///
    /// Transport failures and 5xx are retried up to `max_attempts` in total;
    /// every attempt takes a rate-limit slot. 4xx answers end immediately.
    async fn execute(&self, request: &RemoteRequest) -> Result<Vec<u8>, RegistryError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = calculate_backoff(
                    attempt - 1,
                    self.config.retry_base_delay(),
                    self.config.retry_jitter,
                );
                debug!(
                    "Retrying {} in {}ms (attempt {}/{})",
                    request.path,
                    delay.as_millis(),
                    attempt + 1,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            self.limiter.admit().await?;

            let reply = match self.transport.get(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!("{} failed: {}", request.path, e);
                    last_error = Some(RegistryError::RemoteUnavailable(e.to_string()));
                    continue;
                }
            };

            match reply.status {
                200..=299 => return Ok(reply.body),
                404 => return Err(RegistryError::NotFound(error_detail(&reply))),
                429 => return Err(RegistryError::RateLimitExceeded(error_detail(&reply))),
                400..=499 => return Err(RegistryError::Validation(error_detail(&reply))),
                500..=599 => {
                    debug!("{} answered {}", request.path, reply.status);
                    last_error = Some(RegistryError::RemoteUnavailable(error_detail(&reply)));
                }
                _ => {
                    return Err(RegistryError::MalformedResponse(format!(
                        "unexpected HTTP status {}",
                        reply.status
                    )))
                }
            }
        }

        let err = last_error.unwrap_or_else(|| {
            RegistryError::RemoteUnavailable(format!("{} not attempted", request.path))
        });
        warn!(
            "{} gave up after {} attempts: {}",
            request.path, max_attempts, err
        );
        Err(err)
    }
}
