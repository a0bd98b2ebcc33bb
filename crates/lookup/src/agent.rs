//! The escalation agent: one entry point (`escalate`) that checks the durable
//! cache, spends rate-limiter budget, gathers web context, and asks the LLM
//! client for a structured answer.
//!
//! Only storage failures are fatal. Every lookup-side failure (denial, empty
//! context, timeout, malformed reply) degrades to an unresolved field whose
//! evidence trail says what happened.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use linea_core::{canonical_uom, PipelineConfig};
use linea_core::types::{FieldKind, FieldSource, LookupQuery, NormalizedField, ResolvedValue, SupplierId, UomPack};
use linea_normalize::UomNormalizer;
use linea_storage::{CacheValue, LookupCache, StoreError, StorePool};

use crate::client::{LlmClient, LookupContext, StructuredResult};
use crate::limiter::{Acquire, RateLimiter};
use crate::search::{SnippetSource, SourceSnippet};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A resolved answer below this certainty is treated as "nothing found" and
/// negatively cached, so a shaky guess never outranks local rules.
const MIN_USABLE_CERTAINTY: f32 = 0.5;

pub struct LookupAgent<C, S> {
    cache: LookupCache,
    limiter: RateLimiter,
    client: C,
    snippets: S,
    ttl: Duration,
    lookup_timeout: Duration,
    retry_backoff: Duration,
    default_confidence: f32,
    /// Latched on the first daily-cap denial; later escalations short-circuit
    /// without touching the limiter.
    daily_exhausted: AtomicBool,
}

impl<C: LlmClient, S: SnippetSource> LookupAgent<C, S> {
    pub fn new(
        cache: LookupCache,
        limiter: RateLimiter,
        client: C,
        snippets: S,
        ttl: Duration,
        lookup_timeout: Duration,
        retry_backoff: Duration,
        default_confidence: f32,
    ) -> Self {
        Self {
            cache,
            limiter,
            client,
            snippets,
            ttl,
            lookup_timeout,
            retry_backoff,
            default_confidence,
            daily_exhausted: AtomicBool::new(false),
        }
    }

    /// Wire an agent from the shared store and config in one step.
    pub fn from_config(pool: StorePool, config: &PipelineConfig, client: C, snippets: S) -> Self {
        let limiter = RateLimiter::new(
            pool.clone(),
            config.window_capacity,
            Duration::from_secs(config.window_secs),
            config.daily_cap,
        );
        Self::new(
            LookupCache::new(pool),
            limiter,
            client,
            snippets,
            Duration::from_secs(config.lookup_ttl_secs),
            Duration::from_secs(config.lookup_timeout_secs),
            Duration::from_millis(config.retry_backoff_ms),
            config.default_llm_confidence,
        )
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Escalate one low-confidence field. `hint` is free-text context from the
    /// surrounding document (for example a supplier header).
    pub async fn escalate(
        &self,
        field_kind: FieldKind,
        raw_text: &str,
        hint: Option<&str>,
    ) -> Result<NormalizedField<ResolvedValue>, LookupError> {
        let Some(query) = LookupQuery::new(field_kind, raw_text) else {
            return Ok(NormalizedField::unresolved(vec![format!(
                "no usable query handle in {raw_text:?}"
            )]));
        };

        if let Some(entry) = self.cache.get(&query.query_key).await? {
            debug!(key = %query.query_key, "cache hit");
            if entry.value.is_empty() {
                return Ok(NormalizedField::unresolved(vec![format!(
                    "prior lookup for {} found nothing (cached)",
                    query.query_key
                )]));
            }
            return Ok(match value_for_kind(field_kind, &entry.value) {
                Some(value) => {
                    let mut evidence = vec![format!("cache hit for {}", query.query_key)];
                    evidence.extend(entry.value.notes.iter().cloned());
                    NormalizedField::resolved(value, FieldSource::CacheHit, entry.confidence, evidence)
                }
                None => NormalizedField::unresolved(vec![format!(
                    "cached lookup for {} has no {} value",
                    query.query_key, field_kind
                )]),
            });
        }

        if self.daily_exhausted.load(Ordering::SeqCst) {
            return Ok(NormalizedField::unresolved(vec![
                "escalation denied: daily_cap_exhausted (latched)".to_string(),
            ]));
        }

        match self.limiter.try_acquire().await? {
            Acquire::Allowed => {}
            Acquire::Denied(denial) => {
                if denial.scope == crate::limiter::DenialScope::Daily {
                    self.daily_exhausted.store(true, Ordering::SeqCst);
                }
                return Ok(NormalizedField::unresolved(vec![format!(
                    "escalation denied: {} (retry after {}s)",
                    denial.evidence_tag(),
                    denial.retry_after.as_secs()
                )]));
            }
        }

        let snippets = self.snippets.gather(raw_text).await;
        if snippets.is_empty() {
            // A search that completed and found nothing is a completed lookup:
            // negative-cache it so reruns do not re-spend budget on the same
            // dead-end query.
            self.cache
                .put(&query.query_key, field_kind.as_str(), &CacheValue::empty(), 0.0, self.ttl)
                .await?;
            return Ok(NormalizedField::unresolved(vec![format!(
                "no supporting context found for {}",
                query.query_key
            )]));
        }

        // The rule engine is free; only spend the LLM if it finds nothing.
        if let Some((value, confidence)) = extract_from_snippets(field_kind, &snippets) {
            self.cache
                .put(&query.query_key, field_kind.as_str(), &value, confidence, self.ttl)
                .await?;
            info!(key = %query.query_key, confidence, "lookup resolved from snippet pattern");
            if let Some(resolved) = value_for_kind(field_kind, &value) {
                let mut evidence = vec![format!(
                    "pattern match in web snippet for {}",
                    query.query_key
                )];
                evidence.extend(value.notes.iter().cloned());
                return Ok(NormalizedField::resolved(
                    resolved,
                    FieldSource::LlmLookup,
                    confidence,
                    evidence,
                ));
            }
        }

        let ctx = LookupContext {
            field_kind,
            description: raw_text.to_string(),
            hint: hint.map(str::to_string),
            snippets,
        };

        let result = match self.query_once(&ctx).await {
            Ok(r) => r,
            Err(first_failure) => {
                // One retry, behind its own budget acquisition.
                tokio::time::sleep(self.retry_backoff).await;
                match self.limiter.try_acquire().await? {
                    Acquire::Allowed => {}
                    Acquire::Denied(denial) => {
                        if denial.scope == crate::limiter::DenialScope::Daily {
                            self.daily_exhausted.store(true, Ordering::SeqCst);
                        }
                        return Ok(NormalizedField::unresolved(vec![
                            first_failure,
                            format!("retry denied: {}", denial.evidence_tag()),
                        ]));
                    }
                }
                match self.query_once(&ctx).await {
                    Ok(r) => r,
                    Err(second_failure) => {
                        return Ok(NormalizedField::unresolved(vec![first_failure, second_failure]));
                    }
                }
            }
        };

        self.finish_lookup(&query, field_kind, result).await
    }

    async fn query_once(&self, ctx: &LookupContext) -> Result<StructuredResult, String> {
        match timeout(self.lookup_timeout, self.client.query(ctx)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(failure)) => Err(format!("lookup failed: {failure}")),
            Err(_) => Err(format!(
                "lookup timed out after {}s",
                self.lookup_timeout.as_secs()
            )),
        }
    }

    /// Cache the completed lookup and convert it to a field. Low-certainty or
    /// valueless answers are stored as empty so reruns skip the work.
    async fn finish_lookup(
        &self,
        query: &LookupQuery,
        field_kind: FieldKind,
        result: StructuredResult,
    ) -> Result<NormalizedField<ResolvedValue>, LookupError> {
        let usable = result.certainty.map_or(true, |c| c >= MIN_USABLE_CERTAINTY);
        let value = structured_to_cache_value(&result);

        if !usable || value_for_kind(field_kind, &value).is_none() {
            self.cache
                .put(&query.query_key, field_kind.as_str(), &CacheValue::empty(), 0.0, self.ttl)
                .await?;
            return Ok(NormalizedField::unresolved(vec![format!(
                "lookup completed without a usable {} value (certainty {:?})",
                field_kind, result.certainty
            )]));
        }

        let confidence = result.certainty.unwrap_or(self.default_confidence);
        self.cache
            .put(&query.query_key, field_kind.as_str(), &value, confidence, self.ttl)
            .await?;

        info!(key = %query.query_key, confidence, "lookup resolved");
        let mut evidence = vec![format!("llm lookup resolved {}", query.query_key)];
        evidence.extend(value.notes.iter().cloned());
        // value_for_kind was checked above.
        let resolved = match value_for_kind(field_kind, &value) {
            Some(v) => v,
            None => return Ok(NormalizedField::unresolved(evidence)),
        };
        Ok(NormalizedField::resolved(resolved, FieldSource::LlmLookup, confidence, evidence))
    }
}

/// Run the local UOM rule engine over gathered snippets before any LLM spend.
/// Only a hit that carries a pack quantity counts; bare UOM tokens in page
/// prose are too noisy to trust.
fn extract_from_snippets(
    field_kind: FieldKind,
    snippets: &[SourceSnippet],
) -> Option<(CacheValue, f32)> {
    if field_kind == FieldKind::Supplier {
        return None;
    }
    for s in snippets {
        let field = UomNormalizer::normalize(&s.snippet, "");
        let Some(pack) = field.value else { continue };
        if pack.pack_quantity.is_none() {
            continue;
        }
        let value = CacheValue {
            uom: Some(pack.uom),
            pack_quantity: pack.pack_quantity,
            supplier: None,
            notes: vec![format!("pattern match in snippet from {}", s.url)],
        };
        return Some((value, field.confidence));
    }
    None
}

fn structured_to_cache_value(result: &StructuredResult) -> CacheValue {
    let mut notes = Vec::new();
    if let Some(quote) = &result.evidence_text {
        notes.push(format!("source quote: {quote:?}"));
    }
    CacheValue {
        uom: result.uom.as_deref().map(canonical_uom),
        pack_quantity: result.pack_quantity,
        supplier: result.supplier.clone(),
        notes,
    }
}

fn value_for_kind(field_kind: FieldKind, value: &CacheValue) -> Option<ResolvedValue> {
    match field_kind {
        FieldKind::Uom => value.uom.clone().map(|uom| {
            ResolvedValue::UomPack(UomPack {
                uom,
                pack_quantity: value.pack_quantity,
                each_size: None,
            })
        }),
        FieldKind::PackQuantity => value.pack_quantity.map(ResolvedValue::PackQuantity),
        FieldKind::Supplier => value.supplier.clone().map(|s| ResolvedValue::Supplier(SupplierId(s))),
    }
}
