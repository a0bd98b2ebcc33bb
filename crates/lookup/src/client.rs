//! LLM structured-extraction client contract plus the Gemini-backed
//! implementation and a deterministic mock.
//!
//! All failure reasons are uniform from the caller's point of view: the agent
//! downgrades any `ClientFailure` to an unresolved field, never to a fatal
//! error.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use thiserror::Error;

use linea_core::types::FieldKind;

use crate::search::SourceSnippet;

/// Everything the client needs to phrase one structured-extraction request.
#[derive(Debug, Clone)]
pub struct LookupContext {
    pub field_kind: FieldKind,
    pub description: String,
    pub hint: Option<String>,
    pub snippets: Vec<SourceSnippet>,
}

/// The parsed structured response.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResult {
    pub uom: Option<String>,
    pub pack_quantity: Option<u32>,
    pub supplier: Option<String>,
    pub evidence_text: Option<String>,
    /// Numeric certainty in [0, 1], if the provider reported one.
    pub certainty: Option<f32>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("provider error: {0}")]
    Provider(String),
}

pub trait LlmClient: Send + Sync {
    fn query(
        &self,
        ctx: &LookupContext,
    ) -> impl Future<Output = Result<StructuredResult, ClientFailure>> + Send;
}

// ── Response parsing ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawResponse {
    uom: Option<String>,
    pack_quantity: Option<u32>,
    #[serde(default)]
    supplier: Option<String>,
    #[serde(default)]
    evidence_text: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Parse the model's JSON reply, tolerating markdown code fences around it.
/// The categorical confidence maps to 0.9/0.7/0.4/0.0.
pub fn parse_structured_response(text: &str) -> Result<StructuredResult, ClientFailure> {
    let body = strip_code_fences(text.trim());
    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| ClientFailure::Malformed(e.to_string()))?;

    let certainty = match raw.confidence.as_deref() {
        Some("high") => Some(0.9),
        Some("medium") => Some(0.7),
        Some("low") => Some(0.4),
        Some("none") => Some(0.0),
        Some(other) => {
            return Err(ClientFailure::Malformed(format!(
                "unknown confidence label {other:?}"
            )))
        }
        None => None,
    };

    Ok(StructuredResult {
        uom: raw.uom,
        pack_quantity: raw.pack_quantity,
        supplier: raw.supplier,
        evidence_text: raw.evidence_text,
        certainty,
    })
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the fence line (which may carry a language tag), then the closer.
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or(rest);
    rest.trim_end().trim_end_matches("```").trim()
}

// ── Gemini-backed client ─────────────────────────────────────────────────────

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, api_key: api_key.into(), model: model.into() })
    }

    fn build_prompt(ctx: &LookupContext) -> String {
        let mut prompt = String::from("You are a product-data extraction assistant.\n");
        prompt.push_str(&format!("Product description: {}\n", ctx.description));
        if let Some(hint) = &ctx.hint {
            prompt.push_str(&format!("Additional context: {hint}\n"));
        }
        prompt.push_str(&format!("Field of interest: {}\n", ctx.field_kind));
        prompt.push_str(
            "\nBelow are snippet(s) from product/supplier pages. Extract the \
             unit-of-measure (UOM), pack quantity, and supplier ONLY if they are \
             explicitly stated in the snippets. Do NOT guess.\n\
             If the evidence is ambiguous or conflicting, set confidence to \"none\" \
             and return nulls.\n\nSnippets:\n",
        );
        for s in ctx.snippets.iter().take(3) {
            let clipped: String = s.snippet.chars().take(500).collect();
            prompt.push_str(&format!("Source: {}\n{}\n---\n", s.url, clipped));
        }
        prompt.push_str(
            "\nRespond with ONLY this JSON (no markdown, no extra text):\n\
             {\"uom\": <string or null>, \"pack_quantity\": <integer or null>, \
             \"supplier\": <string or null>, \
             \"evidence_text\": <exact quote from snippet or null>, \
             \"confidence\": \"high\"|\"medium\"|\"low\"|\"none\"}",
        );
        prompt
    }
}

impl LlmClient for GeminiClient {
    async fn query(&self, ctx: &LookupContext) -> Result<StructuredResult, ClientFailure> {
        let url = format!(
            "{GEMINI_ENDPOINT}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": Self::build_prompt(ctx) }] }],
            "generationConfig": { "temperature": 0.0, "maxOutputTokens": 256 },
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientFailure::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientFailure::Provider(format!("status {status}")));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ClientFailure::Malformed(e.to_string()))?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| ClientFailure::Malformed("missing candidate text".to_string()))?;

        parse_structured_response(text)
    }
}

// ── Mock client ──────────────────────────────────────────────────────────────

/// Returns a preset outcome and counts invocations — lets pipeline tests
/// assert that cached or denied paths never reach the LLM.
pub struct MockLlmClient {
    outcome: Result<StructuredResult, ClientFailure>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn success(result: StructuredResult) -> Self {
        Self { outcome: Ok(result), calls: AtomicUsize::new(0) }
    }

    pub fn failure(failure: ClientFailure) -> Self {
        Self { outcome: Err(failure), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for MockLlmClient {
    async fn query(&self, _ctx: &LookupContext) -> Result<StructuredResult, ClientFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Never responds — exercises the timeout path.
pub struct PendingLlmClient;

impl LlmClient for PendingLlmClient {
    async fn query(&self, _ctx: &LookupContext) -> Result<StructuredResult, ClientFailure> {
        std::future::pending::<Result<StructuredResult, ClientFailure>>().await
    }
}
