//! Translation engine client.
//!
//! The engine is a black box: `translate(text, source, target)`. The shipped
//! implementation talks to a LibreTranslate-compatible HTTP service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::error::{TranslateError, TranslateResult};
use crate::common::types::Language;
use crate::config::types::TranslationConfig;

/// A translation backend.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Whether the engine can accept calls right now.
    fn is_ready(&self) -> bool;

    /// Translate `text` from `source` to `target`.
    async fn translate(&self, text: &str, source: Language, target: Language)
        -> TranslateResult<String>;
}

/// Engine used when translation is disabled: never ready.
#[derive(Debug, Default)]
pub struct DisabledEngine;

#[async_trait]
impl TranslationEngine for DisabledEngine {
    fn is_ready(&self) -> bool {
        false
    }

    async fn translate(&self, _text: &str, _source: Language, _target: Language) -> TranslateResult<String> {
        Err(TranslateError::EngineUnavailable)
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: String,
}

/// LibreTranslate-compatible HTTP engine.
#[derive(Debug)]
pub struct HttpTranslationEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    ready: AtomicBool,
}

impl HttpTranslationEngine {
    pub fn new(config: &TranslationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            ready: AtomicBool::new(false),
        })
    }

    /// Check that the service answers its language listing.
    pub async fn probe(&self) -> TranslateResult<()> {
        let response = self
            .client
            .get(format!("{}/languages", self.endpoint))
            .send()
            .await
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            return Err(TranslateError::EngineUnavailable);
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Probe readiness in the background with exponential backoff.
    ///
    /// Until the probe succeeds the engine reports not-ready and every
    /// translation degrades to the original text.
    pub fn spawn_readiness_probe(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let backoff = ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(2))
                .with_max_delay(Duration::from_secs(120))
                .with_factor(2.0)
                .with_jitter()
                .without_max_times();

            let result = (|| async { engine.probe().await })
                .retry(backoff)
                .notify(|e, delay| {
                    debug!(
                        "Translation engine not ready ({}), retrying in {:.1}s",
                        e,
                        delay.as_secs_f64()
                    );
                })
                .await;

            match result {
                Ok(()) => info!("Translation engine at {} is ready", engine.endpoint),
                Err(e) => warn!("Translation engine never became ready: {}", e),
            }
        })
    }
}

#[async_trait]
impl TranslationEngine for HttpTranslationEngine {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn translate(&self, text: &str, source: Language, target: Language) -> TranslateResult<String> {
        let request = TranslateRequest {
            q: text,
            source: source.code(),
            target: target.code(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
                error: String::new(),
            });
            debug!("Engine rejected {} -> {}: {}", source, target, body.error);
            return Err(TranslateError::UnsupportedLanguagePair {
                source_lang: source.code().to_string(),
                target_lang: target.code().to_string(),
            });
        }
        if !status.is_success() {
            return Err(TranslateError::EngineUnavailable);
        }

        let body: TranslateResponse = response.json().await.map_err(|e| TranslateError::Malformed {
            message: e.to_string(),
        })?;
        Ok(body.translated_text)
    }
}

fn map_request_error(error: reqwest::Error) -> TranslateError {
    if error.is_timeout() {
        TranslateError::Timeout
    } else if error.is_decode() {
        TranslateError::Malformed {
            message: error.to_string(),
        }
    } else {
        TranslateError::EngineUnavailable
    }
}
