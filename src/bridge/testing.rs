//! Test doubles for the pipeline: scripted engine, recording sinks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::bridge::engine::TranslationEngine;
use crate::bridge::sink::{DeliverySink, PlatformClient};
use crate::common::error::{SendError, SendResult, TranslateError, TranslateResult};
use crate::common::messages::RenderedMessage;
use crate::common::types::{Destination, Language, OriginKind};

type EngineKey = (String, &'static str);

/// Scripted translation engine.
///
/// Unscripted pairs translate to `"[target] text"`. Gated calls wait for a
/// permit from [`MockEngine::release`] or [`MockEngine::release_text`].
pub struct MockEngine {
    pub calls: AtomicUsize,
    ready: AtomicBool,
    mappings: Mutex<HashMap<EngineKey, String>>,
    failures: Mutex<HashMap<EngineKey, TranslateError>>,
    gate: Option<Arc<Semaphore>>,
    text_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            ready: AtomicBool::new(true),
            mappings: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            gate: None,
            text_gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with(self, text: &str, target: &str, translated: &str) -> Self {
        self.mappings
            .lock()
            .unwrap()
            .insert(key(text, target), translated.to_string());
        self
    }

    pub fn failing(self, text: &str, target: &str, error: TranslateError) -> Self {
        self.failures.lock().unwrap().insert(key(text, target), error);
        self
    }

    /// Hold every call until released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Hold calls for `text` until [`MockEngine::release_text`].
    pub fn gate_text(self, text: &str) -> Self {
        self.text_gates
            .lock()
            .unwrap()
            .insert(text.to_string(), Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn release_text(&self, text: &str) {
        if let Some(gate) = self.text_gates.lock().unwrap().get(text) {
            gate.add_permits(1);
        }
    }

    pub fn clear_failure(&self, text: &str, target: &str) {
        self.failures.lock().unwrap().remove(&key(text, target));
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

fn key(text: &str, target: &str) -> EngineKey {
    (text.to_string(), Language::parse(target).unwrap().code())
}

#[async_trait]
impl TranslationEngine for MockEngine {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn translate(&self, text: &str, _source: Language, target: Language) -> TranslateResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let text_gate = self.text_gates.lock().unwrap().get(text).cloned();
        if let Some(gate) = text_gate {
            gate.acquire().await.unwrap().forget();
        }

        let k = (text.to_string(), target.code());
        if let Some(error) = self.failures.lock().unwrap().get(&k) {
            return Err(error.clone());
        }
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .get(&k)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target, text)))
    }
}

/// Sink that records every delivered message.
pub struct RecordingSink {
    delivered: Mutex<Vec<RenderedMessage>>,
    fail_next: Mutex<Option<SendError>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Fail the next delivery with `error`.
    pub fn fail_next(&self, error: SendError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    pub fn messages(&self) -> Vec<RenderedMessage> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.final_text).collect()
    }

    /// Messages delivered to `destination`, in delivery order.
    pub fn texts_for(&self, destination: &Destination) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| &m.destination == destination)
            .map(|m| m.final_text)
            .collect()
    }

    /// Wait until at least `count` messages were delivered.
    pub async fn wait_for(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.delivered.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .unwrap_or_else(|_| panic!("expected {} deliveries, got {:?}", count, self.texts()));
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, message: &RenderedMessage) -> SendResult<()> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        self.delivered.lock().unwrap().push(message.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Platform client that records sends.
pub struct MockPlatform {
    sent: Mutex<Vec<(u64, String)>>,
    embeds: Mutex<Vec<(u64, String, String, u32)>>,
    fail: Mutex<Option<SendError>>,
    reconnects: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            embeds: Mutex::new(Vec::new()),
            fail: Mutex::new(None),
            reconnects: AtomicUsize::new(0),
        }
    }

    /// Fail every send with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<SendError>) {
        *self.fail.lock().unwrap() = error;
    }

    pub fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn embeds(&self) -> Vec<(u64, String, String, u32)> {
        self.embeds.lock().unwrap().clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn check(&self) -> SendResult<()> {
        match self.fail.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn send_text(&self, channel_id: u64, text: &str) -> SendResult<()> {
        self.check()?;
        self.sent.lock().unwrap().push((channel_id, text.to_string()));
        Ok(())
    }

    async fn send_embed(&self, channel_id: u64, text: &str, author: &str, color: u32) -> SendResult<()> {
        self.check()?;
        self.embeds
            .lock()
            .unwrap()
            .push((channel_id, text.to_string(), author.to_string(), color));
        Ok(())
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A plain rendered message for `destination`.
pub fn rendered(destination: Destination, text: &str) -> RenderedMessage {
    RenderedMessage {
        destination,
        final_text: text.to_string(),
        blocked: false,
        origin: OriginKind::Player,
        author: "tester".to_string(),
        embed_color: None,
    }
}
