//! Fan-out router: turns one chat event into per-destination deliveries.
//!
//! `route` does the synchronous part (normalize, filter, resolve
//! destinations, reserve delivery tickets) and spawns the rest: one
//! translation per distinct target language, then render and release each
//! ticket as soon as its translation is done.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::bridge::audience::Audience;
use crate::bridge::cache::TranslationCache;
use crate::bridge::emoji::EmojiNormalizer;
use crate::bridge::filter::ContentFilter;
use crate::bridge::formatter::SharedFormats;
use crate::bridge::gate::{DeliveryGate, Ticket};
use crate::bridge::preferences::LanguagePreferenceStore;
use crate::bridge::sink::{PlatformChannels, SinkSet};
use crate::common::error::TranslateError;
use crate::common::messages::{ChatEvent, RenderedMessage};
use crate::common::types::{ChannelKind, Destination, Language, OriginKind};

/// Upper bound on a shutdown wait when the grace period overflows the clock.
const MAX_SHUTDOWN_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Channels a message from each origin is routed to.
pub fn routes_for(origin: OriginKind) -> &'static [ChannelKind] {
    match origin {
        OriginKind::Player => &[ChannelKind::GameBroadcast, ChannelKind::ExternalPlatform],
        OriginKind::Staff => &[ChannelKind::StaffChannel, ChannelKind::ExternalPlatform],
        OriginKind::Premium => &[ChannelKind::PremiumChannel, ChannelKind::ExternalPlatform],
        OriginKind::External => &[ChannelKind::GameBroadcast],
        OriginKind::System => &[ChannelKind::GameBroadcast, ChannelKind::ExternalPlatform],
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Destinations a message was rendered for.
    pub destinations: usize,
    /// Target languages successfully translated into.
    pub translations: usize,
    /// At least one translation failed and fell back to the original text.
    pub degraded: bool,
    /// The content filter blocked the message.
    pub blocked: bool,
}

/// Handle to a running fan-out. Dropping it does not cancel the fan-out.
pub struct FanoutHandle {
    inner: HandleInner,
}

enum HandleInner {
    Ready(FanoutReport),
    Running(JoinHandle<FanoutReport>),
}

impl FanoutHandle {
    fn ready(report: FanoutReport) -> Self {
        Self {
            inner: HandleInner::Ready(report),
        }
    }

    /// Wait for the fan-out to finish rendering every destination.
    ///
    /// Deliveries may still be queued behind earlier messages when this
    /// returns.
    #[allow(dead_code)]
    pub async fn report(self) -> FanoutReport {
        match self.inner {
            HandleInner::Ready(report) => report,
            HandleInner::Running(handle) => handle.await.unwrap_or_else(|e| {
                warn!("Fan-out task ended abnormally: {}", e);
                FanoutReport {
                    degraded: true,
                    ..FanoutReport::default()
                }
            }),
        }
    }
}

/// Everything the router needs, built once at startup.
pub struct RouterParts {
    pub filter: Arc<ContentFilter>,
    pub cache: Arc<TranslationCache>,
    pub preferences: Arc<LanguagePreferenceStore>,
    pub audience: Arc<dyn Audience>,
    pub formats: Arc<SharedFormats>,
    pub sinks: SinkSet,
    /// Language of the external platform, `None` when it is disabled.
    pub external_language: Option<Language>,
    pub platform_channels: PlatformChannels,
    /// Shared with the translation cache so shutdown also waits on its
    /// engine calls.
    pub tasks: TaskTracker,
}

/// Rendering state shared with spawned fan-out tasks.
struct Renderer {
    emoji: EmojiNormalizer,
    formats: Arc<SharedFormats>,
    cache: Arc<TranslationCache>,
}

impl Renderer {
    fn render(&self, event: &ChatEvent, destination: &Destination, portable: &str) -> RenderedMessage {
        let channel = destination.channel;
        let text = self.emoji.from_portable(portable, channel);
        RenderedMessage {
            destination: destination.clone(),
            final_text: self
                .formats
                .current()
                .render(event.origin, channel, &event.sender.display_name, &text),
            blocked: false,
            origin: event.origin,
            author: event.sender.display_name.clone(),
            embed_color: event.embed_color,
        }
    }
}

/// Routes chat events to every destination in its reader's language.
pub struct FanoutRouter {
    filter: Arc<ContentFilter>,
    preferences: Arc<LanguagePreferenceStore>,
    audience: Arc<dyn Audience>,
    renderer: Arc<Renderer>,
    gate: DeliveryGate,
    external_language: Option<Language>,
    platform_channels: PlatformChannels,
    tasks: TaskTracker,
}

impl FanoutRouter {
    pub fn new(parts: RouterParts) -> Self {
        Self {
            filter: parts.filter,
            preferences: parts.preferences,
            audience: parts.audience,
            renderer: Arc::new(Renderer {
                emoji: EmojiNormalizer::new(),
                formats: parts.formats,
                cache: parts.cache,
            }),
            gate: DeliveryGate::new(parts.sinks),
            external_language: parts.external_language,
            platform_channels: parts.platform_channels,
            tasks: parts.tasks,
        }
    }

    /// Route one event. Returns without waiting on translation or delivery.
    pub fn route(&self, event: ChatEvent) -> FanoutHandle {
        let text = event.raw_text.trim();
        if text.is_empty() {
            debug!(origin = event.origin.name(), "Ignoring empty message");
            return FanoutHandle::ready(FanoutReport::default());
        }

        let portable = self.renderer.emoji.to_portable(text);
        let verdict = self.filter.check(&portable);
        if !verdict.allowed {
            return FanoutHandle::ready(self.route_blocked(&event, text, verdict.matched_term));
        }

        let source = event
            .source_language
            .unwrap_or_else(|| self.preferences.default_language());

        // Tickets are taken here, in emission order, before anything awaits
        let mut groups: BTreeMap<Language, Vec<Ticket>> = BTreeMap::new();
        let mut destinations = 0;
        for (destination, language) in self.resolve_destinations(event.origin) {
            groups
                .entry(language)
                .or_default()
                .push(self.gate.reserve(destination));
            destinations += 1;
        }

        if destinations == 0 {
            debug!(origin = event.origin.name(), "No destinations for message");
            return FanoutHandle::ready(FanoutReport::default());
        }

        let renderer = Arc::clone(&self.renderer);
        let handle = self.tasks.spawn(run_fanout(renderer, event, portable, source, groups, destinations));
        FanoutHandle {
            inner: HandleInner::Running(handle),
        }
    }

    /// Destinations for `origin`, each with the language it reads.
    fn resolve_destinations(&self, origin: OriginKind) -> Vec<(Destination, Language)> {
        let mut resolved = Vec::new();
        for &channel in routes_for(origin) {
            if channel.is_game() {
                for recipient in self.audience.recipients(channel) {
                    let language = self.preferences.get(&recipient);
                    resolved.push((Destination::recipient(channel, recipient), language));
                }
            } else if let Some(language) = self.external_language {
                if origin != OriginKind::External && self.platform_channels.for_origin(origin).is_some() {
                    resolved.push((Destination::channel(channel), language));
                }
            }
        }
        resolved
    }

    /// Staff see blocked messages verbatim; nobody else gets anything.
    fn route_blocked(&self, event: &ChatEvent, text: &str, matched_term: Option<String>) -> FanoutReport {
        let staff = self.audience.recipients(ChannelKind::StaffChannel);
        info!(
            origin = event.origin.name(),
            sender = %event.sender.display_name,
            term = matched_term.as_deref().unwrap_or(""),
            "Message blocked by content filter"
        );

        let final_text = self.renderer.formats.current().render(
            event.origin,
            ChannelKind::StaffChannel,
            &event.sender.display_name,
            text,
        );
        for recipient in &staff {
            let destination = Destination::recipient(ChannelKind::StaffChannel, recipient.clone());
            let ticket = self.gate.reserve(destination.clone());
            ticket.complete(Some(RenderedMessage {
                destination,
                final_text: final_text.clone(),
                blocked: true,
                origin: event.origin,
                author: event.sender.display_name.clone(),
                embed_color: None,
            }));
        }

        FanoutReport {
            destinations: staff.len(),
            translations: 0,
            degraded: false,
            blocked: true,
        }
    }

    /// Number of fan-outs still running.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop routing and wait up to `grace` for running work.
    ///
    /// Returns whether everything finished in time; leftover work is
    /// abandoned.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let now = Instant::now();
        let deadline = now.checked_add(grace).unwrap_or_else(|| now + MAX_SHUTDOWN_WAIT);
        self.tasks.close();

        let fanouts_done = tokio::time::timeout_at(deadline, self.tasks.wait()).await.is_ok();
        if !fanouts_done {
            warn!("Abandoning {} fan-outs still running after shutdown grace", self.tasks.len());
        }

        self.gate.close();
        let deliveries_done = tokio::time::timeout_at(deadline, self.gate.wait()).await.is_ok();
        if !deliveries_done {
            warn!("Abandoning deliveries still pending after shutdown grace");
        }

        fanouts_done && deliveries_done
    }
}

struct GroupOutcome {
    translated: bool,
    degraded: bool,
}

async fn run_fanout(
    renderer: Arc<Renderer>,
    event: ChatEvent,
    portable: String,
    source: Language,
    groups: BTreeMap<Language, Vec<Ticket>>,
    destinations: usize,
) -> FanoutReport {
    let event = Arc::new(event);
    let portable: Arc<str> = Arc::from(portable);
    let mut set = JoinSet::new();

    for (target, tickets) in groups {
        let renderer = Arc::clone(&renderer);
        let event = Arc::clone(&event);
        let portable = Arc::clone(&portable);

        set.spawn(async move {
            let mut outcome = GroupOutcome {
                translated: false,
                degraded: false,
            };

            let text = if target == source {
                portable.to_string()
            } else {
                match renderer.cache.translate(&portable, source, target).await {
                    Ok(text) => {
                        outcome.translated = true;
                        text
                    }
                    Err(e) => {
                        outcome.degraded = true;
                        log_translate_failure(&event, target, &e);
                        portable.to_string()
                    }
                }
            };

            for ticket in tickets {
                let message = renderer.render(&event, ticket.destination(), &text);
                ticket.complete(Some(message));
            }
            outcome
        });
    }

    let mut report = FanoutReport {
        destinations,
        ..FanoutReport::default()
    };
    while let Some(result) = set.join_next().await {
        match result {
            Ok(outcome) => {
                report.translations += usize::from(outcome.translated);
                report.degraded |= outcome.degraded;
            }
            Err(e) => {
                warn!(origin = event.origin.name(), "Translation task failed: {}", e);
                report.degraded = true;
            }
        }
    }

    if report.degraded {
        debug!(
            origin = event.origin.name(),
            destinations = report.destinations,
            degraded = true,
            "Fan-out finished with untranslated fallbacks"
        );
    }
    report
}

fn log_translate_failure(event: &ChatEvent, target: Language, error: &TranslateError) {
    match error {
        // Expected while the engine is down or disabled
        TranslateError::EngineUnavailable => debug!(
            origin = event.origin.name(),
            target = %target,
            degraded = true,
            "Translation skipped: {}", error
        ),
        _ => warn!(
            origin = event.origin.name(),
            target = %target,
            degraded = true,
            "Translation failed, delivering original text: {}", error
        ),
    }
}
