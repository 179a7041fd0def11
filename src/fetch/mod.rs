//! Throttle-aware decklist fetcher.
//!
//! MTGGoldfish answers automated traffic with 429/403/503 or with an HTML
//! challenge page served under a 200. The fetcher treats all of those as
//! throttle signals and backs off before trying again, then falls through
//! to the next endpoint template once an endpoint's attempts are spent.

pub mod error;
pub mod transport;

use std::sync::Arc;

use crate::retry::{self, JitterWindow, RetryConfig, Sleeper};
use crate::types::DeckId;

pub use error::FetchError;
pub use transport::{Transport, UpstreamResponse};

/// Placeholder substituted with the deck ID in endpoint templates.
pub const ID_PLACEHOLDER: &str = "{id}";

pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://www.mtggoldfish.com/deck/download/{id}",
    "https://www.mtggoldfish.com/deck/arena_download/{id}",
];

/// Markers of bot-mitigation interstitials, matched case-insensitively.
const BOT_MARKERS: &[(&str, &str)] = &[
    ("captcha", "captcha challenge"),
    ("cf-chl", "cloudflare challenge"),
    ("challenge-platform", "cloudflare challenge"),
    ("just a moment", "browser check interstitial"),
    ("attention required", "cloudflare block page"),
    ("ddos-guard", "ddos protection page"),
    ("are you a robot", "robot check"),
    ("access denied", "access denied page"),
];

const MARKUP_TAGS: &[&str] = &["<html", "<!doctype", "<head", "<body", "<script", "<?xml"];

/// Subset of application config consumed by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub endpoints: Vec<String>,
    /// Pause before every deck's first request.
    pub jitter: JitterWindow,
    pub retry: RetryConfig,
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    settings: FetchSettings,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn looks_like_markup(body: &str) -> bool {
    if body.trim_start().starts_with('<') {
        return true;
    }
    let lower = body.to_ascii_lowercase();
    MARKUP_TAGS.iter().any(|tag| lower.contains(tag))
}

fn bot_marker(body: &str) -> Option<&'static str> {
    let lower = body.to_ascii_lowercase();
    BOT_MARKERS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, label)| *label)
}

/// Decide whether one upstream response carries a usable decklist.
///
/// Any markup body counts as throttling: the download endpoints only ever
/// serve plain text, so HTML means an interstitial or an error page.
pub(crate) fn classify(resp: UpstreamResponse) -> Result<String, FetchError> {
    let throttle_status = match resp.status {
        429 => Some("rate limited"),
        403 => Some("forbidden"),
        503 => Some("service unavailable"),
        _ => None,
    };
    let markup = looks_like_markup(&resp.body);

    if throttle_status.is_some() || markup {
        let reason = if markup {
            bot_marker(&resp.body).unwrap_or("unexpected markup body")
        } else {
            throttle_status.unwrap_or("throttled")
        };
        return Err(FetchError::Throttled {
            status: resp.status,
            retry_after: resp.retry_after,
            reason,
        });
    }
    if resp.status != 200 {
        return Err(FetchError::HttpStatus {
            status: resp.status,
        });
    }
    let text = resp.body.trim();
    if text.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    Ok(text.to_string())
}

pub fn endpoint_url(template: &str, id: DeckId) -> String {
    template.replace(ID_PLACEHOLDER, &id.to_string())
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            transport,
            sleeper,
            settings,
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.transport.get(url).await?;
        classify(resp)
    }

    /// Fetch the raw decklist text for one deck.
    ///
    /// Returns `None` once every endpoint has exhausted its attempts; the
    /// caller counts the deck as failed for this round.
    pub async fn fetch_raw(&self, id: DeckId) -> Option<String> {
        let pause = self.settings.jitter.sample();
        tracing::debug!(deck_id = %id, pause_ms = %pause.as_millis(), "pre-fetch pause");
        self.sleeper.sleep(pause).await;

        for template in &self.settings.endpoints {
            let url = endpoint_url(template, id);
            let result = retry::retry_with_backoff(
                &self.settings.retry,
                self.sleeper.as_ref(),
                FetchError::retry_action,
                || self.attempt(&url),
            )
            .await;

            match result {
                Ok(text) => {
                    tracing::debug!(deck_id = %id, url = %url, bytes = text.len(), "fetched decklist");
                    return Some(text);
                }
                Err(e) if e.is_throttle() => {
                    tracing::warn!(deck_id = %id, "Still throttled by {} after retries: {}", url, e);
                }
                Err(e) => {
                    tracing::warn!(deck_id = %id, "Giving up on {}: {}", url, e);
                }
            }
        }

        None
    }
}
