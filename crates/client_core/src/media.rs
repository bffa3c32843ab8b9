//! Embedded video loading: device-aware source rewriting and the bounded
//! timeout/retry policy applied to every load.

use std::{future::Future, time::Duration};

use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

pub const MOBILE_BREAKPOINT_PX: u32 = 768;
pub const MOBILE_AUTOPLAY_DELAY: Duration = Duration::from_millis(300);
const MOBILE_QUERY_SUFFIX: &str = "&responsive=1&quality=480";
const MOBILE_USER_AGENT_MARKERS: [&str; 8] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

#[derive(Debug, Error)]
pub enum MediaLoadError {
    #[error("media load timed out after {0:?}")]
    Timeout(Duration),
    #[error("media load failed: {0}")]
    Failed(String),
    #[error("media load gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<MediaLoadError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(15000),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Runs `op` under the policy's per-attempt timeout, retrying with a fixed
/// delay until it succeeds or the retries run out.
pub async fn load_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, MediaLoadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, MediaLoadError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(MediaLoadError::Timeout(policy.timeout)),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts() => {
                return Err(MediaLoadError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                warn!("media: attempt {attempt} failed: {err}; retrying");
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub slow_connection: bool,
}

impl DeviceProfile {
    pub fn detect(
        viewport_width: u32,
        user_agent: &str,
        effective_connection_type: Option<&str>,
        save_data: bool,
    ) -> Self {
        let agent = user_agent.to_ascii_lowercase();
        let is_mobile = viewport_width <= MOBILE_BREAKPOINT_PX
            || MOBILE_USER_AGENT_MARKERS
                .iter()
                .any(|marker| agent.contains(marker));
        let slow_connection = save_data
            || matches!(effective_connection_type, Some("slow-2g") | Some("2g"));
        Self {
            is_mobile,
            slow_connection,
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.is_mobile || self.slow_connection
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEmbed {
    pub src: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub autoplay: bool,
}

impl VideoEmbed {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            title: "Video".to_string(),
            thumbnail: None,
            autoplay: false,
        }
    }

    /// Source actually requested for this device. Constrained devices get
    /// autoplay turned off (unless the embed is meant to autoplay) and a
    /// reduced quality hint.
    pub fn effective_src(&self, profile: &DeviceProfile) -> String {
        if !profile.is_constrained() {
            return self.src.clone();
        }
        let mut src = if self.autoplay {
            self.src.clone()
        } else {
            self.src.replacen("autoplay=1", "autoplay=0", 1)
        };
        src.push_str(MOBILE_QUERY_SUFFIX);
        src
    }

    /// Autoplay embeds start as soon as they are shown; others wait for the user.
    pub fn autoload_delay(&self, profile: &DeviceProfile) -> Option<Duration> {
        if !self.autoplay {
            return None;
        }
        Some(if profile.is_mobile {
            MOBILE_AUTOPLAY_DELAY
        } else {
            Duration::ZERO
        })
    }
}

pub struct MediaLoader {
    http: Client,
    policy: RetryPolicy,
}

impl MediaLoader {
    pub fn new(http: Client, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Checks the embed is reachable and returns the source to display.
    pub async fn load(
        &self,
        embed: &VideoEmbed,
        profile: &DeviceProfile,
    ) -> Result<String, MediaLoadError> {
        let src = embed.effective_src(profile);
        let target = src.as_str();
        load_with_retry(self.policy, |_| self.fetch(target)).await?;
        info!("media: loaded '{}'", embed.title);
        Ok(src)
    }

    async fn fetch(&self, src: &str) -> Result<(), MediaLoadError> {
        let res = self
            .http
            .get(src)
            .send()
            .await
            .map_err(|err| MediaLoadError::Failed(err.to_string()))?;
        if !res.status().is_success() {
            return Err(MediaLoadError::Failed(format!(
                "{src} returned {}",
                res.status()
            )));
        }
        Ok(())
    }
}

impl Default for MediaLoader {
    fn default() -> Self {
        Self::new(Client::new(), RetryPolicy::default())
    }
}
