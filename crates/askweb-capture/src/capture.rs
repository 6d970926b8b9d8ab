//! The prompt/response exchange.
//!
//! [`Capturer::submit_and_wait`] runs one exchange on an already open page:
//! it checks the session, finds the input control, writes the prompt, sends
//! it and then polls the page until the output settles or the deadline
//! passes.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::driver::{call_as, PageDriver};
use crate::images::{self, ImageOptions};
use crate::script::{
    CLICK_FIRST, FILL_INPUT, FOCUS_INPUT, LOCATE, PROBE_THINKING, READ_IMAGES, READ_INPUT,
    READ_RESPONSE,
};
use crate::site::{is_login_page, SiteProfile, Submit};
use crate::stability::{StabilityTracker, Tick};
use crate::{Error, Mode, Payload, ResponseResult, Result};

/// How often the input control is looked for during discovery.
const LOCATE_INTERVAL: Duration = Duration::from_millis(250);

/// Consecutive failed polls after which the page is considered gone.
const MAX_POLL_FAILURES: u32 = 3;

/// Keystroke pacing for prompt entry.
#[derive(Debug, Clone, Copy)]
pub struct Typing {
    /// Type character by character instead of inserting the whole prompt.
    pub enabled: bool,
    pub wpm_min: u32,
    pub wpm_max: u32,
}

impl Default for Typing {
    fn default() -> Self {
        Self {
            enabled: true,
            wpm_min: 320,
            wpm_max: 480,
        }
    }
}

impl Typing {
    /// Delay after each of `len` characters. A word is five characters; each
    /// keystroke draws its own speed from the configured range and now and
    /// then a short hesitation is added.
    pub fn delays<R: Rng>(&self, len: usize, rng: &mut R) -> Vec<Duration> {
        let lo = self.wpm_min.max(1);
        let hi = self.wpm_max.max(lo);
        (0..len)
            .map(|_| {
                let wpm = rng.gen_range(lo..=hi) as u64;
                let mut ms = 60_000 / (wpm * 5);
                if rng.gen_bool(0.05) {
                    ms += rng.gen_range(150..=400);
                }
                Duration::from_millis(ms)
            })
            .collect()
    }
}

/// Timing knobs for one exchange.
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    pub poll_interval: Duration,
    /// Identical consecutive readings needed to accept an answer.
    pub stable_ticks: u32,
    /// How long to wait for the input control to show up.
    pub discovery_timeout: Duration,
    pub typing: Typing,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            stable_ticks: 2,
            discovery_timeout: Duration::from_secs(10),
            typing: Typing::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Located {
    found: bool,
    selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Filled {
    ok: bool,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TextReading {
    text: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    /// Response nodes on the page when the reading was taken.
    #[serde(default)]
    count: usize,
}

impl TextReading {
    /// Whether this reading is a response produced after `baseline` was
    /// taken. A new response node counts even when its text repeats the
    /// previous answer; with no new node the text itself has to differ.
    fn is_new_since(&self, baseline: Option<&TextReading>, prompt: &str) -> bool {
        let Some(text) = self.text.as_deref().map(str::trim) else {
            return false;
        };
        if text.is_empty() || same_text(text, prompt) {
            return false;
        }
        match baseline {
            None => true,
            Some(before) => {
                self.count > before.count
                    || before.text.as_deref().map(str::trim) != Some(text)
            }
        }
    }
}

enum Settled<T> {
    Complete(T),
    TimedOut { waited: Duration, partial: Option<T> },
}

/// Runs exchanges against one page of one product.
pub struct Capturer<'a, D: PageDriver + ?Sized> {
    page: &'a D,
    site: SiteProfile,
    policy: CapturePolicy,
    images: ImageOptions,
}

impl<'a, D: PageDriver + ?Sized> Capturer<'a, D> {
    pub fn new(page: &'a D, site: SiteProfile, policy: CapturePolicy) -> Self {
        Self {
            page,
            site,
            policy,
            images: ImageOptions::default(),
        }
    }

    pub fn with_images(mut self, images: ImageOptions) -> Self {
        self.images = images;
        self
    }

    /// Fail with [`Error::NotAuthenticated`] when the page sits on sign-in.
    pub async fn ensure_signed_in(&self) -> Result<String> {
        let url = self.page.current_url().await?;
        if is_login_page(&url) {
            warn!("{} redirected to sign-in", self.site.name);
            return Err(Error::NotAuthenticated);
        }
        Ok(url)
    }

    /// Submit `prompt` on the current page and wait up to `timeout` for the
    /// response to settle.
    pub async fn submit_and_wait(
        &self,
        prompt: &str,
        mode: Mode,
        timeout: Duration,
    ) -> Result<ResponseResult> {
        if prompt.trim().is_empty() {
            return Err(Error::Unexpected("prompt is empty".into()));
        }
        if mode == Mode::ImageGeneration && !self.site.supports_images() {
            return Err(Error::Unexpected(format!(
                "{} does not generate images",
                self.site.name
            )));
        }

        let target = self.ensure_signed_in().await?;

        if mode == Mode::ImageGeneration {
            self.enter_image_mode().await;
        }

        let selector = self.locate_input().await?;
        self.write_prompt(&selector, prompt).await?;

        let payload = match mode {
            Mode::TextQuery => {
                let baseline = self.read_text().await.ok().filter(|r| r.text.is_some());
                self.submit(&selector).await?;
                self.await_text(prompt, baseline, timeout).await?
            }
            Mode::ImageGeneration => {
                let baseline = self.read_images().await.unwrap_or_default();
                self.submit(&selector).await?;
                self.await_images(baseline, timeout).await?
            }
        };

        Ok(ResponseResult {
            prompt: prompt.to_string(),
            target,
            payload,
        })
    }

    async fn enter_image_mode(&self) {
        if self.site.image_mode.is_empty() {
            return;
        }
        match call_as::<_, Option<String>>(
            self.page,
            &CLICK_FIRST,
            json!({ "selectors": self.site.image_mode }),
        )
        .await
        {
            Ok(Some(sel)) => debug!("Image mode enabled via {}", sel),
            Ok(None) => debug!("No image mode control, relying on the prompt"),
            Err(e) => debug!("Image mode toggle failed: {}", e),
        }
    }

    /// Poll for the first visible input selector until the discovery budget
    /// runs out.
    async fn locate_input(&self) -> Result<String> {
        let deadline = Instant::now() + self.policy.discovery_timeout;
        loop {
            match call_as::<_, Located>(
                self.page,
                &LOCATE,
                json!({ "selectors": self.site.input }),
            )
            .await
            {
                Ok(Located {
                    found: true,
                    selector: Some(selector),
                }) => {
                    debug!("Input found: {}", selector);
                    return Ok(selector);
                }
                Ok(_) => {}
                Err(e) => debug!("Input lookup failed: {}", e),
            }

            if Instant::now() >= deadline {
                if let Ok(url) = self.page.current_url().await {
                    if is_login_page(&url) {
                        return Err(Error::NotAuthenticated);
                    }
                }
                return Err(Error::UiElementNotFound(format!(
                    "{} input (tried {})",
                    self.site.name,
                    self.site.input.join(", ")
                )));
            }
            sleep(LOCATE_INTERVAL).await;
        }
    }

    async fn write_prompt(&self, selector: &str, prompt: &str) -> Result<()> {
        if self.policy.typing.enabled && !prompt.contains('\n') {
            if self.type_prompt(selector, prompt).await? {
                return Ok(());
            }
            warn!("Typed prompt did not read back intact, filling instead");
        }

        let filled: Filled = call_as(
            self.page,
            &FILL_INPUT,
            json!({ "selector": selector, "text": prompt }),
        )
        .await?;
        if !filled.ok {
            return Err(Error::UiElementNotFound(selector.to_string()));
        }
        match filled.value {
            Some(value) if same_text(&value, prompt) => Ok(()),
            _ => Err(Error::Unexpected(
                "input content does not match the prompt after filling".into(),
            )),
        }
    }

    /// Type `prompt` keystroke by keystroke. Returns whether the input reads
    /// back as the prompt.
    async fn type_prompt(&self, selector: &str, prompt: &str) -> Result<bool> {
        self.page.click(selector, true).await?;
        let focused: bool = call_as(self.page, &FOCUS_INPUT, json!({ "selector": selector })).await?;
        if !focused {
            return Ok(false);
        }

        let delays = self
            .policy
            .typing
            .delays(prompt.chars().count(), &mut rand::thread_rng());
        let mut buf = [0u8; 4];
        for (ch, delay) in prompt.chars().zip(delays) {
            self.page.type_text(ch.encode_utf8(&mut buf)).await?;
            sleep(delay).await;
        }

        let read: Option<String> =
            call_as(self.page, &READ_INPUT, json!({ "selector": selector })).await?;
        Ok(read.is_some_and(|v| same_text(&v, prompt)))
    }

    async fn submit(&self, selector: &str) -> Result<()> {
        if let Submit::Button(buttons) = self.site.submit {
            let clicked: Option<String> =
                call_as(self.page, &CLICK_FIRST, json!({ "selectors": buttons })).await?;
            if let Some(button) = clicked {
                debug!("Submitted via {}", button);
                return Ok(());
            }
            debug!("No submit button visible, pressing Enter");
        }
        self.page.click(selector, false).await.ok();
        self.page.press_key("Enter").await
    }

    async fn is_thinking(&self) -> Result<bool> {
        if self.site.thinking.is_empty() {
            return Ok(false);
        }
        call_as(
            self.page,
            &PROBE_THINKING,
            json!({ "selectors": self.site.thinking }),
        )
        .await
    }

    async fn read_text(&self) -> Result<TextReading> {
        call_as(
            self.page,
            &READ_RESPONSE,
            json!({ "selectors": self.site.response, "citations": self.site.citations }),
        )
        .await
    }

    async fn read_images(&self) -> Result<Vec<String>> {
        call_as(
            self.page,
            &READ_IMAGES,
            json!({ "selectors": self.site.images }),
        )
        .await
    }

    async fn await_text(
        &self,
        prompt: &str,
        baseline: Option<TextReading>,
        timeout: Duration,
    ) -> Result<Payload> {
        let baseline = baseline.as_ref();
        let settled = self
            .settle(timeout, move || async move {
                let reading = self.read_text().await?;
                let fresh = reading.is_new_since(baseline, prompt);
                Ok(fresh.then_some(reading))
            })
            .await?;

        match settled {
            Settled::Complete(reading) => {
                let text = reading.text.unwrap_or_default().trim().to_string();
                info!("Response settled ({} chars)", text.len());
                Ok(Payload::Text {
                    text,
                    sources: reading.sources,
                })
            }
            Settled::TimedOut { waited, partial } => Err(Error::ResponseTimeout {
                waited_ms: waited.as_millis() as u64,
                partial: partial.and_then(|r| r.text),
            }),
        }
    }

    async fn await_images(&self, baseline: Vec<String>, timeout: Duration) -> Result<Payload> {
        let baseline = &baseline;
        let settled = self
            .settle(timeout, move || async move {
                let fresh: Vec<String> = self
                    .read_images()
                    .await?
                    .into_iter()
                    .filter(|src| !baseline.contains(src))
                    .collect();
                Ok((!fresh.is_empty()).then_some(fresh))
            })
            .await?;

        match settled {
            Settled::Complete(sources) => {
                info!("{} image(s) settled", sources.len());
                let batch = images::save_all(self.page, &self.site, &sources, &self.images).await?;
                Ok(Payload::Images(batch))
            }
            Settled::TimedOut { waited, partial } => Err(Error::ResponseTimeout {
                waited_ms: waited.as_millis() as u64,
                partial: partial.map(|srcs| srcs.join("\n")),
            }),
        }
    }

    /// Poll until `read` returns the same value for `stable_ticks` consecutive
    /// ticks with no thinking indicator, or until `timeout` elapses. Each tick
    /// probes the thinking indicator first and only reads when it is absent.
    async fn settle<T, F, Fut>(&self, timeout: Duration, mut read: F) -> Result<Settled<T>>
    where
        T: Clone + PartialEq,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut tracker = StabilityTracker::new(self.policy.stable_ticks);
        let mut failures = 0;

        while Instant::now() < deadline {
            let poll = async {
                if self.is_thinking().await? {
                    return Ok::<_, Error>(Tick::Thinking);
                }
                Ok(match read().await? {
                    Some(value) => Tick::Reading(value),
                    None => Tick::Empty,
                })
            };

            let tick = match timeout_at(deadline, poll).await {
                Ok(Ok(tick)) => {
                    failures = 0;
                    tick
                }
                Ok(Err(Error::NotAuthenticated)) => return Err(Error::NotAuthenticated),
                Ok(Err(e)) => {
                    failures += 1;
                    if failures >= MAX_POLL_FAILURES {
                        warn!("Page stopped responding after {} failed polls", failures);
                        return Err(e);
                    }
                    debug!("Poll failed ({}/{}): {}", failures, MAX_POLL_FAILURES, e);
                    Tick::Empty
                }
                Err(_) => break,
            };

            if let Some(value) = tracker.observe(tick) {
                return Ok(Settled::Complete(value));
            }
            debug!("Not settled yet (run {})", tracker.count());

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.policy.poll_interval.min(remaining)).await;
        }

        Ok(Settled::TimedOut {
            waited: started.elapsed(),
            partial: tracker.into_latest(),
        })
    }
}

/// Equal up to whitespace differences.
fn same_text(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}
