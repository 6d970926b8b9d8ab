//! Subcommand implementations.

pub mod ask;
pub mod chat;
pub mod cleanup;
pub mod image;
pub mod notebooks;
pub mod session;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use askweb_capture::{
    BrowserHandle, Capturer, ImageOptions, Mode, PageDriver, ResponseResult, SiteProfile,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::paths::DataDir;
use crate::session::SessionStore;

/// Loaded configuration and data directory, shared by every command.
pub struct App {
    pub config: Config,
    pub paths: DataDir,
}

/// One prompt sent to one product.
pub(crate) struct Exchange<'a> {
    pub site: SiteProfile,
    pub url: &'a str,
    pub prompt: &'a str,
    pub mode: Mode,
    pub show_browser: bool,
    /// Hold a failed run's browser open before closing it.
    pub keep_open: bool,
    pub timeout: Duration,
    pub images: Option<ImageOptions>,
}

/// How long `--keep-open` leaves a failed run's browser up.
const KEEP_OPEN_FOR: Duration = Duration::from_secs(30);

/// Time to hold the browser open before closing it, if any.
fn inspection_window(keep_open: bool, failed: bool) -> Option<Duration> {
    (keep_open && failed).then_some(KEEP_OPEN_FOR)
}

/// Launch a browser with the saved session, run the exchange and close the
/// browser again whatever the outcome.
pub(crate) async fn run_exchange(app: &App, exchange: Exchange<'_>) -> Result<ResponseResult> {
    let store = SessionStore::new(&app.paths);
    let state = store.load()?;

    let keep_open = exchange.keep_open;
    let browser = BrowserHandle::launch(
        &app.config.launch_options(exchange.show_browser || keep_open),
        &state.cookies,
    )
    .await
    .context("launching browser")?;

    let outcome = exchange_on(app, &browser, exchange).await;

    if let Some(wait) = inspection_window(keep_open, outcome.is_err()) {
        eprintln!(
            "Run failed; leaving the browser open for {}s (Ctrl-C closes it now)...",
            wait.as_secs()
        );
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    if outcome.is_ok() {
        match PageDriver::cookies(browser.current_page()).await {
            Ok(cookies) => {
                if let Err(e) = store.refresh(cookies) {
                    warn!("Could not update saved session: {:#}", e);
                }
            }
            Err(e) => debug!("Could not read cookies after run: {}", e),
        }
    }
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {}", e);
    }
    outcome
}

async fn exchange_on(
    app: &App,
    browser: &BrowserHandle,
    exchange: Exchange<'_>,
) -> Result<ResponseResult> {
    info!("Opening {}", exchange.url);
    let page = tokio::time::timeout(app.config.page_load_timeout(), browser.page(exchange.url))
        .await
        .map_err(|_| anyhow!("timed out loading {}", exchange.url))??;

    let mut capturer = Capturer::new(page, exchange.site, app.config.capture_policy());
    if let Some(images) = exchange.images {
        capturer = capturer.with_images(images);
    }

    let result = capturer
        .submit_and_wait(exchange.prompt, exchange.mode, exchange.timeout)
        .await?;
    Ok(result)
}

/// Question/answer block on stdout.
pub(crate) fn print_answer(question: &str, result: &ResponseResult) {
    println!("{}", format_answer(question, result));
}

fn format_answer(question: &str, result: &ResponseResult) -> String {
    let rule = "=".repeat(60);
    format!(
        "{rule}\nQuestion: {question}\n{rule}\n\n{}\n\n{rule}",
        result.payload
    )
}
