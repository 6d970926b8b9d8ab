//! `session`: interactive sign-in and saved-session management.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use askweb_capture::site::is_login_page;
use askweb_capture::{BrowserHandle, Cookie, PageDriver, SiteProfile, GEMINI, NOTEBOOKLM};
use chrono::Utc;
use clap::Subcommand;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::App;
use crate::session::{has_auth_cookies, merge_cookies, SessionStore, STALE_AFTER_DAYS};

const SIGN_IN_POLL: Duration = Duration::from_secs(1);

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Sign in through a visible browser and save the session
    Setup {
        /// Minutes to wait for the sign-in to complete
        #[arg(long, default_value_t = 10)]
        timeout_minutes: u64,
    },
    /// Show whether a saved session exists and how old it is
    Status,
    /// Discard the saved session and sign in again
    Reauth {
        /// Minutes to wait for the sign-in to complete
        #[arg(long, default_value_t = 10)]
        timeout_minutes: u64,
    },
    /// Delete the saved session
    Clear,
}

pub async fn run(app: &App, command: SessionCommand) -> Result<ExitCode> {
    let store = SessionStore::new(&app.paths);
    match command {
        SessionCommand::Setup { timeout_minutes } => setup(app, &store, timeout_minutes).await,
        SessionCommand::Reauth { timeout_minutes } => {
            store.clear()?;
            setup(app, &store, timeout_minutes).await
        }
        SessionCommand::Status => {
            println!("{}", format_status(&store));
            Ok(ExitCode::SUCCESS)
        }
        SessionCommand::Clear => {
            if store.clear()? {
                println!("Saved session removed.");
            } else {
                println!("No saved session.");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn setup(app: &App, store: &SessionStore, timeout_minutes: u64) -> Result<ExitCode> {
    let browser = BrowserHandle::launch(&app.config.launch_options(true), &[])
        .await
        .context("launching browser")?;

    let outcome = sign_in(&browser, Duration::from_secs(timeout_minutes * 60)).await;
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {}", e);
    }

    let info = store.persist(outcome?)?;
    println!(
        "Signed in. Saved {} cookies at {}.",
        info.cookie_count,
        info.authenticated_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(ExitCode::SUCCESS)
}

/// Wait for the user to finish signing in, then collect cookies from both
/// products.
async fn sign_in(browser: &BrowserHandle, timeout: Duration) -> Result<Vec<Cookie>> {
    let page = browser.page(NOTEBOOKLM.home_url).await?;
    eprintln!(
        "Sign in to your Google account in the browser window (waiting up to {} minutes)...",
        timeout.as_secs() / 60
    );
    wait_for_site(page, &NOTEBOOKLM, timeout, SIGN_IN_POLL).await?;
    info!("Signed in to {}", NOTEBOOKLM.name);

    let mut cookies = PageDriver::cookies(page).await?;
    PageDriver::goto(page, GEMINI.home_url).await?;
    match wait_for_site(page, &GEMINI, Duration::from_secs(30), SIGN_IN_POLL).await {
        Ok(()) => merge_cookies(&mut cookies, PageDriver::cookies(page).await?),
        Err(e) => warn!("Could not open {} after sign-in: {:#}", GEMINI.name, e),
    }
    debug!("Collected {} cookies", cookies.len());
    Ok(cookies)
}

/// Poll until `page` is on `site` rather than a sign-in page and the browser
/// holds an account cookie.
async fn wait_for_site<D: PageDriver + ?Sized>(
    page: &D,
    site: &SiteProfile,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match page.current_url().await {
            Ok(url) if site.owns(&url) && !is_login_page(&url) => match page.cookies().await {
                Ok(cookies) if has_auth_cookies(&cookies) => return Ok(()),
                Ok(_) => debug!("On {} but not signed in yet", url),
                Err(e) => debug!("Could not read cookies: {}", e),
            },
            Ok(url) => debug!("Waiting for sign-in, currently at {}", url),
            Err(e) => debug!("Could not read page address: {}", e),
        }
        if Instant::now() >= deadline {
            return Err(askweb_capture::Error::NotAuthenticated)
                .with_context(|| format!("sign-in to {} not completed in time", site.name));
        }
        sleep(poll).await;
    }
}

fn format_status(store: &SessionStore) -> String {
    let status = store.status();
    let now = Utc::now();
    let mut lines = vec![format!(
        "Authenticated: {}",
        if status.authenticated { "yes" } else { "no" }
    )];
    if let Some(info) = &status.info {
        lines.push(format!(
            "Signed in: {}",
            info.authenticated_at.format("%Y-%m-%d %H:%M UTC")
        ));
        lines.push(format!("Cookies at sign-in: {}", info.cookie_count));
    }
    if let Some(age) = status.age(now) {
        lines.push(format!(
            "Session age: {}d {}h",
            age.num_days(),
            age.num_hours() % 24
        ));
    }
    if status.is_stale(now) {
        lines.push(format!(
            "Session is older than {} days; consider `askweb session reauth`.",
            STALE_AFTER_DAYS
        ));
    }
    if !status.authenticated {
        lines.push("Run `askweb session setup` to sign in.".into());
    }
    lines.join("\n")
}
