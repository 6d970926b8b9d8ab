//! Persisted sign-in state.
//!
//! A session is the cookie jar captured after an interactive login, stored in
//! `browser_state/state.json`, plus a small `auth_info.json` summary. Commands
//! that talk to a product restore the jar into a fresh browser.

use std::path::PathBuf;

use anyhow::{Context, Result};
use askweb_capture::Cookie;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::paths::DataDir;

/// Sessions older than this still work but are reported as stale.
pub const STALE_AFTER_DAYS: i64 = 7;

/// Domain the sign-in cookies are scoped to.
const AUTH_DOMAIN: &str = "google.com";

/// Cookies Google only sets for a signed-in account. Anonymous visitors get
/// `NID`/`AEC` on the same domain, so the domain alone proves nothing.
const SIGN_IN_COOKIES: &[&str] = &["SID", "__Secure-1PSID", "__Secure-3PSID"];

/// Contents of `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserState {
    pub cookies: Vec<Cookie>,
    pub saved_at: DateTime<Utc>,
}

/// Contents of `auth_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub authenticated_at: DateTime<Utc>,
    pub cookie_count: usize,
}

/// What `session status` reports.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub info: Option<AuthInfo>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.saved_at.map(|t| now - t)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age(now)
            .is_some_and(|age| age > Duration::days(STALE_AFTER_DAYS))
    }
}

pub struct SessionStore {
    state_file: PathBuf,
    auth_file: PathBuf,
    browser_dir: PathBuf,
}

impl SessionStore {
    pub fn new(paths: &DataDir) -> Self {
        Self {
            state_file: paths.state_file(),
            auth_file: paths.auth_info(),
            browser_dir: paths.browser_state_dir(),
        }
    }

    fn read_state(&self) -> Result<Option<BrowserState>> {
        if !self.state_file.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.state_file)
            .with_context(|| format!("reading {}", self.state_file.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.state_file.display()))?;
        Ok(Some(state))
    }

    /// The saved cookie jar, or `NotAuthenticated` when there is none.
    pub fn load(&self) -> Result<BrowserState> {
        let state = match self.read_state() {
            Ok(Some(state)) if has_auth_cookies(&state.cookies) => state,
            Ok(_) => return Err(askweb_capture::Error::NotAuthenticated.into()),
            Err(e) => {
                warn!("Ignoring unreadable session state: {:#}", e);
                return Err(askweb_capture::Error::NotAuthenticated.into());
            }
        };
        let age = Utc::now() - state.saved_at;
        if age > Duration::days(STALE_AFTER_DAYS) {
            warn!(
                "Session is {} days old; run `askweb session reauth` if requests start failing",
                age.num_days()
            );
        }
        debug!("Loaded {} cookies", state.cookies.len());
        Ok(state)
    }

    /// Store a fresh login. Fails with `NotAuthenticated` when the jar has no
    /// sign-in cookie.
    pub fn persist(&self, cookies: Vec<Cookie>) -> Result<AuthInfo> {
        if !has_auth_cookies(&cookies) {
            return Err(askweb_capture::Error::NotAuthenticated)
                .context("no Google account cookie was captured");
        }
        let now = Utc::now();
        let info = AuthInfo {
            authenticated_at: now,
            cookie_count: cookies.len(),
        };
        self.write_state(&BrowserState {
            cookies,
            saved_at: now,
        })?;
        write_json(&self.auth_file, &info)?;
        Ok(info)
    }

    /// Merge cookies seen after a successful run into the saved jar, keeping
    /// `auth_info` as it is.
    pub fn refresh(&self, cookies: Vec<Cookie>) -> Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let Some(mut state) = self.read_state()? else {
            debug!("Not refreshing session: nothing saved yet");
            return Ok(());
        };
        merge_cookies(&mut state.cookies, cookies);
        state.saved_at = Utc::now();
        self.write_state(&state)
    }

    fn write_state(&self, state: &BrowserState) -> Result<()> {
        write_json(&self.state_file, state)
    }

    /// Remove every persisted session file. Returns whether anything existed.
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        if self.browser_dir.exists() {
            std::fs::remove_dir_all(&self.browser_dir)
                .with_context(|| format!("removing {}", self.browser_dir.display()))?;
            removed = true;
        }
        if self.auth_file.exists() {
            std::fs::remove_file(&self.auth_file)
                .with_context(|| format!("removing {}", self.auth_file.display()))?;
            removed = true;
        }
        Ok(removed)
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.read_state().ok().flatten();
        let info = std::fs::read_to_string(&self.auth_file)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok());
        SessionStatus {
            authenticated: state.as_ref().is_some_and(|s| has_auth_cookies(&s.cookies)),
            info,
            saved_at: state.map(|s| s.saved_at),
        }
    }
}

/// Overwrite cookies with the same name, domain and path; append the rest.
pub(crate) fn merge_cookies(jar: &mut Vec<Cookie>, fresh: Vec<Cookie>) {
    for cookie in fresh {
        let same = |c: &Cookie| {
            c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path
        };
        match jar.iter_mut().find(|c| same(c)) {
            Some(existing) => *existing = cookie,
            None => jar.push(cookie),
        }
    }
}

pub(crate) fn has_auth_cookies(cookies: &[Cookie]) -> bool {
    cookies
        .iter()
        .any(|c| c.applies_to(AUTH_DOMAIN) && SIGN_IN_COOKIES.contains(&c.name.as_str()))
}

fn write_json<T: Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
