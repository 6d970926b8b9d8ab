//! Browser launch and cookie restore.

use eoka::{Browser, Page};
use tracing::{debug, warn};

use crate::driver::{Cookie, PageDriver};
use crate::Result;

/// How the browser is started.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            user_agent: None,
            viewport_width: 1280,
            viewport_height: 900,
        }
    }
}

/// A launched browser with one working page.
pub struct BrowserHandle {
    browser: Browser,
    page: Page,
}

impl BrowserHandle {
    /// Start the browser and load `cookies` into it before any navigation.
    pub async fn launch(options: &LaunchOptions, cookies: &[Cookie]) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: options.headless,
            proxy: options.proxy.clone(),
            user_agent: options.user_agent.clone(),
            viewport_width: options.viewport_width,
            viewport_height: options.viewport_height,
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            options.headless, options.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        restore_cookies(&page, cookies).await;
        Ok(Self { browser, page })
    }

    /// The working page, navigated to `url`.
    pub async fn page(&self, url: &str) -> Result<&Page> {
        PageDriver::goto(&self.page, url).await?;
        Ok(&self.page)
    }

    /// The working page wherever it currently is.
    pub fn current_page(&self) -> &Page {
        &self.page
    }

    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

/// Load `cookies` in one call. When the browser refuses the batch, retry one
/// cookie at a time so a single bad cookie does not drop the whole session.
/// Returns how many cookies were accepted.
pub(crate) async fn restore_cookies<D: PageDriver + ?Sized>(page: &D, cookies: &[Cookie]) -> usize {
    if cookies.is_empty() {
        return 0;
    }
    match page.set_cookies(cookies).await {
        Ok(()) => {
            debug!("Restored {} cookies", cookies.len());
            return cookies.len();
        }
        Err(e) => warn!("Bulk cookie restore failed ({}), retrying one by one", e),
    }

    let mut restored = 0;
    for cookie in cookies {
        match page.set_cookies(std::slice::from_ref(cookie)).await {
            Ok(()) => restored += 1,
            Err(e) => warn!("Skipping cookie {}: {}", cookie.name, e),
        }
    }
    debug!("Restored {}/{} cookies", restored, cookies.len());
    restored
}
