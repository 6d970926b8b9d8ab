//! Browser capability interface.
//!
//! The capture protocol only needs a handful of page operations. They are
//! collected in [`PageDriver`] so the protocol can run against a real
//! `eoka::Page` or against a scripted page in tests.

use async_trait::async_trait;
use eoka::cdp::types::NetworkSetCookie;
use eoka::Page;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::script::Routine;
use crate::{Error, Result};

/// A browser cookie, in the shape CDP reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since the epoch; negative for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// "Strict", "Lax" or "None"; absent when the browser did not report one.
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".into()
}

impl Cookie {
    /// Whether the cookie would be sent to `host`.
    pub fn applies_to(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    }

    /// `Network.setCookie` parameters carrying every stored attribute.
    /// `__Secure-` and `__Host-` cookies are refused without `secure`.
    pub fn to_cdp(&self) -> NetworkSetCookie {
        NetworkSetCookie {
            name: self.name.clone(),
            value: self.value.clone(),
            url: None,
            domain: (!self.domain.is_empty()).then(|| self.domain.clone()),
            path: Some(self.path.clone()),
            secure: Some(self.secure),
            http_only: Some(self.http_only),
            same_site: self.same_site.clone(),
            expires: self.expires.filter(|e| *e > 0.0),
        }
    }
}

/// Page operations the capture protocol relies on.
#[async_trait(?Send)]
pub trait PageDriver {
    /// Navigate and wait for the load to finish.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Address of the current document.
    async fn current_url(&self) -> Result<String>;

    /// Run a fixed routine with a JSON argument object.
    async fn call(&self, routine: &Routine, args: Value) -> Result<Value>;

    /// Click the first element matching `selector`, optionally with a
    /// human-like mouse path.
    async fn click(&self, selector: &str, human: bool) -> Result<()>;

    /// Insert text at the focused element as keyboard input.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Press a named key ("Enter", "Tab", ...).
    async fn press_key(&self, key: &str) -> Result<()>;

    /// PNG of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Cookies visible to the current page.
    async fn cookies(&self) -> Result<Vec<Cookie>>;

    /// Load cookies into the browser with all their attributes.
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;
}

#[async_trait(?Send)]
impl PageDriver for Page {
    async fn goto(&self, url: &str) -> Result<()> {
        Page::goto(self, url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url().await?)
    }

    async fn call(&self, routine: &Routine, args: Value) -> Result<Value> {
        let js = routine.invocation(&args);
        Ok(self.evaluate::<Value>(&js).await?)
    }

    async fn click(&self, selector: &str, human: bool) -> Result<()> {
        if human {
            self.human_click(selector).await?;
        } else {
            Page::click(self, selector).await?;
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        Page::type_text(self, text).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.human().press_key(key).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Page::screenshot(self).await?)
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        let raw = serde_json::to_value(Page::cookies(self).await?)?;
        let cookies: Vec<Cookie> = serde_json::from_value(raw)?;
        Ok(cookies)
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let params = cookies.iter().map(Cookie::to_cdp).collect();
        self.set_cookies_bulk(params).await?;
        Ok(())
    }
}

/// Call a routine and decode its result.
pub(crate) async fn call_as<D, T>(page: &D, routine: &Routine, args: Value) -> Result<T>
where
    D: PageDriver + ?Sized,
    T: serde::de::DeserializeOwned,
{
    let value = page.call(routine, args).await?;
    serde_json::from_value(value).map_err(|e| {
        Error::Unexpected(format!("routine '{}' returned an unexpected shape: {}", routine.name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_parses_cdp_shape() {
        let json = serde_json::json!({
            "name": "SID",
            "value": "abc",
            "domain": ".google.com",
            "path": "/",
            "expires": 1893456000.0,
            "size": 6,
            "httpOnly": true,
            "secure": true,
            "session": false,
            "sameSite": "None"
        });
        let cookie: Cookie = serde_json::from_value(json).unwrap();
        assert_eq!(cookie.name, "SID");
        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.expires, Some(1893456000.0));
        assert_eq!(cookie.same_site.as_deref(), Some("None"));
    }

    #[test]
    fn secure_cookie_keeps_its_attributes_for_restore() {
        let cookie = Cookie {
            name: "__Secure-1PSID".into(),
            value: "v".into(),
            domain: ".google.com".into(),
            path: "/".into(),
            expires: Some(1893456000.0),
            secure: true,
            http_only: true,
            same_site: Some("Lax".into()),
        };
        let cdp = cookie.to_cdp();
        assert_eq!(cdp.name, "__Secure-1PSID");
        assert_eq!(cdp.domain.as_deref(), Some(".google.com"));
        assert_eq!(cdp.path.as_deref(), Some("/"));
        assert_eq!(cdp.secure, Some(true));
        assert_eq!(cdp.http_only, Some(true));
        assert_eq!(cdp.same_site.as_deref(), Some("Lax"));
        assert_eq!(cdp.expires, Some(1893456000.0));
    }

    #[test]
    fn session_cookie_has_no_expiry_on_restore() {
        let cookie = Cookie {
            name: "NID".into(),
            value: "v".into(),
            domain: String::new(),
            path: "/".into(),
            expires: Some(-1.0),
            secure: false,
            http_only: false,
            same_site: None,
        };
        let cdp = cookie.to_cdp();
        assert_eq!(cdp.expires, None);
        assert_eq!(cdp.domain, None);
        assert_eq!(cdp.same_site, None);
    }

    #[test]
    fn cookie_defaults_path() {
        let cookie: Cookie =
            serde_json::from_value(serde_json::json!({ "name": "a", "value": "b" })).unwrap();
        assert_eq!(cookie.path, "/");
        assert!(cookie.domain.is_empty());
    }

    #[test]
    fn cookie_domain_matching() {
        let cookie = Cookie {
            name: "SID".into(),
            value: "x".into(),
            domain: ".google.com".into(),
            path: "/".into(),
            expires: None,
            secure: true,
            http_only: true,
            same_site: None,
        };
        assert!(cookie.applies_to("google.com"));
        assert!(cookie.applies_to("lh3.googleusercontent.google.com"));
        assert!(cookie.applies_to("gemini.google.com"));
        assert!(!cookie.applies_to("notgoogle.com"));
        assert!(!cookie.applies_to("googleusercontent.com"));
    }
}
