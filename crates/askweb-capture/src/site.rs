//! Per-product page knowledge.
//!
//! Selector lists are ordered: the first visible match wins. They track the
//! live markup of each product and are the first thing to revisit when a
//! command starts failing with `UiElementNotFound`.

/// How a prompt is sent once it is in the input control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// Press Enter in the input.
    EnterKey,
    /// Click the first visible button; press Enter if none is found.
    Button(&'static [&'static str]),
}

/// Selectors and addresses for one web product.
#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub name: &'static str,
    /// Landing page for a fresh conversation.
    pub home_url: &'static str,
    pub host: &'static str,
    pub input: &'static [&'static str],
    pub submit: Submit,
    pub response: &'static [&'static str],
    /// Elements visible only while an answer is being composed.
    pub thinking: &'static [&'static str],
    /// Source markers inside a response.
    pub citations: &'static [&'static str],
    /// Buttons switching the composer into image mode.
    pub image_mode: &'static [&'static str],
    pub images: &'static [&'static str],
}

/// Where an expired session lands.
pub const LOGIN_HOST: &str = "accounts.google.com";

pub const NOTEBOOKLM: SiteProfile = SiteProfile {
    name: "NotebookLM",
    home_url: "https://notebooklm.google.com/",
    host: "notebooklm.google.com",
    input: &[
        "textarea.query-box-input",
        "textarea[aria-label='Query box']",
        "textarea[placeholder*='Start typing']",
        "query-box textarea",
    ],
    submit: Submit::Button(&[
        "button.submit-button",
        "button[aria-label='Submit']",
        "query-box button[type='submit']",
    ]),
    response: &[
        ".to-user-container .message-text-content",
        "chat-message .to-user-container",
        "[data-message-author='bot']",
        "[data-message-author='assistant']",
    ],
    thinking: &[
        "div.thinking-message",
        ".to-user-container .loading-indicator",
        "chat-message .thinking",
    ],
    citations: &[
        "button.citation-marker",
        "span.citation-marker",
        "[data-source-title]",
    ],
    image_mode: &[],
    images: &[],
};

pub const GEMINI: SiteProfile = SiteProfile {
    name: "Gemini",
    home_url: "https://gemini.google.com/app",
    host: "gemini.google.com",
    input: &[
        "rich-textarea .ql-editor[contenteditable='true']",
        "rich-textarea[placeholder*='Enter']",
        "rich-textarea",
        ".ql-editor[contenteditable='true']",
        "div[contenteditable='true'][role='textbox']",
        "textarea",
    ],
    submit: Submit::EnterKey,
    response: &[
        "model-response .model-response-text",
        ".model-response-text",
        ".response-container .markdown",
        "message-content",
        ".markdown",
    ],
    thinking: &[
        "model-response .loading-indicator",
        "pending-request",
        "bard-avatar .thinking",
        "[data-test-id='generating']",
        "button[aria-label='Stop response']",
    ],
    citations: &["sources-list .source-title", "source-footnote"],
    image_mode: &[
        "button[aria-label*='Image']",
        "button[aria-label*='image']",
        "[data-test-id*='image']",
    ],
    images: &[
        "generated-image img.image",
        "single-image img[src*='googleusercontent.com']",
        "generated-image img",
    ],
};

impl SiteProfile {
    /// Whether `url` belongs to this product.
    pub fn owns(&self, url: &str) -> bool {
        host_of(url).is_some_and(|h| h == self.host)
    }

    /// Image generation needs at least one image selector.
    pub fn supports_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Whether `url` is a sign-in page, i.e. the session is not valid.
pub fn is_login_page(url: &str) -> bool {
    host_of(url).is_some_and(|h| h == LOGIN_HOST)
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owns_matches_host_exactly() {
        assert!(NOTEBOOKLM.owns("https://notebooklm.google.com/notebook/abc"));
        assert!(!NOTEBOOKLM.owns("https://gemini.google.com/app"));
        assert!(GEMINI.owns("https://gemini.google.com/app/123"));
        assert!(!GEMINI.owns("not a url"));
    }

    #[test]
    fn login_detection() {
        assert!(is_login_page(
            "https://accounts.google.com/v3/signin/identifier?continue=x"
        ));
        assert!(!is_login_page("https://gemini.google.com/app"));
    }

    #[test]
    fn only_gemini_generates_images() {
        assert!(GEMINI.supports_images());
        assert!(!NOTEBOOKLM.supports_images());
    }

    #[test]
    fn profiles_have_inputs_and_responses() {
        for site in [NOTEBOOKLM, GEMINI] {
            assert!(!site.input.is_empty(), "{}", site.name);
            assert!(!site.response.is_empty(), "{}", site.name);
            assert!(site.owns(site.home_url), "{}", site.name);
        }
    }
}
