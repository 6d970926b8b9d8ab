//! Page-side routines.
//!
//! Every piece of JavaScript this crate runs is one of the fixed [`Routine`]s
//! below. A routine is a function literal taking a single argument object;
//! callers hand over data (prompt text, selectors, indices) as a JSON value
//! and [`Routine::invocation`] serializes it next to the routine source. User
//! text therefore only ever appears inside a JSON string literal and can never
//! change what the routine does, whatever quotes, backticks or newlines it
//! contains.

use serde_json::Value;

/// A fixed page-side function, invoked with one JSON argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routine {
    pub name: &'static str,
    source: &'static str,
}

impl Routine {
    const fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source }
    }

    /// The JavaScript routine source.
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Expression calling this routine with `args`.
    ///
    /// `serde_json` output is a valid JavaScript expression, so the argument
    /// is parsed by the page as a literal value, not as code.
    pub fn invocation(&self, args: &Value) -> String {
        format!("({})({})", self.source.trim(), args)
    }
}

/// Find the first selector with a visible match.
/// Args: `{ selectors: [css] }` → `{ found, selector }`.
pub const LOCATE: Routine = Routine::new(
    "locate",
    r#"
(arg) => {
    const visible = (el) => {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
    };
    for (const selector of arg.selectors) {
        let nodes;
        try { nodes = document.querySelectorAll(selector); } catch (e) { continue; }
        for (const el of nodes) {
            if (visible(el)) return { found: true, selector };
        }
    }
    return { found: false, selector: null };
}
"#,
);

/// Write text into an input control, replacing its content.
/// Args: `{ selector, text }` → `{ ok, value }` where `value` is the read-back.
pub const FILL_INPUT: Routine = Routine::new(
    "fill_input",
    r#"
(arg) => {
    const host = document.querySelector(arg.selector);
    if (!host) return { ok: false, value: null };
    const editable = host.matches('textarea, input, [contenteditable="true"]')
        ? host
        : (host.querySelector('textarea, input, [contenteditable="true"]') || host);
    editable.focus();
    const isField = editable instanceof HTMLTextAreaElement || editable instanceof HTMLInputElement;
    let inserted = false;
    try {
        if (isField) {
            editable.select();
        } else {
            const range = document.createRange();
            range.selectNodeContents(editable);
            const sel = window.getSelection();
            sel.removeAllRanges();
            sel.addRange(range);
        }
        inserted = document.execCommand('insertText', false, arg.text);
    } catch (e) {
        inserted = false;
    }
    const read = () => isField ? editable.value : editable.innerText;
    if (!inserted || read() !== arg.text) {
        if (isField) {
            const proto = Object.getPrototypeOf(editable);
            const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
            if (setter) setter.call(editable, arg.text); else editable.value = arg.text;
        } else {
            editable.textContent = arg.text;
        }
    }
    editable.dispatchEvent(new Event('input', { bubbles: true }));
    editable.dispatchEvent(new Event('change', { bubbles: true }));
    return { ok: true, value: read() };
}
"#,
);

/// Clear an input control and focus it for typing.
/// Args: `{ selector }` → `bool`.
pub const FOCUS_INPUT: Routine = Routine::new(
    "focus_input",
    r#"
(arg) => {
    const host = document.querySelector(arg.selector);
    if (!host) return false;
    const editable = host.matches('textarea, input, [contenteditable="true"]')
        ? host
        : (host.querySelector('textarea, input, [contenteditable="true"]') || host);
    editable.focus();
    if (editable instanceof HTMLTextAreaElement || editable instanceof HTMLInputElement) {
        editable.value = '';
    } else {
        editable.textContent = '';
    }
    return true;
}
"#,
);

/// Current content of an input control.
/// Args: `{ selector }` → `string | null`.
pub const READ_INPUT: Routine = Routine::new(
    "read_input",
    r#"
(arg) => {
    const host = document.querySelector(arg.selector);
    if (!host) return null;
    const editable = host.matches('textarea, input, [contenteditable="true"]')
        ? host
        : (host.querySelector('textarea, input, [contenteditable="true"]') || host);
    return (editable instanceof HTMLTextAreaElement || editable instanceof HTMLInputElement)
        ? editable.value
        : editable.innerText;
}
"#,
);

/// Click the first visible match among `selectors`.
/// Args: `{ selectors: [css] }` → matched selector or `null`.
pub const CLICK_FIRST: Routine = Routine::new(
    "click_first",
    r#"
(arg) => {
    for (const selector of arg.selectors) {
        let nodes;
        try { nodes = document.querySelectorAll(selector); } catch (e) { continue; }
        for (const el of nodes) {
            const r = el.getBoundingClientRect();
            if (r.width > 0 && r.height > 0 && !el.disabled) {
                el.click();
                return selector;
            }
        }
    }
    return null;
}
"#,
);

/// Whether any "still composing" indicator is visible.
/// Args: `{ selectors: [css] }` → `bool`.
pub const PROBE_THINKING: Routine = Routine::new(
    "probe_thinking",
    r#"
(arg) => {
    for (const selector of arg.selectors) {
        let nodes;
        try { nodes = document.querySelectorAll(selector); } catch (e) { continue; }
        for (const el of nodes) {
            const r = el.getBoundingClientRect();
            const s = getComputedStyle(el);
            if (r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none') {
                return true;
            }
        }
    }
    return false;
}
"#,
);

/// Text of the newest response plus its cited-source labels, and how many
/// response nodes the matching selector currently has.
/// Args: `{ selectors: [css], citations: [css] }` → `{ text, sources, count }`.
pub const READ_RESPONSE: Routine = Routine::new(
    "read_response",
    r#"
(arg) => {
    for (const selector of arg.selectors) {
        let nodes;
        try { nodes = document.querySelectorAll(selector); } catch (e) { continue; }
        if (!nodes.length) continue;
        const latest = nodes[nodes.length - 1];
        const text = (latest.innerText || '').trim();
        if (!text) continue;
        const sources = [];
        const seen = new Set();
        for (const cite of arg.citations) {
            let marks;
            try { marks = latest.querySelectorAll(cite); } catch (e) { continue; }
            for (const m of marks) {
                const label = (m.getAttribute('aria-label') || m.getAttribute('title') || m.innerText || '').trim();
                if (label && !seen.has(label)) { seen.add(label); sources.push(label); }
            }
        }
        return { text, sources, count: nodes.length };
    }
    return { text: null, sources: [], count: 0 };
}
"#,
);

/// Sources of fully loaded generated images, in page order.
/// Args: `{ selectors: [css] }` → `[string]`.
pub const READ_IMAGES: Routine = Routine::new(
    "read_images",
    r#"
(arg) => {
    for (const selector of arg.selectors) {
        let nodes;
        try { nodes = document.querySelectorAll(selector); } catch (e) { continue; }
        const loaded = Array.from(nodes)
            .filter(img => img.src && img.complete && img.naturalWidth > 0)
            .map(img => img.src);
        if (loaded.length) return loaded;
    }
    return [];
}
"#,
);

/// Scroll the loaded generated image with the given `src` into view and
/// report its box.
/// Args: `{ selectors: [css], src }` →
/// `{ found, x, y, width, height, dpr }` in CSS pixels.
pub const IMAGE_BOX: Routine = Routine::new(
    "image_box",
    r#"
(arg) => {
    const none = { found: false, x: 0, y: 0, width: 0, height: 0, dpr: 1 };
    for (const selector of arg.selectors) {
        let nodes;
        try { nodes = document.querySelectorAll(selector); } catch (e) { continue; }
        const img = Array.from(nodes).find(i => i.src === arg.src && i.complete && i.naturalWidth > 0);
        if (!img) continue;
        if (!img.isConnected) return none;
        img.scrollIntoView({ block: 'center', inline: 'center' });
        const r = img.getBoundingClientRect();
        return {
            found: true,
            x: r.x, y: r.y, width: r.width, height: r.height,
            dpr: window.devicePixelRatio || 1,
        };
    }
    return none;
}
"#,
);

#[cfg(test)]
const ALL: &[Routine] = &[
    LOCATE,
    FILL_INPUT,
    FOCUS_INPUT,
    READ_INPUT,
    CLICK_FIRST,
    PROBE_THINKING,
    READ_RESPONSE,
    READ_IMAGES,
    IMAGE_BOX,
];

/// Prompts that break naive string splicing.
#[cfg(test)]
pub(crate) const HOSTILE_PROMPTS: &[&str] = &[
    r#"say "hello" to 'them'"#,
    "template `${window.location}` literal",
    "back\\slash \\n not a newline \\u0041",
    "line one\nline two\r\nline three",
    "tab\tand nul-ish \u{0001} control",
    "</script><script>alert(1)</script>",
    "'); document.body.innerHTML = ''; ('",
    "\"}); alert(1); ({\"",
    "unicode: 日本語, émoji 🎨, rtl שלום, zero\u{200b}width",
    "separators \u{2028} and \u{2029}",
    "",
];
