//! Scripted in-memory page for protocol tests.
//!
//! Page behavior is a list of [`Frame`]s. Each thinking probe advances to the
//! next frame and the last frame repeats forever. Reads taken before the
//! first probe see the `before` frame, which models the page as it was before
//! the prompt went out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use image::RgbaImage;
use serde_json::{json, Value};

use crate::driver::{Cookie, PageDriver};
use crate::images::ElementBox;
use crate::script::Routine;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    pub thinking: bool,
    pub text: Option<String>,
    pub sources: Vec<String>,
    pub images: Vec<String>,
    /// Response nodes on the page; defaults to one when there is text.
    pub responses: Option<usize>,
}

impl Frame {
    pub fn thinking() -> Self {
        Self {
            thinking: true,
            ..Self::default()
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// The same frame shown as the `n`-th response node of the thread.
    pub fn turn(mut self, n: usize) -> Self {
        self.responses = Some(n);
        self
    }

    fn response_count(&self) -> usize {
        self.responses.unwrap_or(usize::from(self.text.is_some()))
    }

    pub fn images(srcs: &[&str]) -> Self {
        Self {
            images: srcs.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct State {
    url: String,
    /// Locate calls that fail before the input shows up; `None` never shows it.
    input_after: Option<usize>,
    locate_calls: usize,
    input: String,
    /// Characters dropped from typed input, to force the fill fallback.
    drop_typed: bool,
    before: Frame,
    frames: Vec<Frame>,
    frame: Option<usize>,
    buttons: Vec<String>,
    image_boxes: HashMap<String, ElementBox>,
    screenshot: Vec<u8>,
    cookies: Vec<Cookie>,
    rejected_cookie: Option<String>,
    /// Page reads fail once something was submitted, as after a crash.
    crash_after_submit: bool,
    log: Vec<String>,
    keys: Vec<String>,
    submitted: Vec<String>,
}

pub(crate) struct FakePage {
    state: RefCell<State>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            state: RefCell::new(State {
                url: url.into(),
                input_after: Some(0),
                ..State::default()
            }),
        }
    }

    pub fn with_frames(self, frames: Vec<Frame>) -> Self {
        self.state.borrow_mut().frames = frames;
        self
    }

    pub fn with_before(self, before: Frame) -> Self {
        self.state.borrow_mut().before = before;
        self
    }

    pub fn input_after(self, calls: Option<usize>) -> Self {
        self.state.borrow_mut().input_after = calls;
        self
    }

    pub fn with_buttons(self, buttons: &[&str]) -> Self {
        self.state.borrow_mut().buttons = buttons.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn dropping_typed_input(self) -> Self {
        self.state.borrow_mut().drop_typed = true;
        self
    }

    /// Refuse any cookie batch containing `name`.
    pub fn rejecting_cookie(self, name: &str) -> Self {
        self.state.borrow_mut().rejected_cookie = Some(name.into());
        self
    }

    pub fn crashing_after_submit(self) -> Self {
        self.state.borrow_mut().crash_after_submit = true;
        self
    }

    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        self.state.borrow_mut().screenshot = bytes;
    }

    pub fn set_image_box(&self, src: &str, bbox: ElementBox) {
        self.state.borrow_mut().image_boxes.insert(src.into(), bbox);
    }

    /// Routine names and actions, in call order.
    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Input content at each submission.
    pub fn submitted(&self) -> Vec<String> {
        self.state.borrow().submitted.clone()
    }

    pub fn cookie_jar(&self) -> Vec<Cookie> {
        self.state.borrow().cookies.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.borrow().keys.clone()
    }

    fn current(state: &State) -> Frame {
        match state.frame {
            None => state.before.clone(),
            Some(i) => state
                .frames
                .get(i)
                .or_else(|| state.frames.last())
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn submit(state: &mut State) {
        let input = std::mem::take(&mut state.input);
        state.submitted.push(input);
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[async_trait(?Send)]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.log.push(format!("goto {}", url));
        if !crate::site::is_login_page(&state.url) {
            state.url = url.into();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.borrow().url.clone())
    }

    async fn call(&self, routine: &Routine, args: Value) -> Result<Value> {
        let mut state = self.state.borrow_mut();
        state.log.push(routine.name.to_string());
        if state.crash_after_submit && !state.submitted.is_empty() {
            return Err(Error::Browser(eoka::Error::CdpSimple("Target closed".into())));
        }
        let value = match routine.name {
            "locate" => {
                state.locate_calls += 1;
                let visible = state.input_after.is_some_and(|n| state.locate_calls > n);
                let selectors = strings(&args["selectors"]);
                match selectors.first() {
                    Some(sel) if visible => json!({ "found": true, "selector": sel }),
                    _ => json!({ "found": false, "selector": null }),
                }
            }
            "focus_input" => {
                state.input.clear();
                json!(true)
            }
            "fill_input" => {
                let text = args["text"].as_str().unwrap_or_default().to_string();
                state.input = text.clone();
                json!({ "ok": true, "value": text })
            }
            "read_input" => json!(state.input),
            "click_first" => {
                let selectors = strings(&args["selectors"]);
                match selectors.iter().find(|s| state.buttons.contains(*s)).cloned() {
                    Some(sel) => {
                        if sel.contains("submit") {
                            Self::submit(&mut state);
                        }
                        json!(sel)
                    }
                    None => Value::Null,
                }
            }
            "probe_thinking" => {
                state.frame = Some(state.frame.map_or(0, |i| i + 1));
                json!(Self::current(&state).thinking)
            }
            "read_response" => {
                let frame = Self::current(&state);
                json!({
                    "text": frame.text,
                    "sources": frame.sources,
                    "count": frame.response_count(),
                })
            }
            "read_images" => json!(Self::current(&state).images),
            "image_box" => {
                let src = args["src"].as_str().unwrap_or_default();
                match state.image_boxes.get(src) {
                    Some(b) => json!({
                        "found": b.found, "x": b.x, "y": b.y,
                        "width": b.width, "height": b.height, "dpr": b.dpr,
                    }),
                    None => json!({ "found": false, "x": 0, "y": 0, "width": 0, "height": 0, "dpr": 1 }),
                }
            }
            other => panic!("fake page has no routine '{}'", other),
        };
        Ok(value)
    }

    async fn click(&self, selector: &str, _human: bool) -> Result<()> {
        self.state.borrow_mut().log.push(format!("click {}", selector));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.drop_typed {
            state.input.push_str(text);
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.keys.push(key.into());
        if key == "Enter" {
            Self::submit(&mut state);
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.state.borrow().screenshot.clone())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        Ok(self.state.borrow().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(rejected) = &state.rejected_cookie {
            if cookies.iter().any(|c| &c.name == rejected) {
                return Err(Error::Browser(eoka::Error::CdpSimple(
                    "Failed to set cookie".into(),
                )));
            }
        }
        state.cookies.extend_from_slice(cookies);
        Ok(())
    }
}

/// PNG bytes for an in-memory image.
pub(crate) fn png(img: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
