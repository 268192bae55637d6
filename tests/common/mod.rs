//! Shared test doubles: a scriptable engine and fetcher whose interactions
//! are recorded through a shared state block.

use async_trait::async_trait;
use image::RgbaImage;
use pagecast::{
    AbortHandle, BrowserEngine, ConsoleCapture, EngineEvent, Error, FetchedResource,
    FrameGeometry, FrameSnapshot, NetworkFetcher, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Everything the mocks record, visible to the test while the session owns
/// the engine.
#[derive(Default)]
pub struct Shared {
    pub calls: Mutex<Vec<String>>,
    pub events_tx: Mutex<Option<UnboundedSender<EngineEvent>>>,
    pub evaluated: Mutex<Vec<String>>,
    pub console: Mutex<Option<ConsoleCapture>>,
    /// (bytes, content_type, base_url) given to `load_from_bytes`
    pub loaded_bytes: Mutex<Option<(Vec<u8>, String, String)>>,
    pub fetch_done: AtomicBool,
    /// Whether the fetch had already resolved when events were attached
    pub attached_after_fetch: AtomicBool,
    pub detached: AtomicBool,
    pub released: AtomicBool,
    /// When set, the engine aborts the session from inside a synchronous
    /// call (see `abort_on_eval` / `abort_on_paint`)
    pub abort: Mutex<Option<AbortHandle>>,
}

impl Shared {
    pub fn recorded(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }
}

pub fn frame(name: &str, html: Option<&str>, children: Vec<FrameSnapshot>) -> FrameSnapshot {
    FrameSnapshot {
        url: format!("http://page.test/{}", name),
        requested_url: format!("http://page.test/{}", name),
        geometry: FrameGeometry {
            x: 0,
            y: 0,
            width: 640,
            height: 480,
        },
        title: name.to_string(),
        html: html.map(|h| h.to_string()),
        frame_name: name.to_string(),
        children,
    }
}

pub struct MockEngine {
    pub shared: Arc<Shared>,
    pub markup: String,
    pub fail_markup: bool,
    pub script_value: String,
    pub fail_eval: bool,
    pub abort_on_eval: bool,
    pub abort_on_paint: bool,
    /// Logged to the bound console sink on every evaluation
    pub console_message: Option<String>,
    pub paint_size: (u32, u32),
    pub content_size: (u32, u32),
    pub frames: FrameSnapshot,
}

impl MockEngine {
    pub fn new() -> (Self, Arc<Shared>) {
        let shared = Arc::new(Shared::default());
        let engine = Self {
            shared: shared.clone(),
            markup: "<html><body>ok</body></html>".to_string(),
            fail_markup: false,
            script_value: "42".to_string(),
            fail_eval: false,
            abort_on_eval: false,
            abort_on_paint: false,
            console_message: None,
            paint_size: (64, 48),
            content_size: (800, 600),
            frames: frame("outer", Some("<html><body>ok</body></html>"), vec![]),
        };
        (engine, shared)
    }

    fn record(&self, call: String) {
        self.shared.calls.lock().unwrap().push(call);
    }

    fn maybe_abort(&self, wanted: bool) {
        if wanted {
            if let Some(handle) = self.shared.abort.lock().unwrap().take() {
                handle.abort();
            }
        }
    }
}

impl BrowserEngine for MockEngine {
    fn navigate(
        &mut self,
        url: &str,
        method: &str,
        _headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<()> {
        self.record(format!(
            "navigate:{}:{}:{}",
            method,
            url,
            body.map(|b| b.len()).unwrap_or(0)
        ));
        Ok(())
    }

    fn load_from_bytes(&mut self, bytes: &[u8], content_type: &str, base_url: &str) -> Result<()> {
        self.record("load_from_bytes".to_string());
        *self.shared.loaded_bytes.lock().unwrap() = Some((
            bytes.to_vec(),
            content_type.to_string(),
            base_url.to_string(),
        ));
        Ok(())
    }

    fn attach_events(&mut self, tx: UnboundedSender<EngineEvent>) {
        self.record("attach_events".to_string());
        self.shared
            .attached_after_fetch
            .store(self.shared.fetch_done.load(Ordering::SeqCst), Ordering::SeqCst);
        *self.shared.events_tx.lock().unwrap() = Some(tx);
    }

    fn detach_events(&mut self) {
        self.record("detach_events".to_string());
        self.shared.detached.store(true, Ordering::SeqCst);
        *self.shared.events_tx.lock().unwrap() = None;
    }

    fn evaluate_script(&mut self, source: &str) -> Result<String> {
        self.shared.evaluated.lock().unwrap().push(source.to_string());
        self.maybe_abort(self.abort_on_eval);
        if let Some(message) = &self.console_message {
            if let Some(console) = self.shared.console.lock().unwrap().as_ref() {
                console.log(message.clone());
            }
        }
        if self.fail_eval {
            Err(Error::Engine("script blew up".to_string()))
        } else {
            Ok(self.script_value.clone())
        }
    }

    fn bind_object(&mut self, name: &str, console: ConsoleCapture) -> Result<()> {
        self.record(format!("bind_object:{}", name));
        *self.shared.console.lock().unwrap() = Some(console);
        Ok(())
    }

    fn serialize_markup(&mut self) -> Result<String> {
        self.record("serialize_markup".to_string());
        if self.fail_markup {
            Err(Error::Engine("markup unavailable".to_string()))
        } else {
            Ok(self.markup.clone())
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.record(format!("set_viewport:{}x{}", width, height));
    }

    fn content_size(&mut self) -> (u32, u32) {
        self.content_size
    }

    fn paint(&mut self) -> Result<RgbaImage> {
        self.record("paint".to_string());
        self.maybe_abort(self.abort_on_paint);
        let (width, height) = self.paint_size;
        Ok(RgbaImage::new(width, height))
    }

    fn frame_tree(&mut self) -> FrameSnapshot {
        self.record("frame_tree".to_string());
        self.frames.clone()
    }

    fn release(&mut self) {
        self.record("release".to_string());
        self.shared.released.store(true, Ordering::SeqCst);
    }
}

pub struct MockFetcher {
    pub shared: Arc<Shared>,
    /// `None` makes the fetch fail
    pub response: Option<FetchedResource>,
}

#[async_trait]
impl NetworkFetcher for MockFetcher {
    async fn fetch(
        &self,
        url: &str,
        method: &str,
        _headers: &HashMap<String, String>,
        _body: Option<&[u8]>,
    ) -> Result<FetchedResource> {
        self.shared
            .calls
            .lock()
            .unwrap()
            .push(format!("fetch:{}:{}", method, url));
        self.shared.fetch_done.store(true, Ordering::SeqCst);
        match &self.response {
            Some(resource) => Ok(resource.clone()),
            None => Err(Error::Fetch("mock fetch refused".to_string())),
        }
    }
}

/// Wait for the session to attach its event subscription and return a
/// sender the test can emit engine events through.
pub async fn attached(shared: &Arc<Shared>) -> UnboundedSender<EngineEvent> {
    for _ in 0..1000 {
        if let Some(tx) = shared.events_tx.lock().unwrap().clone() {
            return tx;
        }
        tokio::task::yield_now().await;
    }
    panic!("engine events were never attached");
}
