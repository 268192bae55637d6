//! Render-session orchestration.
//!
//! One [`RenderSession`] owns one engine for its whole lifetime and walks it
//! through a single linear lifecycle: navigate, classify load events, settle,
//! run scripts, assemble output, report. The completion sink fires at most
//! once per session no matter how the engine's event stream misbehaves, and
//! an abort in any non-terminal state suppresses it entirely.

use crate::classify::{classify, LoadOutcome};
use crate::engine::{BrowserEngine, EngineEvent};
use crate::error::{Error, LoadError, Result};
use crate::fetch::{FetchedResource, NetworkFetcher};
use crate::output::{self, RenderResult};
use crate::script::{self, ScriptOutcome};
use crate::{OutputFormat, RenderRequest, Viewport};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{oneshot, watch};

/// Fallback applied when a full viewport meets an empty content size
const FALLBACK_VIEWPORT: (u32, u32) = (1024, 768);

/// Where a session currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    AwaitingLoad,
    SettleWait,
    Executing,
    Assembling,
    Done,
    Failed,
    Aborted,
}

/// Verbosity-gated logging collaborator injected into the session.
///
/// Levels follow the lifecycle chattiness: 1 warnings and anomalies, 2
/// normal lifecycle steps, 3 state transitions, 4 raw engine events.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionLog {
    verbosity: u32,
}

impl SessionLog {
    pub(crate) fn new(verbosity: u32) -> Self {
        Self { verbosity }
    }

    pub(crate) fn emit(&self, min_level: u32, text: &str) {
        if self.verbosity < min_level {
            return;
        }
        match min_level {
            0 | 1 => warn!(target: "pagecast::session", "{}", text),
            2 => info!(target: "pagecast::session", "{}", text),
            _ => debug!(target: "pagecast::session", "{}", text),
        }
    }
}

/// Single-fire result channel; later fires are logged no-ops.
pub(crate) struct CompletionSink {
    tx: Option<oneshot::Sender<Result<RenderResult>>>,
}

impl CompletionSink {
    pub(crate) fn new() -> (Self, CompletionHandle) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, CompletionHandle { rx })
    }

    pub(crate) fn fire(&mut self, result: Result<RenderResult>, log: &SessionLog) {
        match self.tx.take() {
            Some(tx) => {
                // The caller may have dropped the handle; nothing to do then.
                let _ = tx.send(result);
            }
            None => log.emit(1, "completion sink fired more than once; ignoring"),
        }
    }
}

/// Caller-side end of the completion sink.
pub struct CompletionHandle {
    rx: oneshot::Receiver<Result<RenderResult>>,
}

impl CompletionHandle {
    /// Wait for the session's one result. An aborted session never fires
    /// the sink; that surfaces here as [`Error::Aborted`].
    pub async fn wait(self) -> Result<RenderResult> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Aborted),
        }
    }
}

/// One-shot post-load delay; armed at most once per session.
pub(crate) struct SettleScheduler {
    armed: bool,
}

impl SettleScheduler {
    pub(crate) fn new() -> Self {
        Self { armed: false }
    }

    pub(crate) fn arm(&mut self, delay: Duration, log: &SessionLog) -> tokio::time::Sleep {
        if self.armed {
            log.emit(1, "settle scheduler armed twice; arming anyway");
        }
        self.armed = true;
        tokio::time::sleep(delay)
    }
}

/// Cancels a running session from outside.
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Request cancellation. The session detaches its subscriptions,
    /// releases the engine, and leaves the completion sink unfired.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Resolves when abort is requested; never resolves once the handle is
/// gone without having aborted.
async fn wait_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

enum Exit {
    Finished(Result<RenderResult>),
    Aborted,
}

/// Orchestrates one page-render request against one engine instance.
pub struct RenderSession {
    engine: Box<dyn BrowserEngine + Send>,
    fetcher: Option<Box<dyn NetworkFetcher + Send + Sync>>,
    request: RenderRequest,
    /// Assembly strategy, fixed at construction
    assembler: OutputFormat,
    state: SessionState,
    /// Most recent structured error; sticks for the rest of the session
    error_info: Option<LoadError>,
    settle: SettleScheduler,
    sink: CompletionSink,
    abort_rx: watch::Receiver<bool>,
    log: SessionLog,
}

impl RenderSession {
    /// Validate `request` and build a session around `engine`.
    ///
    /// `fetcher` is only consulted on the base-URL-override path and must be
    /// present when `request.base_url` is set. Returns the session (drive it
    /// with [`RenderSession::run`]), the completion handle the caller
    /// awaits, and an abort handle.
    pub fn new(
        engine: Box<dyn BrowserEngine + Send>,
        fetcher: Option<Box<dyn NetworkFetcher + Send + Sync>>,
        request: RenderRequest,
        verbosity: u32,
    ) -> Result<(Self, CompletionHandle, AbortHandle)> {
        url::Url::parse(&request.url)
            .map_err(|e| Error::Config(format!("invalid url {:?}: {}", request.url, e)))?;
        if let Some(base_url) = &request.base_url {
            url::Url::parse(base_url)
                .map_err(|e| Error::Config(format!("invalid base url {:?}: {}", base_url, e)))?;
            if fetcher.is_none() {
                return Err(Error::Config(
                    "base_url navigation requires a network fetcher".to_string(),
                ));
            }
        }
        if !request.wait_seconds.is_finite() || request.wait_seconds < 0.0 {
            return Err(Error::Config(format!(
                "invalid wait_seconds {}",
                request.wait_seconds
            )));
        }

        let (sink, handle) = CompletionSink::new();
        let (abort_tx, abort_rx) = watch::channel(false);
        let assembler = request.output.clone();
        let session = Self {
            engine,
            fetcher,
            request,
            assembler,
            state: SessionState::Created,
            error_info: None,
            settle: SettleScheduler::new(),
            sink,
            abort_rx,
            log: SessionLog::new(verbosity),
        };
        Ok((session, handle, AbortHandle { tx: abort_tx }))
    }

    /// Drive the session to a terminal state.
    ///
    /// Consumes the session; the outcome is delivered through the
    /// completion handle. On abort the handle resolves to
    /// [`Error::Aborted`] without the sink ever firing.
    pub async fn run(mut self) {
        let exit = self.drive().await;
        match exit {
            Exit::Aborted => {
                self.transition(SessionState::Aborted);
                self.teardown();
                self.log.emit(2, "session aborted; completion sink left unfired");
            }
            Exit::Finished(result) => {
                if self.abort_requested() {
                    // Abort raced a synchronous phase; cancellation wins.
                    self.transition(SessionState::Aborted);
                    self.teardown();
                    self.log.emit(2, "abort observed at completion; sink left unfired");
                } else {
                    self.sink.fire(result, &self.log);
                    self.teardown();
                }
            }
        }
    }

    async fn drive(&mut self) -> Exit {
        let mut abort_rx = self.abort_rx.clone();

        // A fixed viewport applies before navigation; `full` has to wait
        // for content.
        if let Viewport::Fixed { width, height } = self.request.viewport {
            self.engine.set_viewport(width, height);
        }

        let mut events = match self.dispatch_navigation(&mut abort_rx).await {
            Ok(events) => events,
            Err(exit) => return exit,
        };
        self.transition(SessionState::AwaitingLoad);

        loop {
            enum Step {
                Abort,
                Event(Option<EngineEvent>),
            }
            let step = tokio::select! {
                _ = wait_abort(&mut abort_rx) => Step::Abort,
                event = events.recv() => Step::Event(event),
            };
            match step {
                Step::Abort => return Exit::Aborted,
                Step::Event(None) => {
                    return Exit::Finished(Err(Error::Engine(
                        "engine event stream closed while awaiting load".to_string(),
                    )));
                }
                Step::Event(Some(EngineEvent::LoadStarted)) => {
                    self.log.emit(4, "load started");
                }
                Step::Event(Some(EngineEvent::StructuredError(info))) => {
                    self.log.emit(2, &format!("structured error recorded: {}", info));
                    self.error_info = Some(info);
                }
                Step::Event(Some(EngineEvent::LoadFinished { ok })) => {
                    match classify(ok, self.error_info.clone()) {
                        LoadOutcome::RedirectPending => {
                            self.log
                                .emit(2, "redirect assumed; awaiting the follow-up load");
                        }
                        LoadOutcome::Failure(error) => {
                            self.log.emit(1, &format!("load failed: {}", error));
                            self.transition(SessionState::Failed);
                            return Exit::Finished(Err(Error::Navigation(error)));
                        }
                        LoadOutcome::Success => break,
                    }
                }
            }
        }

        self.transition(SessionState::SettleWait);
        let delay = Duration::from_secs_f64(self.request.wait_seconds);
        self.log
            .emit(2, &format!("load finished; settling for {}ms", delay.as_millis()));
        let settle = self.settle.arm(delay, &self.log);
        tokio::pin!(settle);
        let mut events_open = true;
        loop {
            enum Step {
                Abort,
                Settled,
                Event(Option<EngineEvent>),
            }
            let step = tokio::select! {
                _ = wait_abort(&mut abort_rx) => Step::Abort,
                _ = &mut settle => Step::Settled,
                event = events.recv(), if events_open => Step::Event(event),
            };
            match step {
                Step::Abort => return Exit::Aborted,
                Step::Settled => break,
                Step::Event(None) => events_open = false,
                Step::Event(Some(event)) => {
                    self.log
                        .emit(1, &format!("ignoring engine event during settle: {:?}", event));
                }
            }
        }

        self.transition(SessionState::Executing);
        if self.request.viewport == Viewport::Full {
            self.apply_full_viewport();
        }
        let scripts = match script::run(self.engine.as_mut(), &self.request, &self.log) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(SessionState::Failed);
                return Exit::Finished(Err(e));
            }
        };
        if self.abort_requested() {
            return Exit::Aborted;
        }

        self.transition(SessionState::Assembling);
        self.assemble(&scripts)
    }

    /// Direct navigation hands the URL to the engine; the base-URL override
    /// fetches first and loads the bytes. Either way the event subscription
    /// is live before the engine starts emitting: on the base-URL path that
    /// means only after the fetch resolves, since loading from bytes
    /// triggers its own load-lifecycle sequence.
    async fn dispatch_navigation(
        &mut self,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> std::result::Result<UnboundedReceiver<EngineEvent>, Exit> {
        if let Some(base_url) = self.request.base_url.clone() {
            let Some(fetcher) = self.fetcher.as_ref() else {
                // Guarded at construction; kept as a terminal error rather
                // than a panic.
                return Err(Exit::Finished(Err(Error::Config(
                    "base_url navigation requires a network fetcher".to_string(),
                ))));
            };
            self.log
                .emit(2, &format!("fetching {} for base-URL load", self.request.url));
            let fetched = {
                let fetch = fetcher.fetch(
                    &self.request.url,
                    &self.request.method,
                    &self.request.headers,
                    self.request.body.as_deref(),
                );
                tokio::pin!(fetch);
                tokio::select! {
                    _ = wait_abort(abort_rx) => None,
                    fetched = &mut fetch => Some(fetched),
                }
            };
            let Some(fetched) = fetched else {
                return Err(Exit::Aborted);
            };
            let resource = match fetched {
                Ok(resource) => resource,
                Err(e) => {
                    // The page still gets loaded; an unreachable document
                    // renders as an empty one.
                    self.log
                        .emit(1, &format!("fetch failed, loading empty document: {}", e));
                    FetchedResource {
                        bytes: Vec::new(),
                        content_type: String::new(),
                        status: 0,
                    }
                }
            };
            let events = self.attach_events();
            if let Err(e) =
                self.engine
                    .load_from_bytes(&resource.bytes, &resource.content_type, &base_url)
            {
                return Err(Exit::Finished(Err(e)));
            }
            Ok(events)
        } else {
            let events = self.attach_events();
            if let Err(e) = self.engine.navigate(
                &self.request.url,
                &self.request.method,
                &self.request.headers,
                self.request.body.as_deref(),
            ) {
                return Err(Exit::Finished(Err(e)));
            }
            Ok(events)
        }
    }

    fn assemble(&mut self, scripts: &ScriptOutcome) -> Exit {
        match output::assemble(&self.assembler, self.engine.as_mut(), scripts, &self.log) {
            Ok(result) => {
                self.transition(SessionState::Done);
                Exit::Finished(Ok(result))
            }
            Err(e) => {
                self.log.emit(1, &format!("assembly failed: {}", e));
                self.transition(SessionState::Failed);
                Exit::Finished(Err(e))
            }
        }
    }

    fn attach_events(&mut self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.engine.attach_events(tx);
        rx
    }

    fn apply_full_viewport(&mut self) {
        let (width, height) = self.engine.content_size();
        if width == 0 || height == 0 {
            self.log
                .emit(1, "content size unavailable; using fallback viewport");
            let (width, height) = FALLBACK_VIEWPORT;
            self.engine.set_viewport(width, height);
        } else {
            self.engine.set_viewport(width, height);
        }
    }

    fn abort_requested(&self) -> bool {
        *self.abort_rx.borrow()
    }

    fn transition(&mut self, next: SessionState) {
        self.log
            .emit(3, &format!("state {:?} -> {:?}", self.state, next));
        self.state = next;
    }

    fn teardown(&mut self) {
        self.engine.detach_events();
        self.engine.release();
    }
}
