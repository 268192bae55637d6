//! Browser engine capability contract.
//!
//! The session drives an engine through this trait and observes it through a
//! typed event channel. Implementations adapt a concrete rendering backend
//! (an embedded engine, a devtools connection, a test double); the session
//! never looks behind the trait.

use crate::error::{LoadError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Load-lifecycle events emitted by the engine.
///
/// `LoadFinished` carries only the engine's bare success flag; whether a
/// structured error was reported beforehand is what disambiguates it (see
/// [`crate::classify`]).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A page load began
    LoadStarted,
    /// A page load finished, successfully or not
    LoadFinished { ok: bool },
    /// The engine's structured error path classified a failure
    StructuredError(LoadError),
}

/// Position and size of a frame within the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A point-in-time copy of one frame and its nested sub-documents.
///
/// Produced by [`BrowserEngine::frame_tree`] at capture time and consumed
/// immediately by output assembly; never retained across calls.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Final URL of the frame's document
    pub url: String,
    /// URL originally requested for this frame
    pub requested_url: String,
    pub geometry: FrameGeometry,
    pub title: String,
    /// Serialized markup, when the engine produced it
    pub html: Option<String>,
    /// Name attribute of the frame element, empty for the outer frame
    pub frame_name: String,
    /// Nested frames in document order
    pub children: Vec<FrameSnapshot>,
}

/// Ordered console-output sink bound into the page's scripting context.
///
/// Cloning shares the underlying buffer, so the copy handed to the engine
/// and the one kept by the script executor observe the same messages.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl ConsoleCapture {
    /// Append one console message in call order.
    pub fn log(&self, message: impl Into<String>) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.into());
        }
    }

    /// Drain everything captured so far.
    pub fn take(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(mut messages) => std::mem::take(&mut *messages),
            Err(_) => Vec::new(),
        }
    }
}

/// Core trait for page-loading/scripting/painting backends.
///
/// All control methods are synchronous from the session's point of view;
/// asynchrony surfaces only through the attached event channel.
pub trait BrowserEngine {
    /// Begin loading `url`. The engine performs the fetch itself and emits
    /// load-lifecycle events as the navigation progresses.
    fn navigate(
        &mut self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<()>;

    /// Load raw document bytes as if they had been served from `base_url`.
    /// Triggers its own load-lifecycle event sequence.
    fn load_from_bytes(&mut self, bytes: &[u8], content_type: &str, base_url: &str) -> Result<()>;

    /// Attach the session's event subscription. The engine forwards all
    /// load-lifecycle events through `tx` until detached.
    fn attach_events(&mut self, tx: UnboundedSender<EngineEvent>);

    /// Drop the current event subscription, if any.
    fn detach_events(&mut self);

    /// Evaluate script source in the page context and return its textual
    /// result.
    fn evaluate_script(&mut self, source: &str) -> Result<String>;

    /// Bind a console-capture sink into the page's scripting context under
    /// `name`.
    fn bind_object(&mut self, name: &str, console: ConsoleCapture) -> Result<()>;

    /// Serialize the outer page's current markup.
    fn serialize_markup(&mut self) -> Result<String>;

    /// Resize the page viewport.
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Size of the loaded content, `(0, 0)` when the engine cannot tell.
    fn content_size(&mut self) -> (u32, u32);

    /// Paint the current viewport into an RGBA buffer.
    fn paint(&mut self) -> Result<image::RgbaImage>;

    /// Snapshot the live frame tree, outer frame first.
    fn frame_tree(&mut self) -> FrameSnapshot;

    /// Free engine resources. Called exactly once, on every terminal
    /// transition including abort; events are detached beforehand.
    fn release(&mut self);
}
