//! Pagecast
//!
//! Single-page render orchestration for headless browser engines.
//!
//! Pagecast drives one page load through an external, event-driven
//! [`BrowserEngine`], waits out a configurable settle delay, optionally runs
//! scripts in the page, and assembles one of three output representations:
//! raw markup, a PNG capture, or a structured JSON bundle with the frame
//! tree, script output, and console log.
//!
//! # Features
//!
//! - **Engine-agnostic**: the engine is a capability trait; any backend that
//!   can load, paint, and script a page can be driven
//! - **Exactly-once completion**: the caller's completion handle resolves at
//!   most once per session, for every event interleaving
//! - **Strategy-based outputs**: markup, raster, and bundle assembly share
//!   one orchestrator parameterized by the requested format
//!
//! # Example
//!
//! ```no_run
//! use pagecast::{HttpFetcher, OutputFormat, RenderRequest, RenderResult, RenderSession};
//!
//! # fn acquire_engine() -> Box<dyn pagecast::BrowserEngine + Send> { unimplemented!() }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = RenderRequest {
//!     wait_seconds: 0.5,
//!     output: OutputFormat::Markup,
//!     ..RenderRequest::new("https://example.com")
//! };
//!
//! let fetcher = HttpFetcher::new()?;
//! let (session, completion, _abort) =
//!     RenderSession::new(acquire_engine(), Some(Box::new(fetcher)), request, 1)?;
//! tokio::spawn(session.run());
//!
//! if let RenderResult::Markup(html) = completion.wait().await? {
//!     println!("{}", html);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod classify;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod output;
pub mod script;
pub mod session;

pub use classify::{classify, LoadOutcome};
pub use engine::{BrowserEngine, ConsoleCapture, EngineEvent, FrameGeometry, FrameSnapshot};
pub use error::{Error, ErrorDomain, LoadError, Result};
pub use fetch::{FetchedResource, HttpFetcher, NetworkFetcher};
pub use output::RenderResult;
pub use script::ScriptOutcome;
pub use session::{AbortHandle, CompletionHandle, RenderSession, SessionState};

/// Default settle delay after a successful load, in seconds
pub const DEFAULT_WAIT_SECONDS: f64 = 0.0;

/// Default fixed viewport, also used as the fallback when a full viewport
/// meets an empty reported content size
pub const DEFAULT_VIEWPORT: Viewport = Viewport::Fixed {
    width: 1024,
    height: 768,
};

/// Requested page viewport: a fixed size, or sized to the loaded content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Viewport {
    Fixed { width: u32, height: u32 },
    /// Size the viewport to the content once it has loaded
    Full,
}

impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Viewport::Fixed { width, height } => write!(f, "{}x{}", width, height),
            Viewport::Full => f.write_str("full"),
        }
    }
}

impl FromStr for Viewport {
    type Err = Error;

    /// Parse `"WxH"` or `"full"`.
    fn from_str(s: &str) -> Result<Self> {
        if s == "full" {
            return Ok(Viewport::Full);
        }
        let bad = || Error::Config(format!("invalid viewport {:?}, expected WxH or full", s));
        let (w, h) = s.split_once('x').ok_or_else(bad)?;
        let width = w.parse::<u32>().map_err(|_| bad())?;
        let height = h.parse::<u32>().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(Viewport::Fixed { width, height })
    }
}

impl TryFrom<String> for Viewport {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Viewport> for String {
    fn from(v: Viewport) -> Self {
        v.to_string()
    }
}

/// Which bundle sections to include
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInclude {
    pub html: bool,
    pub iframes: bool,
    pub raster: bool,
    pub script: bool,
    pub console: bool,
}

impl Default for BundleInclude {
    fn default() -> Self {
        Self {
            html: true,
            iframes: true,
            raster: true,
            script: true,
            console: false,
        }
    }
}

/// Requested output representation, with its format-specific options.
///
/// This value doubles as the assembly strategy: it is selected once when the
/// session is constructed and invoked once when the page has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// Serialized outer-page markup
    #[default]
    Markup,
    /// PNG capture of the viewport. `width` rescales proportionally;
    /// `height` crops from the top after any rescale.
    Raster {
        width: Option<u32>,
        height: Option<u32>,
    },
    /// JSON object combining frame metadata with optional raster, script,
    /// and console sections
    Bundle {
        width: Option<u32>,
        height: Option<u32>,
        include: BundleInclude,
    },
}

/// One immutable page-render request.
///
/// Construct with [`RenderRequest::new`] and override fields with struct
/// update syntax; all fields are public.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Page URL to render
    pub url: String,
    /// When set, the session fetches `url` itself and loads the bytes into
    /// the engine as if they were served from this URL
    pub base_url: Option<String>,
    /// HTTP method for the navigation or fetch
    pub method: String,
    /// Extra request headers, passed through to the engine or fetcher
    pub headers: HashMap<String, String>,
    /// Request body, e.g. for POST navigation
    pub body: Option<Vec<u8>>,
    /// Settle delay after a successful load; 0 fires on the next tick
    pub wait_seconds: f64,
    pub viewport: Viewport,
    /// Script evaluated in the page context after the settle delay
    pub script_source: Option<String>,
    /// Directory of `.js` files evaluated before the main script,
    /// in lexicographic filename order
    pub script_profile_dir: Option<PathBuf>,
    /// Capture page console output while scripts run
    pub capture_console: bool,
    pub output: OutputFormat,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_url: None,
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            wait_seconds: DEFAULT_WAIT_SECONDS,
            viewport: Viewport::default(),
            script_source: None,
            script_profile_dir: None,
            capture_console: false,
            output: OutputFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parses_fixed_and_full() {
        assert_eq!(
            "800x600".parse::<Viewport>().unwrap(),
            Viewport::Fixed {
                width: 800,
                height: 600
            }
        );
        assert_eq!("full".parse::<Viewport>().unwrap(), Viewport::Full);
    }

    #[test]
    fn viewport_rejects_garbage() {
        for s in ["", "800", "x600", "800x", "0x600", "800xsix", "fullish"] {
            assert!(s.parse::<Viewport>().is_err(), "accepted {:?}", s);
        }
    }

    #[test]
    fn viewport_round_trips_through_display() {
        for s in ["1024x768", "full"] {
            let v = s.parse::<Viewport>().unwrap();
            assert_eq!(v.to_string(), s);
        }
    }

    #[test]
    fn request_defaults() {
        let request = RenderRequest::new("http://example.test/");
        assert_eq!(request.method, "GET");
        assert_eq!(request.viewport, DEFAULT_VIEWPORT);
        assert_eq!(request.output, OutputFormat::Markup);
        assert!(!request.capture_console);
    }

    #[test]
    fn bundle_include_defaults_match_json_output() {
        let include = BundleInclude::default();
        assert!(include.html && include.iframes && include.raster && include.script);
        assert!(!include.console);
    }
}
