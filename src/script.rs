//! Script injection and console capture.
//!
//! Runs after the settle delay, before output assembly: profile scripts
//! first (lexicographic filename order), then the user script, with an
//! optional console sink bound into the page for the duration.

use crate::engine::{BrowserEngine, ConsoleCapture};
use crate::error::{Error, Result};
use crate::session::SessionLog;
use crate::RenderRequest;
use std::fs;
use std::path::{Path, PathBuf};

/// Name the console sink is bound under in the page's scripting context
pub(crate) const CONSOLE_BINDING: &str = "console";

/// Filename suffix selecting profile scripts
pub(crate) const SCRIPT_SUFFIX: &str = ".js";

/// What script execution produced.
///
/// Both fields are `None` when no script was requested; `console` is `None`
/// whenever console capture was off, even if a script ran.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutcome {
    /// Textual result of the main script; absent when it failed
    pub output: Option<String>,
    /// Captured console messages, in call order
    pub console: Option<Vec<String>>,
}

/// Run the request's scripts in the loaded page, if any.
///
/// Evaluation failures fold into an absent output; only profile-directory
/// I/O failures surface as errors.
pub(crate) fn run(
    engine: &mut (dyn BrowserEngine + Send),
    request: &RenderRequest,
    log: &SessionLog,
) -> Result<ScriptOutcome> {
    let Some(source) = request.script_source.as_deref() else {
        return Ok(ScriptOutcome::default());
    };

    let capture = request.capture_console.then(ConsoleCapture::default);
    if let Some(capture) = &capture {
        engine.bind_object(CONSOLE_BINDING, capture.clone())?;
    }

    if let Some(dir) = &request.script_profile_dir {
        load_profile(engine, dir, log)?;
    }

    let output = match engine.evaluate_script(source) {
        Ok(value) => Some(value),
        Err(e) => {
            log.emit(1, &format!("script evaluation failed: {}", e));
            None
        }
    };

    Ok(ScriptOutcome {
        output,
        console: capture.map(|c| c.take()),
    })
}

/// Evaluate every `.js` file in `dir`, sorted by filename.
fn load_profile(
    engine: &mut (dyn BrowserEngine + Send),
    dir: &Path,
    log: &SessionLog,
) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Script(format!("cannot read {}: {}", dir.display(), e)))?;

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(SCRIPT_SUFFIX))
        })
        .collect();
    scripts.sort();

    for path in scripts {
        let source = fs::read_to_string(&path)
            .map_err(|e| Error::Script(format!("cannot read {}: {}", path.display(), e)))?;
        log.emit(3, &format!("evaluating profile script {}", path.display()));
        if let Err(e) = engine.evaluate_script(&source) {
            log.emit(1, &format!("profile script {} failed: {}", path.display(), e));
        }
    }
    Ok(())
}
