//! Output assembly: markup, raster, and bundle strategies.
//!
//! Invoked once per session, after scripts have run. The raster path keeps
//! a long-standing quirk callers depend on: a requested width rescales the
//! capture proportionally, while a requested height only crops from the top
//! of the (possibly rescaled) image.

use crate::engine::{BrowserEngine, FrameSnapshot};
use crate::error::{Error, Result};
use crate::script::ScriptOutcome;
use crate::session::SessionLog;
use crate::{BundleInclude, OutputFormat};
use base64::Engine as Base64Engine;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{imageops, ExtendedColorType, ImageEncoder, RgbaImage};
use serde_json::{json, Map, Value};

/// The one output representation a session produces.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderResult {
    /// Serialized outer-page markup
    Markup(String),
    /// PNG bytes
    Raster(Vec<u8>),
    /// Structured JSON object (frame tree plus optional sections)
    Bundle(Value),
}

/// Run the strategy selected at session construction.
pub(crate) fn assemble(
    format: &OutputFormat,
    engine: &mut (dyn BrowserEngine + Send),
    scripts: &ScriptOutcome,
    log: &SessionLog,
) -> Result<RenderResult> {
    match format {
        OutputFormat::Markup => {
            log.emit(2, "assembling markup");
            let html = engine
                .serialize_markup()
                .map_err(|e| Error::Assembly(e.to_string()))?;
            Ok(RenderResult::Markup(html))
        }
        OutputFormat::Raster { width, height } => {
            log.emit(2, "assembling raster");
            Ok(RenderResult::Raster(raster_bytes(
                engine, *width, *height,
            )?))
        }
        OutputFormat::Bundle {
            width,
            height,
            include,
        } => {
            log.emit(2, "assembling bundle");
            Ok(RenderResult::Bundle(bundle_value(
                engine, scripts, *width, *height, include,
            )?))
        }
    }
}

/// Paint the viewport and PNG-encode it, applying the width-rescale /
/// height-crop rules.
fn raster_bytes(
    engine: &mut (dyn BrowserEngine + Send),
    width: Option<u32>,
    height: Option<u32>,
) -> Result<Vec<u8>> {
    let painted = engine.paint().map_err(|e| Error::Assembly(e.to_string()))?;
    let image = scale_and_crop(painted, width, height);

    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| Error::Assembly(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer)
}

/// Width rescales preserving aspect ratio; height crops from the top of
/// whatever the rescale produced, with no further scaling.
pub(crate) fn scale_and_crop(
    mut image: RgbaImage,
    width: Option<u32>,
    height: Option<u32>,
) -> RgbaImage {
    if let Some(target) = width {
        if image.width() > 0 && target != image.width() {
            let scaled_height = ((image.height() as f64) * (target as f64)
                / (image.width() as f64))
                .round()
                .max(1.0) as u32;
            image = imageops::resize(&image, target, scaled_height, FilterType::Lanczos3);
        }
    }
    if let Some(target) = height {
        let crop_width = width.unwrap_or(image.width()).min(image.width());
        let crop_height = target.min(image.height());
        if crop_width != image.width() || crop_height != image.height() {
            image = imageops::crop_imm(&image, 0, 0, crop_width, crop_height).to_image();
        }
    }
    image
}

/// Build the bundle object: optional png/script/console sections, then the
/// outer frame's fields merged at the top level.
fn bundle_value(
    engine: &mut (dyn BrowserEngine + Send),
    scripts: &ScriptOutcome,
    width: Option<u32>,
    height: Option<u32>,
    include: &BundleInclude,
) -> Result<Value> {
    let mut bundle = Map::new();

    if include.raster {
        let png = raster_bytes(engine, width, height)?;
        bundle.insert(
            "png".to_string(),
            Value::String(base64::engine::general_purpose::STANDARD.encode(&png)),
        );
    }
    if include.script {
        if let Some(output) = &scripts.output {
            if !output.is_empty() {
                bundle.insert("script".to_string(), json!(output));
            }
        }
    }
    if include.console {
        if let Some(messages) = &scripts.console {
            if !messages.is_empty() {
                bundle.insert("console".to_string(), json!(messages));
            }
        }
    }

    let frame = engine.frame_tree();
    if let Value::Object(fields) = frame_value(&frame, include.iframes, include.html) {
        bundle.extend(fields);
    }
    Ok(Value::Object(bundle))
}

/// Serialize one frame. Child frames always carry their own markup; only
/// the outer frame's `html` key is subject to the include flag.
fn frame_value(frame: &FrameSnapshot, children: bool, html: bool) -> Value {
    let mut fields = Map::new();
    fields.insert("url".to_string(), json!(frame.url));
    fields.insert("requestedUrl".to_string(), json!(frame.requested_url));
    fields.insert(
        "geometry".to_string(),
        json!([
            frame.geometry.x,
            frame.geometry.y,
            frame.geometry.width,
            frame.geometry.height
        ]),
    );
    fields.insert("title".to_string(), json!(frame.title));
    if html {
        if let Some(markup) = &frame.html {
            fields.insert("html".to_string(), json!(markup));
        }
    }
    if children {
        let child_frames: Vec<Value> = frame
            .children
            .iter()
            .map(|child| frame_value(child, true, true))
            .collect();
        fields.insert("childFrames".to_string(), Value::Array(child_frames));
        fields.insert("frameName".to_string(), json!(frame.frame_name));
    }
    Value::Object(fields)
}
