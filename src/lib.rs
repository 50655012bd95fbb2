//! Streaming GPX reader.
//!
//! [`parse`] walks the XML events produced by `quick-xml` once, front to
//! back, and returns a fully built [`Document`] or the first [`ParseError`].
//! The same entry points are exported to JavaScript through `wasm-bindgen`.

mod builder;
pub mod dispatch;
pub mod error;
pub mod gpx_types;
pub mod options;
pub mod parser;
pub mod scalar;

use wasm_bindgen::prelude::*;

pub use crate::error::ParseError;
pub use crate::gpx_types::*;
pub use crate::options::{GpxElementType, ParseOptions};
pub use crate::parser::{parse, parse_str, parse_with_options};

/// Parse a GPX string, returned as a JS object.
#[wasm_bindgen(js_name = parseGpx)]
pub fn parse_gpx(gpx_string: &str, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let document = parse_with_options(gpx_string.as_bytes(), &opts)?;
    serde_wasm_bindgen::to_value(&document).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Parse a GPX string, returned as a JSON string.
#[wasm_bindgen(js_name = parseGpxString)]
pub fn parse_gpx_string(gpx_string: &str, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let document = parse_with_options(gpx_string.as_bytes(), &opts)?;
    serde_json::to_string(&document).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Parse raw GPX bytes (e.g. a `Uint8Array` read from a file), returned as a JS object.
#[wasm_bindgen(js_name = parseGpxBytes)]
pub fn parse_gpx_bytes(bytes: &[u8], options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let document = parse_with_options(bytes, &opts)?;
    serde_wasm_bindgen::to_value(&document).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_options(options: JsValue) -> Result<ParseOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ParseOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
