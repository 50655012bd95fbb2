use std::fmt::Display;

use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Every way a GPX parse can fail. The first failure aborts the whole parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The XML tokenizer rejected the input.
    #[error("Malformed XML at byte {position}: {message}")]
    MalformedMarkup { position: u64, message: String },

    /// Input ended while `element` was still open.
    #[error("Document ended before <{element}> was closed")]
    TruncatedDocument { element: String },

    #[error(
        "Unexpected closing tag </{found}> (open element: {})",
        .expected.as_deref().unwrap_or("none")
    )]
    UnexpectedClosingElement {
        expected: Option<String>,
        found: String,
    },

    #[error("Missing required '{field}' on <{element}>")]
    MissingRequiredField {
        element: &'static str,
        field: &'static str,
    },

    #[error("Invalid value '{value}' for '{field}'")]
    InvalidScalar { field: &'static str, value: String },
}

impl ParseError {
    pub(crate) fn markup(position: u64, err: impl Display) -> Self {
        Self::MalformedMarkup {
            position,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_scalar(field: &'static str, value: &str) -> Self {
        Self::InvalidScalar {
            field,
            value: value.to_string(),
        }
    }

    pub(crate) fn missing(element: &'static str, field: &'static str) -> Self {
        Self::MissingRequiredField { element, field }
    }
}

impl From<ParseError> for JsValue {
    fn from(e: ParseError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
