use serde::Deserialize;

use crate::dispatch::Context;

/// Options for GPX parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    /// Which top-level GPX element types to keep (default: all)
    #[serde(default)]
    pub types: Option<Vec<GpxElementType>>,

    /// Read the document's <metadata> block (default: true)
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Drop track segments without any points (default: false)
    #[serde(default)]
    pub skip_empty_segments: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            types: None,
            include_metadata: true,
            skip_empty_segments: false,
        }
    }
}

impl ParseOptions {
    pub fn should_include(&self, element_type: GpxElementType) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.contains(&element_type),
        }
    }

    /// Whether a builder for `context` should be opened at all.
    pub(crate) fn admits(&self, context: Context) -> bool {
        match context {
            Context::Metadata => self.include_metadata,
            Context::Waypoint => self.should_include(GpxElementType::Waypoint),
            Context::Route => self.should_include(GpxElementType::Route),
            Context::Track => self.should_include(GpxElementType::Track),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpxElementType {
    Waypoint,
    Route,
    Track,
}

fn default_true() -> bool {
    true
}
