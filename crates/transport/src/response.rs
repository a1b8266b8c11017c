//! Endpoint call responses

use dataservices_core::{Error, Format, Result};

use crate::request::Document;

/// What the caller expects back from a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Response content is discarded
    None,
    /// Zero or one value
    Single {
        /// Whether an empty response is allowed
        nullable: bool,
        /// Expected format
        format: Format,
    },
    /// A sequence of values
    Multiple {
        /// Whether an empty response is allowed
        nullable: bool,
        /// Expected format
        format: Format,
    },
}

/// Decoded transport response, matching the requested [`ResponseShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResponse {
    /// No content
    None,
    /// Zero or one value
    Single(Option<Document>),
    /// A sequence of values
    Multiple(Vec<Document>),
}

impl CallResponse {
    /// Check that a response agrees with the shape it was requested with.
    pub fn conform(self, shape: ResponseShape) -> Result<Self> {
        match (shape, self) {
            (ResponseShape::None, _) => Ok(CallResponse::None),
            (ResponseShape::Single { nullable, .. }, CallResponse::None) => {
                if nullable {
                    Ok(CallResponse::Single(None))
                } else {
                    Err(Error::content("no value for non-nullable single return"))
                }
            }
            (ResponseShape::Single { nullable, .. }, CallResponse::Single(value)) => {
                if value.is_none() && !nullable {
                    Err(Error::content("null value for non-nullable single return"))
                } else {
                    Ok(CallResponse::Single(value))
                }
            }
            (ResponseShape::Single { .. }, CallResponse::Multiple(_)) => Err(Error::content(
                "multiple values received for single return",
            )),
            (ResponseShape::Multiple { nullable, .. }, CallResponse::None) => {
                if nullable {
                    Ok(CallResponse::Multiple(Vec::new()))
                } else {
                    Err(Error::content("no values for non-nullable multiple return"))
                }
            }
            (ResponseShape::Multiple { .. }, CallResponse::Single(value)) => {
                Ok(CallResponse::Multiple(value.into_iter().collect()))
            }
            (ResponseShape::Multiple { .. }, CallResponse::Multiple(values)) => {
                Ok(CallResponse::Multiple(values))
            }
        }
    }
}
