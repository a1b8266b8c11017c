//! Content handles
//!
//! A handle converts between an application type and the encoded bytes of one
//! parameter or return value. The declaration decides the wire [`Format`];
//! the caller checks up front that its handles can represent that format, so
//! a mismatch fails when the caller is built rather than on the first call.

use std::marker::PhantomData;

use dataservices_core::{Error, Format, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts values of `T` to and from encoded content.
///
/// Handles are shared by every worker of a bulk caller.
pub trait ContentHandle<T>: Send + Sync {
    /// Returns true if the handle can represent content of `format`.
    fn supports(&self, format: Format) -> bool;

    /// Encode one value as `format`.
    fn encode(&self, value: &T, format: Format) -> Result<Vec<u8>>;

    /// Decode one value received as `format`.
    fn decode(&self, bytes: Vec<u8>, format: Format) -> Result<T>;
}

/// Text content as `String`.
///
/// Supports every format with a textual representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringHandle;

impl ContentHandle<String> for StringHandle {
    fn supports(&self, format: Format) -> bool {
        matches!(format, Format::Json | Format::Xml | Format::Text)
    }

    fn encode(&self, value: &String, _format: Format) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: Vec<u8>, format: Format) -> Result<String> {
        String::from_utf8(bytes)
            .map_err(|e| Error::content(format!("{} content is not valid UTF-8: {}", format, e)))
    }
}

/// Raw content as `Vec<u8>`, for any format.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesHandle;

impl ContentHandle<Vec<u8>> for BytesHandle {
    fn supports(&self, _format: Format) -> bool {
        true
    }

    fn encode(&self, value: &Vec<u8>, _format: Format) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: Vec<u8>, _format: Format) -> Result<Vec<u8>> {
        Ok(bytes)
    }
}

/// JSON content mapped onto any serde type.
///
/// `JsonHandle::<serde_json::Value>::new()` passes documents through as
/// untyped values; a struct type gives typed rows.
pub struct JsonHandle<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonHandle<T> {
    /// Create a handle.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonHandle<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonHandle")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ContentHandle<T> for JsonHandle<T>
where
    T: Serialize + DeserializeOwned,
{
    fn supports(&self, format: Format) -> bool {
        format == Format::Json
    }

    fn encode(&self, value: &T, _format: Format) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: Vec<u8>, _format: Format) -> Result<T> {
        Ok(serde_json::from_slice(&bytes)?)
    }
}
