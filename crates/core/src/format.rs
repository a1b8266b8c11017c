//! Content formats and server datatypes
//!
//! Every declared parameter and return value has a server datatype, and the
//! datatype fixes the wire format its values travel in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Wire format of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON documents, arrays and objects
    Json,
    /// XML documents
    Xml,
    /// Text documents and atomic values
    Text,
    /// Binary documents
    Binary,
    /// No content format (session parameters)
    Unknown,
}

impl Format {
    /// MIME type used on the wire.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
            Format::Text => "text/plain",
            Format::Binary | Format::Unknown => "application/octet-stream",
        }
    }

    /// Infer a format from a `Content-Type` header value.
    pub fn from_mime_type(mime: &str) -> Format {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Format::Json,
            "application/xml" | "text/xml" => Format::Xml,
            "text/plain" => Format::Text,
            "application/octet-stream" => Format::Binary,
            other if other.ends_with("+json") => Format::Json,
            other if other.ends_with("+xml") => Format::Xml,
            other if other.starts_with("text/") => Format::Text,
            _ => Format::Unknown,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Json => "JSON",
            Format::Xml => "XML",
            Format::Text => "TEXT",
            Format::Binary => "BINARY",
            Format::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Server datatype of a declared parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    // Atomic values
    /// `boolean`
    Boolean,
    /// `date`
    Date,
    /// `dateTime`
    DateTime,
    /// `dayTimeDuration`
    DayTimeDuration,
    /// `decimal`
    Decimal,
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `string`
    String,
    /// `time`
    Time,
    /// `unsignedInt`
    UnsignedInt,
    /// `unsignedLong`
    UnsignedLong,

    // Node values
    /// `array`
    Array,
    /// `object`
    Object,
    /// `jsonDocument`
    JsonDocument,
    /// `xmlDocument`
    XmlDocument,
    /// `textDocument`
    TextDocument,
    /// `binaryDocument`
    BinaryDocument,

    /// `session`
    Session,
}

impl DataType {
    /// Parse a declared datatype name.
    ///
    /// Names are case-sensitive except `session`.
    pub fn parse(name: &str) -> Result<Self> {
        let data_type = match name {
            "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            "dateTime" => DataType::DateTime,
            "dayTimeDuration" => DataType::DayTimeDuration,
            "decimal" => DataType::Decimal,
            "double" => DataType::Double,
            "float" => DataType::Float,
            "int" => DataType::Int,
            "long" => DataType::Long,
            "string" => DataType::String,
            "time" => DataType::Time,
            "unsignedInt" => DataType::UnsignedInt,
            "unsignedLong" => DataType::UnsignedLong,
            "array" => DataType::Array,
            "object" => DataType::Object,
            "jsonDocument" => DataType::JsonDocument,
            "xmlDocument" => DataType::XmlDocument,
            "textDocument" => DataType::TextDocument,
            "binaryDocument" => DataType::BinaryDocument,
            other if other.eq_ignore_ascii_case("session") => DataType::Session,
            other => {
                return Err(Error::configuration(format!(
                    "unknown datatype: {}",
                    other
                )))
            }
        };
        Ok(data_type)
    }

    /// Declared name of the datatype.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::DateTime => "dateTime",
            DataType::DayTimeDuration => "dayTimeDuration",
            DataType::Decimal => "decimal",
            DataType::Double => "double",
            DataType::Float => "float",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::String => "string",
            DataType::Time => "time",
            DataType::UnsignedInt => "unsignedInt",
            DataType::UnsignedLong => "unsignedLong",
            DataType::Array => "array",
            DataType::Object => "object",
            DataType::JsonDocument => "jsonDocument",
            DataType::XmlDocument => "xmlDocument",
            DataType::TextDocument => "textDocument",
            DataType::BinaryDocument => "binaryDocument",
            DataType::Session => "session",
        }
    }

    /// Wire format for values of this datatype.
    pub fn format(&self) -> Format {
        match self {
            DataType::Array | DataType::Object | DataType::JsonDocument => Format::Json,
            DataType::XmlDocument => Format::Xml,
            DataType::BinaryDocument => Format::Binary,
            DataType::Session => Format::Unknown,
            _ => Format::Text,
        }
    }

    /// Returns true for document and structured (node) datatypes.
    pub fn is_node(&self) -> bool {
        matches!(
            self,
            DataType::Array
                | DataType::Object
                | DataType::JsonDocument
                | DataType::XmlDocument
                | DataType::TextDocument
                | DataType::BinaryDocument
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
