//! Parameter and return descriptors
//!
//! A descriptor is one entry of an endpoint declaration: the `params` array
//! holds [`ParamDescriptor`]s and the optional `return` object is a
//! [`ReturnDescriptor`]. Parameter names are not free-form; each one names a
//! fixed [`ParamRole`].

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{Error, Result};
use crate::format::{DataType, Format};

/// Which of the two interchangeable constants parameter names was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantsName {
    /// `endpointConstants`
    EndpointConstants,
    /// `workUnit` (older name for the same role)
    WorkUnit,
}

impl ConstantsName {
    /// Parameter name as declared and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstantsName::EndpointConstants => "endpointConstants",
            ConstantsName::WorkUnit => "workUnit",
        }
    }
}

/// Reserved role of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    /// Opaque state threaded from one call to the next
    EndpointState,
    /// Batch of input values
    Input,
    /// Server session identifier
    Session,
    /// Values fixed for the whole unit of work
    Constants(ConstantsName),
}

impl ParamRole {
    /// Map a declared parameter name onto its role.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "endpointState" => Ok(ParamRole::EndpointState),
            "input" => Ok(ParamRole::Input),
            "session" => Ok(ParamRole::Session),
            "endpointConstants" => Ok(ParamRole::Constants(ConstantsName::EndpointConstants)),
            "workUnit" => Ok(ParamRole::Constants(ConstantsName::WorkUnit)),
            other => Err(Error::configuration(format!(
                "unknown parameter name: {}",
                other
            ))),
        }
    }

    /// Parameter name as declared and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamRole::EndpointState => "endpointState",
            ParamRole::Input => "input",
            ParamRole::Session => "session",
            ParamRole::Constants(name) => name.as_str(),
        }
    }
}

impl fmt::Display for ParamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    name: Option<String>,
    datatype: String,
    #[serde(default)]
    multiple: bool,
    #[serde(default)]
    nullable: bool,
}

impl RawDescriptor {
    fn from_json(json: &JsonValue, what: &str) -> Result<Self> {
        if !json.is_object() {
            return Err(Error::configuration(format!(
                "{} must be object in endpoint declaration: {}",
                what, json
            )));
        }
        RawDescriptor::deserialize(json).map_err(|e| {
            Error::configuration(format!("invalid {} {}: {}", what, json, e))
        })
    }
}

/// One declared endpoint parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    role: ParamRole,
    data_type: DataType,
    multiple: bool,
    nullable: bool,
}

impl ParamDescriptor {
    /// Parse one entry of the declaration's `params` array.
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let raw = RawDescriptor::from_json(json, "parameter")?;
        let name = raw
            .name
            .ok_or_else(|| Error::configuration(format!("parameter without name: {}", json)))?;
        Ok(Self {
            role: ParamRole::parse(&name)?,
            data_type: DataType::parse(&raw.datatype)?,
            multiple: raw.multiple,
            nullable: raw.nullable,
        })
    }

    /// Reserved role named by this parameter
    pub fn role(&self) -> ParamRole {
        self.role
    }

    /// Declared parameter name
    pub fn name(&self) -> &'static str {
        self.role.as_str()
    }

    /// Declared datatype
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Wire format of the parameter's values
    pub fn format(&self) -> Format {
        self.data_type.format()
    }

    /// Whether the parameter takes a sequence of values
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Whether the parameter may be omitted
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// The declared return value of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnDescriptor {
    data_type: DataType,
    multiple: bool,
    nullable: bool,
}

impl ReturnDescriptor {
    /// Parse the declaration's `return` object.
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let raw = RawDescriptor::from_json(json, "return")?;
        Ok(Self {
            data_type: DataType::parse(&raw.datatype)?,
            multiple: raw.multiple,
            nullable: raw.nullable,
        })
    }

    /// Declared datatype
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Wire format of the returned values
    pub fn format(&self) -> Format {
        self.data_type.format()
    }

    /// Whether the endpoint returns a sequence of values
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Whether the endpoint may return nothing
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}
