//! Endpoint declaration validator
//!
//! An API declaration is the JSON description of a server endpoint:
//!
//! ```json
//! {
//!   "endpoint": "/dataservices/bulk/processInput.sjs",
//!   "params": [
//!     {"name": "endpointState", "datatype": "jsonDocument", "multiple": false, "nullable": true},
//!     {"name": "input", "datatype": "jsonDocument", "multiple": true, "nullable": true}
//!   ],
//!   "return": {"datatype": "jsonDocument", "multiple": true, "nullable": true},
//!   "$bulk": {"inputBatchSize": 50}
//! }
//! ```
//!
//! [`EndpointDeclaration::parse`] validates the declaration once against the
//! presence of the caller's input and output handles. The result is
//! immutable and shared read-only by every call made against the endpoint.

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::descriptor::{ParamDescriptor, ParamRole, ReturnDescriptor};
use crate::error::{Error, Result};
use crate::format::{DataType, Format};

/// Default number of input items sent per call by a bulk caller.
pub const DEFAULT_INPUT_BATCH_SIZE: usize = 100;

/// Batching settings read from the declaration's `$bulk` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSettings {
    /// Input items per call
    pub input_batch_size: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            input_batch_size: DEFAULT_INPUT_BATCH_SIZE,
        }
    }
}

impl BulkSettings {
    fn from_json(json: Option<&JsonValue>) -> Result<Self> {
        let Some(json) = json else {
            return Ok(Self::default());
        };
        let bulk = json.as_object().ok_or_else(|| {
            Error::configuration(format!("$bulk must be object in endpoint declaration: {}", json))
        })?;
        let input_batch_size = match bulk.get("inputBatchSize") {
            None => DEFAULT_INPUT_BATCH_SIZE,
            Some(size) => match size.as_u64() {
                Some(n) if n > 0 => n as usize,
                _ => {
                    return Err(Error::configuration(format!(
                        "inputBatchSize must be a positive integer: {}",
                        size
                    )))
                }
            },
        };
        Ok(Self { input_batch_size })
    }
}

/// Shape of the server's request parameters, derived from the node-valued roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterValuesKind {
    /// No document parameters
    None,
    /// Exactly one document value
    SingleNode,
    /// Several document values
    MultipleNodes,
}

impl ParameterValuesKind {
    /// Classify a node argument count.
    pub fn for_node_count(count: usize) -> Self {
        match count {
            0 => ParameterValuesKind::None,
            1 => ParameterValuesKind::SingleNode,
            _ => ParameterValuesKind::MultipleNodes,
        }
    }
}

/// A validated endpoint declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDeclaration {
    endpoint_path: String,
    endpoint_state: Option<ParamDescriptor>,
    input: Option<ParamDescriptor>,
    session: Option<ParamDescriptor>,
    constants: Option<ParamDescriptor>,
    returns: Option<ReturnDescriptor>,
    bulk: BulkSettings,
    node_arg_count: usize,
}

impl EndpointDeclaration {
    /// Validate a declaration given as JSON text.
    pub fn from_text(
        declaration: &str,
        has_input_handle: bool,
        has_output_handle: bool,
    ) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(declaration).map_err(|e| {
            Error::configuration(format!("endpoint declaration is not JSON: {}", e))
        })?;
        Self::parse(&json, has_input_handle, has_output_handle)
    }

    /// Validate a declaration.
    ///
    /// `has_input_handle` and `has_output_handle` say whether the caller
    /// supplied a handle for input values and for returned values; both must
    /// agree with what the endpoint declares.
    pub fn parse(
        declaration: &JsonValue,
        has_input_handle: bool,
        has_output_handle: bool,
    ) -> Result<Self> {
        if !declaration.is_object() {
            return Err(Error::configuration(format!(
                "endpoint declaration must be object: {}",
                declaration
            )));
        }

        let endpoint_path = match declaration.get("endpoint").and_then(JsonValue::as_str) {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => {
                return Err(Error::configuration(format!(
                    "no endpoint in endpoint declaration: {}",
                    declaration
                )))
            }
        };

        let mut endpoint_state = None;
        let mut input = None;
        let mut session = None;
        let mut constants: Option<ParamDescriptor> = None;
        let mut node_arg_count = 0;

        if let Some(params) = declaration.get("params") {
            let params = params.as_array().ok_or_else(|| {
                Error::configuration(format!(
                    "params must be array in endpoint declaration: {}",
                    declaration
                ))
            })?;

            for param in params {
                let param = ParamDescriptor::from_json(param)?;
                match param.role() {
                    ParamRole::EndpointState => {
                        if param.is_multiple() {
                            return Err(Error::configuration(
                                "endpointState parameter cannot be multiple",
                            ));
                        } else if !param.is_nullable() {
                            return Err(Error::configuration(
                                "endpointState parameter must be nullable",
                            ));
                        }
                        reject_duplicate(&endpoint_state, &param)?;
                        endpoint_state = Some(param);
                        node_arg_count += 1;
                    }
                    ParamRole::Input => {
                        if !param.is_multiple() {
                            return Err(Error::configuration("input parameter must be multiple"));
                        } else if !param.is_nullable() {
                            return Err(Error::configuration("input parameter must be nullable"));
                        }
                        reject_duplicate(&input, &param)?;
                        if !has_input_handle {
                            return Err(Error::configuration(
                                "no input handle provided for input parameter",
                            ));
                        }
                        input = Some(param);
                        node_arg_count += 2;
                    }
                    ParamRole::Session => {
                        if param.data_type() != DataType::Session {
                            return Err(Error::configuration(
                                "session parameter must have session data type",
                            ));
                        } else if param.is_multiple() {
                            return Err(Error::configuration("session parameter cannot be multiple"));
                        }
                        reject_duplicate(&session, &param)?;
                        session = Some(param);
                    }
                    ParamRole::Constants(_) => {
                        if let Some(existing) = &constants {
                            return Err(Error::configuration(format!(
                                "can only declare one of {} and {}",
                                param.name(),
                                existing.name()
                            )));
                        } else if param.is_multiple() {
                            return Err(Error::configuration(format!(
                                "{} parameter cannot be multiple",
                                param.name()
                            )));
                        }
                        constants = Some(param);
                        node_arg_count += 1;
                    }
                }
            }
        }

        if input.is_none() && has_input_handle {
            return Err(Error::configuration(
                "no input parameter declared but input handle provided",
            ));
        }

        let returns = match declaration.get("return") {
            Some(json) => {
                let returns = ReturnDescriptor::from_json(json)?;
                if !returns.is_nullable() {
                    return Err(Error::configuration("return must be nullable"));
                }
                if !has_output_handle && endpoint_state.is_none() {
                    return Err(Error::configuration(
                        "no output handle provided for return values",
                    ));
                }
                Some(returns)
            }
            None if has_output_handle => {
                return Err(Error::configuration(
                    "no return values declared but output handle provided",
                ))
            }
            None => None,
        };

        if let Some(state) = &endpoint_state {
            match &returns {
                None => {
                    return Err(Error::configuration(format!(
                        "endpointState parameter requires return in endpoint: {}",
                        endpoint_path
                    )))
                }
                Some(returns) if returns.format() != state.format() => {
                    return Err(Error::configuration(format!(
                        "endpointState format must match return format in endpoint: {}",
                        endpoint_path
                    )))
                }
                Some(_) => {}
            }
        }

        let bulk = BulkSettings::from_json(declaration.get("$bulk"))?;

        debug!(
            target: "dataservices::declaration",
            endpoint = %endpoint_path,
            node_arg_count,
            input_batch_size = bulk.input_batch_size,
            "Validated endpoint declaration"
        );

        Ok(Self {
            endpoint_path,
            endpoint_state,
            input,
            session,
            constants,
            returns,
            bulk,
            node_arg_count,
        })
    }

    /// Server path of the endpoint module
    pub fn endpoint_path(&self) -> &str {
        &self.endpoint_path
    }

    /// Declared `endpointState` parameter
    pub fn endpoint_state(&self) -> Option<&ParamDescriptor> {
        self.endpoint_state.as_ref()
    }

    /// Declared `input` parameter
    pub fn input(&self) -> Option<&ParamDescriptor> {
        self.input.as_ref()
    }

    /// Declared `session` parameter
    pub fn session(&self) -> Option<&ParamDescriptor> {
        self.session.as_ref()
    }

    /// Declared `endpointConstants` or `workUnit` parameter
    pub fn constants(&self) -> Option<&ParamDescriptor> {
        self.constants.as_ref()
    }

    /// Declared return value
    pub fn returns(&self) -> Option<&ReturnDescriptor> {
        self.returns.as_ref()
    }

    /// All declared parameters, in wire order
    pub fn params(&self) -> impl Iterator<Item = &ParamDescriptor> {
        [
            self.endpoint_state.as_ref(),
            self.session.as_ref(),
            self.constants.as_ref(),
            self.input.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Format input values are encoded in
    pub fn input_format(&self) -> Option<Format> {
        self.input.as_ref().map(ParamDescriptor::format)
    }

    /// Format returned values are decoded from
    pub fn output_format(&self) -> Option<Format> {
        self.returns.as_ref().map(ReturnDescriptor::format)
    }

    /// Batching settings for bulk callers
    pub fn bulk(&self) -> BulkSettings {
        self.bulk
    }

    /// Weighted count of node-valued parameters
    pub fn node_arg_count(&self) -> usize {
        self.node_arg_count
    }

    /// Request shape for the transport
    pub fn values_kind(&self) -> ParameterValuesKind {
        ParameterValuesKind::for_node_count(self.node_arg_count)
    }
}

fn reject_duplicate(existing: &Option<ParamDescriptor>, param: &ParamDescriptor) -> Result<()> {
    if existing.is_some() {
        return Err(Error::configuration(format!(
            "{} parameter declared more than once",
            param.name()
        )));
    }
    Ok(())
}
