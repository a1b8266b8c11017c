//! Core types for data service calls
//!
//! This crate defines what is known about an endpoint before any call is made:
//! - Format / DataType: wire formats and the server datatypes that select them
//! - ParamDescriptor / ReturnDescriptor: one declared parameter or return value
//! - EndpointDeclaration: the validated API declaration of one endpoint
//! - SessionState: client-chosen server session identifier
//! - Error: error taxonomy shared by every crate
//! - compare_declarations: compatibility check between two declarations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compare;
pub mod declaration;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod session;

pub use compare::{compare_declarations, DeclarationDifference};
pub use declaration::{
    BulkSettings, EndpointDeclaration, ParameterValuesKind, DEFAULT_INPUT_BATCH_SIZE,
};
pub use descriptor::{ConstantsName, ParamDescriptor, ParamRole, ReturnDescriptor};
pub use error::{Error, Result};
pub use format::{DataType, Format};
pub use session::SessionState;
