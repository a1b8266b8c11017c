//! dataservices - client for calling database data service endpoints
//!
//! A data service endpoint is a server-side module described by a JSON
//! declaration: its path, its parameters (endpoint state, session, constants,
//! input) and its return value. This crate validates declarations, makes
//! single calls, and runs bulk units of work over a pool of workers.
//!
//! # Quick Start
//!
//! ```ignore
//! use dataservices::{ClientConfig, DataServicesClient, OutputCaller, StringHandle};
//!
//! let client = DataServicesClient::connect(ClientConfig::default())?;
//! let caller = OutputCaller::on(&client, &declaration, StringHandle)?;
//!
//! let bulk = caller.bulk_caller()?;
//! bulk.set_output_listener(|row: String| println!("{}", row));
//! bulk.await_completion()?;
//! ```
//!
//! # Architecture
//!
//! - `dataservices-core`: declarations, formats, errors
//! - `dataservices-transport`: request/response model and the HTTP transport
//! - `dataservices-caller`: call contexts, the executor, facades and bulk callers

pub use dataservices_caller::*;
pub use dataservices_core::{
    compare_declarations, BulkSettings, ConstantsName, DataType, DeclarationDifference,
    EndpointDeclaration, Error, Format, ParamDescriptor, ParamRole, ParameterValuesKind, Result,
    ReturnDescriptor, SessionState, DEFAULT_INPUT_BATCH_SIZE,
};
pub use dataservices_transport::{
    CallField, CallRequest, CallResponse, Document, FieldValue, ResponseShape, SessionBinding,
    Transport,
};

#[cfg(feature = "http")]
pub use dataservices_transport::HttpTransport;
