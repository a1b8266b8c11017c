//! Endpoint callers
//!
//! Everything an application uses to call data service endpoints:
//! - DataServicesClient: transport plus configuration
//! - InputOutputCaller / InputCaller / OutputCaller / ExecCaller: one facade
//!   per endpoint shape, for single calls
//! - BulkCaller: batched, optionally multi-threaded unit of work
//! - CallContext: endpoint state, session and constants of one call stream
//! - ContentHandle: conversion between application values and documents
//!
//! # Example
//!
//! ```no_run
//! use dataservices_caller::{
//!     ClientConfig, DataServicesClient, InputOutputCaller, IoEndpoint, StringHandle,
//! };
//! use serde_json::json;
//!
//! # fn main() -> dataservices_core::Result<()> {
//! let client = DataServicesClient::connect(ClientConfig::default())?;
//! let declaration = json!({
//!     "endpoint": "/ds/enrich.sjs",
//!     "params": [{"name": "input", "datatype": "jsonDocument", "multiple": true, "nullable": true}],
//!     "return": {"datatype": "jsonDocument", "multiple": true, "nullable": true}
//! });
//! let caller = InputOutputCaller::on(&client, &declaration, StringHandle, StringHandle)?;
//!
//! let bulk = caller.bulk_caller_with_threads(vec![caller.new_call_context()], 4)?;
//! bulk.set_output_listener(|row: String| println!("{}", row));
//! bulk.accept_all((0..1000).map(|i| format!("{{\"id\":{}}}", i)))?;
//! let report = bulk.await_completion()?;
//! println!("{} calls", report.calls);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod client;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod executor;
pub mod handle;
pub mod listener;

pub use bulk::{BulkCaller, BulkReport, BulkState};
pub use client::DataServicesClient;
pub use config::{BulkConfig, ClientConfig, CONFIG_FILE_NAME};
pub use context::CallContext;
pub use endpoint::{ExecCaller, InputCaller, InputOutputCaller, IoEndpoint, OutputCaller};
pub use executor::{IoCaller, OutputStream};
pub use handle::{BytesHandle, ContentHandle, JsonHandle, StringHandle};
pub use listener::{ErrorDisposition, ErrorListener, OutputListener};
