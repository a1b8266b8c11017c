//! Declaration comparison
//!
//! A custom implementation of a service is compatible with its base when
//! every endpoint keeps the base's calling convention. [`compare_declarations`]
//! reports each difference that would break code written against the base.

use std::fmt;

use crate::declaration::EndpointDeclaration;
use crate::descriptor::{ParamDescriptor, ParamRole, ReturnDescriptor};

/// One incompatibility between a custom declaration and its base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationDifference {
    /// Endpoint paths differ
    EndpointPath {
        /// Base path
        base: String,
        /// Custom path
        custom: String,
    },
    /// Parameter declared by the base but not the custom endpoint
    MissingParam(ParamRole),
    /// Parameter declared by the custom endpoint but not the base
    ExtraParam(ParamRole),
    /// Parameter declared by both with a different datatype or flags
    ChangedParam {
        /// Parameter role
        role: ParamRole,
        /// Description of the change
        detail: String,
    },
    /// Return declared by one side only
    ReturnPresence {
        /// Whether the base declares a return
        base: bool,
    },
    /// Return declared by both with a different datatype or flags
    ChangedReturn {
        /// Description of the change
        detail: String,
    },
}

impl fmt::Display for DeclarationDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationDifference::EndpointPath { base, custom } => {
                write!(f, "endpoint {} differs from base {}", custom, base)
            }
            DeclarationDifference::MissingParam(role) => {
                write!(f, "{} parameter missing from custom endpoint", role)
            }
            DeclarationDifference::ExtraParam(role) => {
                write!(f, "{} parameter not declared by base endpoint", role)
            }
            DeclarationDifference::ChangedParam { role, detail } => {
                write!(f, "{} parameter changed: {}", role, detail)
            }
            DeclarationDifference::ReturnPresence { base: true } => {
                write!(f, "return missing from custom endpoint")
            }
            DeclarationDifference::ReturnPresence { base: false } => {
                write!(f, "return not declared by base endpoint")
            }
            DeclarationDifference::ChangedReturn { detail } => {
                write!(f, "return changed: {}", detail)
            }
        }
    }
}

/// List the differences between a custom declaration and its base.
///
/// An empty list means the custom endpoint can be called exactly like the base.
pub fn compare_declarations(
    custom: &EndpointDeclaration,
    base: &EndpointDeclaration,
) -> Vec<DeclarationDifference> {
    let mut differences = Vec::new();

    if custom.endpoint_path() != base.endpoint_path() {
        differences.push(DeclarationDifference::EndpointPath {
            base: base.endpoint_path().to_string(),
            custom: custom.endpoint_path().to_string(),
        });
    }

    for base_param in base.params() {
        match custom.params().find(|p| p.name() == base_param.name()) {
            None => differences.push(DeclarationDifference::MissingParam(base_param.role())),
            Some(custom_param) => {
                if let Some(detail) = param_change(custom_param, base_param) {
                    differences.push(DeclarationDifference::ChangedParam {
                        role: base_param.role(),
                        detail,
                    });
                }
            }
        }
    }
    for custom_param in custom.params() {
        if !base.params().any(|p| p.name() == custom_param.name()) {
            differences.push(DeclarationDifference::ExtraParam(custom_param.role()));
        }
    }

    match (custom.returns(), base.returns()) {
        (Some(custom_return), Some(base_return)) => {
            if let Some(detail) = return_change(custom_return, base_return) {
                differences.push(DeclarationDifference::ChangedReturn { detail });
            }
        }
        (None, Some(_)) => differences.push(DeclarationDifference::ReturnPresence { base: true }),
        (Some(_), None) => differences.push(DeclarationDifference::ReturnPresence { base: false }),
        (None, None) => {}
    }

    differences
}

fn param_change(custom: &ParamDescriptor, base: &ParamDescriptor) -> Option<String> {
    shape_change(
        (custom.data_type().name(), custom.is_multiple(), custom.is_nullable()),
        (base.data_type().name(), base.is_multiple(), base.is_nullable()),
    )
}

fn return_change(custom: &ReturnDescriptor, base: &ReturnDescriptor) -> Option<String> {
    shape_change(
        (custom.data_type().name(), custom.is_multiple(), custom.is_nullable()),
        (base.data_type().name(), base.is_multiple(), base.is_nullable()),
    )
}

fn shape_change(custom: (&str, bool, bool), base: (&str, bool, bool)) -> Option<String> {
    let mut changes = Vec::new();
    if custom.0 != base.0 {
        changes.push(format!("datatype {} instead of {}", custom.0, base.0));
    }
    if custom.1 != base.1 {
        changes.push(format!("multiple {} instead of {}", custom.1, base.1));
    }
    if custom.2 != base.2 {
        changes.push(format!("nullable {} instead of {}", custom.2, base.2));
    }
    if changes.is_empty() {
        None
    } else {
        Some(changes.join(", "))
    }
}
