// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Static analyzer for access-control policy documents embedded in AWS
//! CloudFormation templates.
//!
//! The engine consumes an already-deserialized template, locates every
//! policy document a catalog of policy-bearing field paths points at,
//! normalizes the document's many equivalent encodings (single statement
//! vs. list, embedded JSON string vs. native mapping, intrinsic-function
//! values vs. literal strings) into one canonical statement model, and
//! evaluates the result against a built-in risk rule set. Malformed
//! documents are reported alongside the findings; a run never aborts
//! because one resource's policy was broken.

use std::collections::HashMap;
use std::convert::TryFrom;

use log::debug;

pub mod analysis;

pub use crate::analysis::extract::{Catalog, CatalogEntry, Path, PolicyLocation};
pub use crate::analysis::intrinsics::{Environment, IntrinsicValue};
pub use crate::analysis::normalize::{
    Effect, NormalizedStatement, Principal, PrincipalKind, PrincipalSpecifier,
};
pub use crate::analysis::report::{AuditReport, Finding, StructuralError};
pub use crate::analysis::rules::RiskRule;
pub use crate::analysis::values::Value;
pub use crate::analysis::{analyze_template, Error, Result, Severity};

/// Convenience entry for embedders holding template text: parses JSON with
/// a YAML fallback, builds the environment from the template's `Parameters`
/// defaults overridden by the supplied values, runs the built-in catalog
/// and returns the report as JSON.
pub fn run_audit(template: &str, parameters: &HashMap<String, String>) -> Result<String> {
    debug!("Entered run_audit");

    let template = match serde_json::from_str::<serde_json::Value>(template) {
        Ok(json) => Value::try_from(&json)?,
        Err(_) => {
            let yaml = serde_yaml::from_str::<serde_yaml::Value>(template)?;
            Value::try_from(&yaml)?
        }
    };

    let mut env = Environment::from_template(&template);
    env.supply_parameters(parameters);

    let report = analyze_template(&template, &env, &Catalog::builtin())?;
    report.to_json()
}
