// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub(crate) mod errors;
pub mod extract;
pub mod intrinsics;
pub mod normalize;
pub mod report;
pub mod rules;
pub mod values;

use std::fmt::Formatter;

use colored::*;
use log::debug;
use serde::Serialize;

use crate::analysis::extract::{extract_policies, Catalog};
use crate::analysis::intrinsics::Environment;
use crate::analysis::normalize::normalize_document;
use crate::analysis::report::AuditReport;
use crate::analysis::rules::evaluate_statements;
use crate::analysis::values::Value;

pub use errors::Error;

pub type Result<R> = std::result::Result<R, Error>;

/// How much a finding matters. Ordering is by increasing weight so
/// reports can sort worst-last or filter by threshold.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => f.write_str(&"LOW".green())?,
            Severity::Medium => f.write_str(&"MEDIUM".yellow())?,
            Severity::High => f.write_str(&"HIGH".red())?,
        }
        Ok(())
    }
}

/// Runs the full pipeline over one deserialized template: extraction,
/// normalization and rule evaluation. Structural problems in individual
/// policy documents are collected into the report, never raised; the only
/// error cases are top-level template shape violations.
pub fn analyze_template(
    template: &Value,
    env: &Environment,
    catalog: &Catalog,
) -> Result<AuditReport> {
    debug!("Entered analyze_template");

    let extracted = extract_policies(template, catalog)?;
    let mut errors = extracted.errors;
    let mut policies = Vec::new();

    for document in extracted.documents {
        debug!("Normalizing policy document at {}", document.location);
        match normalize_document(&document, env) {
            Ok(mut normalized) => {
                errors.append(&mut normalized.skipped);
                policies.push(normalized);
            }
            Err(structural) => errors.push(structural),
        }
    }

    let findings = evaluate_statements(&policies);
    Ok(AuditReport::assemble(findings, errors))
}
