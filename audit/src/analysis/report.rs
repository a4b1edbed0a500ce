// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Formatter;

use serde::Serialize;

use crate::analysis::extract::PolicyLocation;
use crate::analysis::{Result, Severity};

/// A risk observation about an otherwise well-formed statement. Immutable
/// once created; the evaluator produces these and nothing mutates them
/// afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub location: PolicyLocation,
    pub rule_id: &'static str,
    pub severity: Severity,
    pub message: String,
}

/// A shape violation in the template or one of its policy documents. Kept
/// apart from findings: one is a defect in the template, the other a risk
/// observation about a valid policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralError {
    pub location: PolicyLocation,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub findings: Vec<Finding>,
    pub errors: Vec<StructuralError>,
}

impl AuditReport {
    /// Orders findings by (location, rule id) for reproducible diffs and
    /// drops duplicates on the same key; each rule contributes at most one
    /// finding per location. Structural errors keep extraction order.
    pub fn assemble(mut findings: Vec<Finding>, errors: Vec<StructuralError>) -> AuditReport {
        findings.sort_by(|left, right| {
            (&left.location, left.rule_id).cmp(&(&right.location, right.rule_id))
        });
        findings.dedup_by(|left, right| {
            left.location == right.location && left.rule_id == right.rule_id
        });
        AuditReport { findings, errors }
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.errors.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for AuditReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for finding in &self.findings {
            writeln!(
                f,
                "{} {} {} {}",
                finding.severity, finding.rule_id, finding.location, finding.message
            )?;
        }
        for error in &self.errors {
            writeln!(f, "ERROR {} {}", error.location, error.reason)?;
        }
        Ok(())
    }
}
