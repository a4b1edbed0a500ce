// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use log::{debug, trace};

use crate::analysis::extract::PolicyLocation;
use crate::analysis::normalize::{Effect, NormalizedPolicy, NormalizedStatement};
use crate::analysis::report::Finding;
use crate::analysis::Severity;

/// A single-statement risk predicate. Rules never mutate the statement and
/// never see their siblings; cross-statement reasoning (a Deny narrowing
/// an earlier Allow) is deliberately not modeled here.
pub trait RiskRule: Sync {
    fn id(&self) -> &'static str;
    fn short_description(&self) -> &'static str;
    fn severity(&self) -> Severity;
    /// Returns the finding message when the statement trips the rule.
    fn evaluate(&self, statement: &NormalizedStatement) -> Option<String>;
}

fn sid_suffix(statement: &NormalizedStatement) -> String {
    match &statement.sid {
        Some(sid) => format!(" (Sid {})", sid),
        None => String::new(),
    }
}

fn references_referer(statement: &NormalizedStatement) -> bool {
    match &statement.condition {
        Some(condition) => condition.values().any(|keys| {
            keys.keys()
                .any(|key| key.eq_ignore_ascii_case("aws:Referer"))
        }),
        None => false,
    }
}

/// Effect=Allow with principal `"*"` and no Condition block at all.
struct WildcardPrincipalUnconditioned;

impl RiskRule for WildcardPrincipalUnconditioned {
    fn id(&self) -> &'static str {
        "PA001"
    }

    fn short_description(&self) -> &'static str {
        "Wildcard principal without condition"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn evaluate(&self, statement: &NormalizedStatement) -> Option<String> {
        if statement.effect == Effect::Allow
            && statement.principal.includes_anyone()
            && statement.condition.is_none()
        {
            return Some(format!(
                "Statement{} grants access to anyone (Principal \"*\") with no restricting condition; the resource is publicly accessible",
                sid_suffix(statement)
            ));
        }
        None
    }
}

/// Same grant, but fenced by a Condition block. The grant is still public
/// in principle; referer-based fences are called out as spoofable.
struct WildcardPrincipalConditioned;

impl RiskRule for WildcardPrincipalConditioned {
    fn id(&self) -> &'static str {
        "PA002"
    }

    fn short_description(&self) -> &'static str {
        "Wildcard principal restricted by condition"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn evaluate(&self, statement: &NormalizedStatement) -> Option<String> {
        if statement.effect == Effect::Allow
            && statement.principal.includes_anyone()
            && statement.condition.is_some()
        {
            let message = if references_referer(statement) {
                format!(
                    "Statement{} grants access to anyone, restricted only by aws:Referer; the Referer header is client-supplied and trivially spoofable",
                    sid_suffix(statement)
                )
            } else {
                format!(
                    "Statement{} grants access to anyone, restricted by a condition; verify the condition keys cannot be satisfied by an arbitrary caller",
                    sid_suffix(statement)
                )
            };
            return Some(message);
        }
        None
    }
}

/// A Resource entry that could not be resolved statically.
struct UnresolvedResource;

impl RiskRule for UnresolvedResource {
    fn id(&self) -> &'static str {
        "PA003"
    }

    fn short_description(&self) -> &'static str {
        "Resource scope not statically verifiable"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn evaluate(&self, statement: &NormalizedStatement) -> Option<String> {
        let unresolved = statement
            .resources
            .iter()
            .filter(|resource| resource.is_unresolved())
            .count();
        if unresolved > 0 {
            return Some(format!(
                "Statement{} has {} Resource value(s) built from deploy-time-only references; the resource scope cannot be verified statically",
                sid_suffix(statement),
                unresolved
            ));
        }
        None
    }
}

/// Allow with `"*"` or `service:*` actions.
struct WildcardAction;

impl RiskRule for WildcardAction {
    fn id(&self) -> &'static str {
        "PA004"
    }

    fn short_description(&self) -> &'static str {
        "Wildcard action grant"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn evaluate(&self, statement: &NormalizedStatement) -> Option<String> {
        if statement.effect != Effect::Allow {
            return None;
        }
        let wildcard = statement.actions.iter().find_map(|action| {
            action.as_resolved().filter(|resolved| {
                *resolved == "*" || resolved.ends_with(":*")
            })
        });
        wildcard.map(|action| {
            format!(
                "Statement{} allows the wildcard action \"{}\"; grants every operation in scope rather than the ones required",
                sid_suffix(statement),
                action
            )
        })
    }
}

/// `NotPrincipal` with Allow grants to everyone except the listed
/// principals, which is almost always broader than intended.
struct InvertedPrincipalAllow;

impl RiskRule for InvertedPrincipalAllow {
    fn id(&self) -> &'static str {
        "PA005"
    }

    fn short_description(&self) -> &'static str {
        "NotPrincipal used with Allow"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn evaluate(&self, statement: &NormalizedStatement) -> Option<String> {
        if statement.effect == Effect::Allow && statement.inverted_principal {
            return Some(format!(
                "Statement{} allows every principal except the ones listed in NotPrincipal; this grants to anyone outside the exclusion list",
                sid_suffix(statement)
            ));
        }
        None
    }
}

static STATEMENT_RULES: [&'static dyn RiskRule; 5] = [
    &WildcardPrincipalUnconditioned,
    &WildcardPrincipalConditioned,
    &UnresolvedResource,
    &WildcardAction,
    &InvertedPrincipalAllow,
];

pub fn statement_rules() -> &'static [&'static dyn RiskRule] {
    &STATEMENT_RULES
}

/// Document-level size check: the serialized policy text must stay under
/// the limit the catalog declares for its field (trust policies cap at
/// 2048 characters).
const OVERSIZED_DOCUMENT_RULE_ID: &str = "PA101";

fn evaluate_document(policy: &NormalizedPolicy) -> Option<Finding> {
    let limit = policy.size_limit?;
    if policy.serialized_len <= limit {
        return None;
    }
    Some(Finding {
        location: policy.location.clone(),
        rule_id: OVERSIZED_DOCUMENT_RULE_ID,
        severity: Severity::Low,
        message: format!(
            "Policy JSON text is {} characters, above the {} character limit for this field",
            policy.serialized_len, limit
        ),
    })
}

/// Runs every rule over every normalized statement. Each rule contributes
/// independently; the caller's report assembly deduplicates by
/// (location, rule id), so rule ordering cannot affect the final set.
pub fn evaluate_statements(policies: &[NormalizedPolicy]) -> Vec<Finding> {
    debug!("Entered evaluate_statements over {} documents", policies.len());

    let mut findings = Vec::new();
    for policy in policies {
        if let Some(finding) = evaluate_document(policy) {
            findings.push(finding);
        }
        let statement_path = policy.location.path.extend_str("Statement");
        for (idx, statement) in policy.statements.iter().enumerate() {
            let location = PolicyLocation {
                resource: policy.location.resource.clone(),
                path: statement_path.extend_usize(idx),
            };
            for rule in statement_rules() {
                if let Some(message) = rule.evaluate(statement) {
                    trace!("Rule {} matched at {}", rule.id(), location);
                    findings.push(Finding {
                        location: location.clone(),
                        rule_id: rule.id(),
                        severity: rule.severity(),
                        message,
                    });
                }
            }
        }
    }
    findings
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod rules_tests;
