// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use indexmap::map::IndexMap;
use log::trace;
use serde::Serialize;

use crate::analysis::extract::{ExtractedDocument, PolicyLocation};
use crate::analysis::intrinsics::{resolve, Environment, IntrinsicValue};
use crate::analysis::report::StructuralError;
use crate::analysis::values::{type_info, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => f.write_str("Allow"),
            Effect::Deny => f.write_str("Deny"),
        }
    }
}

/// Which principal namespace a specifier came from. `Any` is reserved for
/// the bare `"*"` form; a `{"AWS": "*"}` leaf keeps kind `Aws` and the
/// wildcard is detected on the value instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PrincipalKind {
    Any,
    Aws,
    Service,
    Federated,
    CanonicalUser,
    Other(String),
}

impl PrincipalKind {
    fn from_key(key: &str) -> PrincipalKind {
        match key {
            "AWS" => PrincipalKind::Aws,
            "Service" => PrincipalKind::Service,
            "Federated" => PrincipalKind::Federated,
            "CanonicalUser" => PrincipalKind::CanonicalUser,
            other => PrincipalKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalSpecifier {
    pub kind: PrincipalKind,
    pub value: IntrinsicValue,
}

/// A statement's principal set. An absent `Principal` key means the grant
/// inherits its principal from context (the bucket owner, the role being
/// assumed) and is a different thing from the wildcard `"*"`; the two are
/// never conflated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Principal {
    DocumentImplied,
    Specifiers(Vec<PrincipalSpecifier>),
}

impl Principal {
    /// True when the set grants to anyone, either through the bare `"*"`
    /// principal or an `{"AWS": "*"}` leaf.
    pub fn includes_anyone(&self) -> bool {
        match self {
            Principal::DocumentImplied => false,
            Principal::Specifiers(specifiers) => specifiers
                .iter()
                .any(|specifier| specifier.value.as_resolved() == Some("*")),
        }
    }
}

/// Condition block, structure preserved verbatim: operator name to
/// condition key to value list. Rule evaluation inspects operator and key
/// names directly.
pub type ConditionMap = IndexMap<String, IndexMap<String, Vec<IntrinsicValue>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Principal,
    /// True when the statement used `NotPrincipal` instead of `Principal`.
    pub inverted_principal: bool,
    pub actions: Vec<IntrinsicValue>,
    pub resources: Vec<IntrinsicValue>,
    pub condition: Option<ConditionMap>,
}

/// The result of normalizing one document. Statement order matches the raw
/// document; statements that failed their own structural checks are absent
/// from `statements` and recorded in `skipped` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPolicy {
    pub location: PolicyLocation,
    pub statements: Vec<NormalizedStatement>,
    pub size_limit: Option<usize>,
    pub serialized_len: usize,
    pub(crate) skipped: Vec<StructuralError>,
}

/// Canonicalizes one extracted document into the strict statement model.
/// The document-level shape tolerances live here and only here: `Statement`
/// holding a single mapping is wrapped into a one-element list, and every
/// "string or list of strings" field goes through the same
/// `coerce_to_list` point before element-wise intrinsic resolution.
pub fn normalize_document(
    document: &ExtractedDocument,
    env: &Environment,
) -> std::result::Result<NormalizedPolicy, StructuralError> {
    let statements_value = match document.document.get("Statement") {
        Some(value) => value,
        None => {
            return Err(StructuralError {
                location: document.location.clone(),
                reason: "Policy document has no Statement key".to_string(),
            })
        }
    };

    let raw_statements = match coerce_to_list(statements_value) {
        Some(list) => list,
        None => {
            return Err(StructuralError {
                location: document.location.clone(),
                reason: format!(
                    "Statement must be a mapping or a list of mappings, found {}",
                    type_info(statements_value)
                ),
            })
        }
    };

    let serialized_len = serde_json::to_string(&document.document)
        .map(|text| text.len())
        .unwrap_or(0);

    let mut normalized = NormalizedPolicy {
        location: document.location.clone(),
        statements: Vec::with_capacity(raw_statements.len()),
        size_limit: document.size_limit,
        serialized_len,
        skipped: Vec::new(),
    };

    let statement_path = document.location.path.extend_str("Statement");
    for (idx, raw) in raw_statements.iter().enumerate() {
        match normalize_statement(raw, env) {
            Ok(statement) => normalized.statements.push(statement),
            Err(reason) => {
                trace!(
                    "Skipping malformed statement {} at {}: {}",
                    idx,
                    document.location,
                    reason
                );
                normalized.skipped.push(StructuralError {
                    location: PolicyLocation {
                        resource: document.location.resource.clone(),
                        path: statement_path.extend_usize(idx),
                    },
                    reason,
                });
            }
        }
    }

    Ok(normalized)
}

/// The single scalar-vs-list tolerance point: a field documented as "list
/// of X" also accepts a bare X. Mappings count as a bare element here
/// because a lone statement is itself a mapping.
fn coerce_to_list(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::List(list) => Some(list.iter().collect()),
        Value::Map(_) => Some(vec![value]),
        _ => None,
    }
}

/// Scalar-or-list coercion for string-valued fields (`Action`, `Resource`,
/// principal leaves, condition values), where a lone scalar or a lone
/// intrinsic-function mapping both mean a one-element list.
fn coerce_scalar_to_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(list) => list.iter().collect(),
        other => vec![other],
    }
}

fn normalize_statement(
    raw: &Value,
    env: &Environment,
) -> std::result::Result<NormalizedStatement, String> {
    let map = match raw.as_map() {
        Some(map) => map,
        None => {
            return Err(format!(
                "Statement entry must be a mapping, found {}",
                type_info(raw)
            ))
        }
    };

    let effect = match map.get("Effect").and_then(Value::as_str) {
        Some("Allow") => Effect::Allow,
        Some("Deny") => Effect::Deny,
        Some(other) => {
            return Err(format!(
                "Effect must be exactly \"Allow\" or \"Deny\", found \"{}\"",
                other
            ))
        }
        None => return Err("Statement has no Effect key".to_string()),
    };

    let sid = map.get("Sid").and_then(Value::as_str).map(str::to_string);

    let (principal_value, inverted_principal) = match map.get("Principal") {
        Some(value) => (Some(value), false),
        None => match map.get("NotPrincipal") {
            Some(value) => (Some(value), true),
            None => (None, false),
        },
    };
    let principal = match principal_value {
        None => Principal::DocumentImplied,
        Some(value) => normalize_principal(value, env)?,
    };

    let actions = match map.get("Action") {
        Some(value) => resolve_each(value, env),
        None => Vec::new(),
    };
    let resources = match map.get("Resource") {
        Some(value) => resolve_each(value, env),
        None => Vec::new(),
    };

    let condition = match map.get("Condition") {
        None => None,
        Some(Value::Map(operators)) => Some(normalize_condition(operators, env)?),
        Some(other) => {
            return Err(format!(
                "Condition must be a mapping, found {}",
                type_info(other)
            ))
        }
    };

    Ok(NormalizedStatement {
        sid,
        effect,
        principal,
        inverted_principal,
        actions,
        resources,
        condition,
    })
}

fn normalize_principal(
    value: &Value,
    env: &Environment,
) -> std::result::Result<Principal, String> {
    match value {
        Value::String(s) if s == "*" => Ok(Principal::Specifiers(vec![PrincipalSpecifier {
            kind: PrincipalKind::Any,
            value: IntrinsicValue::Literal("*".to_string()),
        }])),
        Value::String(s) => Ok(Principal::Specifiers(vec![PrincipalSpecifier {
            kind: PrincipalKind::Aws,
            value: IntrinsicValue::Literal(s.clone()),
        }])),
        Value::Map(map) => {
            let mut specifiers = Vec::new();
            for (key, leaves) in map {
                let kind = PrincipalKind::from_key(key);
                for leaf in coerce_scalar_to_list(leaves) {
                    specifiers.push(PrincipalSpecifier {
                        kind: kind.clone(),
                        value: resolve(leaf, env),
                    });
                }
            }
            Ok(Principal::Specifiers(specifiers))
        }
        other => Err(format!(
            "Principal must be a string or a mapping, found {}",
            type_info(other)
        )),
    }
}

fn resolve_each(value: &Value, env: &Environment) -> Vec<IntrinsicValue> {
    coerce_scalar_to_list(value)
        .into_iter()
        .map(|element| resolve(element, env))
        .collect()
}

fn normalize_condition(
    operators: &IndexMap<String, Value>,
    env: &Environment,
) -> std::result::Result<ConditionMap, String> {
    let mut condition = ConditionMap::new();
    for (operator, keys) in operators {
        let keys = match keys.as_map() {
            Some(keys) => keys,
            None => {
                return Err(format!(
                    "Condition operator {} must hold a mapping of keys, found {}",
                    operator,
                    type_info(keys)
                ))
            }
        };
        let mut normalized_keys = IndexMap::new();
        for (key, values) in keys {
            normalized_keys.insert(key.clone(), resolve_each(values, env));
        }
        condition.insert(operator.clone(), normalized_keys);
    }
    Ok(condition)
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod normalize_tests;
