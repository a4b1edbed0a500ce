// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::Serialize;

use crate::analysis::values::Value;

/// Parameter and pseudo-parameter bindings an intrinsic function can be
/// resolved against. Parameter defaults from the template's `Parameters`
/// section rank below caller-supplied values.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    parameters: HashMap<String, String>,
    defaults: HashMap<String, String>,
    pseudo: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Collects `Default` values from the template's `Parameters` section.
    /// Non-string defaults (numeric parameters) are rendered to strings the
    /// way CloudFormation itself stringifies parameter values.
    pub fn from_template(template: &Value) -> Self {
        let mut env = Environment::new();
        let params = template
            .as_map()
            .and_then(|root| root.get("Parameters"))
            .and_then(Value::as_map);
        if let Some(params) = params {
            for (name, decl) in params {
                let default = decl.as_map().and_then(|decl| decl.get("Default"));
                match default {
                    Some(Value::String(s)) => {
                        env.defaults.insert(name.clone(), s.clone());
                    }
                    Some(Value::Int(i)) => {
                        env.defaults.insert(name.clone(), i.to_string());
                    }
                    Some(Value::Float(f)) => {
                        env.defaults.insert(name.clone(), f.to_string());
                    }
                    Some(Value::Bool(b)) => {
                        env.defaults.insert(name.clone(), b.to_string());
                    }
                    _ => {}
                }
            }
        }
        env
    }

    pub fn with_parameter<S: Into<String>>(mut self, name: S, value: S) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_pseudo<S: Into<String>>(mut self, name: S, value: S) -> Self {
        self.pseudo.insert(name.into(), value.into());
        self
    }

    pub fn supply_parameters(&mut self, values: &HashMap<String, String>) {
        for (name, value) in values {
            self.parameters.insert(name.clone(), value.clone());
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .or_else(|| self.pseudo.get(name))
            .or_else(|| self.defaults.get(name))
            .map(String::as_str)
    }
}

/// Outcome of resolving one value node. `Unresolved` is a first class,
/// non-fatal result: a `Ref` to a deploy-time-only value still flows
/// through the pipeline and can be judged by rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IntrinsicValue {
    /// A plain string that never went through a function.
    Literal(String),
    /// A function application that resolved fully against the environment.
    Resolved(String),
    /// A function application that could not be resolved statically.
    /// `partial` keeps the per-part results for functions with multiple
    /// segments (`Fn::Join`) so partially known values remain displayable.
    Unresolved {
        function: String,
        args: Vec<Value>,
        partial: Vec<IntrinsicValue>,
    },
}

impl IntrinsicValue {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, IntrinsicValue::Unresolved { .. })
    }

    /// The fully-known string, when there is one.
    pub fn as_resolved(&self) -> Option<&str> {
        match self {
            IntrinsicValue::Literal(s) | IntrinsicValue::Resolved(s) => Some(s.as_str()),
            IntrinsicValue::Unresolved { .. } => None,
        }
    }

    fn unresolved(function: &str, args: Vec<Value>) -> IntrinsicValue {
        IntrinsicValue::Unresolved {
            function: function.to_string(),
            args,
            partial: Vec::new(),
        }
    }
}

impl std::fmt::Display for IntrinsicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntrinsicValue::Literal(s) | IntrinsicValue::Resolved(s) => f.write_str(s),
            IntrinsicValue::Unresolved { function, args, .. } => f.write_fmt(format_args!(
                "<unresolved {}({})>",
                function,
                args.len()
            )),
        }
    }
}

/// Resolves one value node against the environment. Pure: same inputs,
/// same output, no side effects. Never fails; anything this resolver does
/// not model, including malformed argument shapes, degrades to
/// `Unresolved` so one odd value cannot abort a whole run.
pub fn resolve(value: &Value, env: &Environment) -> IntrinsicValue {
    match value {
        Value::String(s) => IntrinsicValue::Literal(s.clone()),
        Value::Int(i) => IntrinsicValue::Literal(i.to_string()),
        Value::Float(f) => IntrinsicValue::Literal(f.to_string()),
        Value::Bool(b) => IntrinsicValue::Literal(b.to_string()),
        Value::Map(map) if map.len() == 1 => {
            let (name, args) = map.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap();
            match name {
                "Ref" => resolve_ref(args, env),
                "Fn::Join" => resolve_join(args, env),
                "Fn::Sub" => resolve_sub(args, env),
                other if other.starts_with("Fn::") => {
                    IntrinsicValue::unresolved(other, vec![args.clone()])
                }
                _ => IntrinsicValue::unresolved("<non-string>", vec![value.clone()]),
            }
        }
        other => IntrinsicValue::unresolved("<non-string>", vec![other.clone()]),
    }
}

fn resolve_ref(args: &Value, env: &Environment) -> IntrinsicValue {
    let name = match args.as_str() {
        Some(name) => name,
        None => return IntrinsicValue::unresolved("Ref", vec![args.clone()]),
    };
    match env.lookup(name) {
        Some(value) => IntrinsicValue::Resolved(value.to_string()),
        None => IntrinsicValue::unresolved("Ref", vec![Value::String(name.to_string())]),
    }
}

fn resolve_join(args: &Value, env: &Environment) -> IntrinsicValue {
    // Fn::Join takes [separator, [parts...]]
    let (separator, parts) = match args {
        Value::List(list) if list.len() == 2 => match (&list[0], &list[1]) {
            (Value::String(sep), Value::List(parts)) => (sep, parts),
            _ => return IntrinsicValue::unresolved("Fn::Join", vec![args.clone()]),
        },
        _ => return IntrinsicValue::unresolved("Fn::Join", vec![args.clone()]),
    };

    let resolved = parts
        .iter()
        .map(|part| resolve(part, env))
        .collect::<Vec<IntrinsicValue>>();

    if resolved.iter().all(|part| part.as_resolved().is_some()) {
        let joined = resolved
            .iter()
            .filter_map(IntrinsicValue::as_resolved)
            .collect::<Vec<&str>>()
            .join(separator);
        return IntrinsicValue::Resolved(joined);
    }

    IntrinsicValue::Unresolved {
        function: "Fn::Join".to_string(),
        args: vec![args.clone()],
        partial: resolved,
    }
}

fn resolve_sub(args: &Value, env: &Environment) -> IntrinsicValue {
    // Only the plain-string form is modeled; the [template, {vars}] form
    // carries locally-scoped bindings and degrades to Unresolved.
    let template = match args.as_str() {
        Some(t) => t,
        None => return IntrinsicValue::unresolved("Fn::Sub", vec![args.clone()]),
    };

    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(end) => end,
            None => return IntrinsicValue::unresolved("Fn::Sub", vec![args.clone()]),
        };
        let name = &after[..end];
        if let Some(stripped) = name.strip_prefix('!') {
            // ${!literal} is an escape for a literal ${}
            output.push_str("${");
            output.push_str(stripped);
            output.push('}');
        } else {
            match env.lookup(name) {
                Some(value) => output.push_str(value),
                None => return IntrinsicValue::unresolved("Fn::Sub", vec![args.clone()]),
            }
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    IntrinsicValue::Resolved(output)
}

#[cfg(test)]
#[path = "intrinsics_tests.rs"]
mod intrinsics_tests;
