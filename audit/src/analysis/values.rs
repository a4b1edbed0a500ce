// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::convert::TryFrom;

use indexmap::map::IndexMap;
use serde::Serialize;

use crate::analysis::errors::Error;

/// Generic template value as it arrives from the deserializer. Mapping
/// key order is preserved end to end, which keeps report output stable
/// across runs of the same template.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub(crate) fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

pub(crate) fn type_info(type_: &Value) -> &'static str {
    match type_ {
        Value::Null => "null",
        Value::Bool(_b) => "bool",
        Value::Float(_f) => "float",
        Value::String(_s) => "string",
        Value::Int(_i) => "int",
        Value::List(_v) => "array",
        Value::Map(_mp) => "map",
    }
}

pub fn make_linked_hashmap<'a, I>(values: I) -> IndexMap<String, Value>
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    values.into_iter().map(|(s, v)| (s.to_owned(), v)).collect()
}

impl<'a> TryFrom<&'a serde_json::Value> for Value {
    type Error = Error;

    fn try_from(value: &'a serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(Value::String(s.to_owned())),
            serde_json::Value::Number(num) => {
                if num.is_i64() {
                    Ok(Value::Int(num.as_i64().unwrap()))
                } else if num.is_u64() {
                    //
                    // Values above i64::MAX lose precision here. TODO fix this
                    //
                    Ok(Value::Int(num.as_u64().unwrap() as i64))
                } else {
                    Ok(Value::Float(num.as_f64().unwrap()))
                }
            }
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Array(v) => {
                let mut result: Vec<Value> = Vec::with_capacity(v.len());
                for each in v {
                    result.push(Value::try_from(each)?)
                }
                Ok(Value::List(result))
            }
            serde_json::Value::Object(map) => {
                let mut result = IndexMap::with_capacity(map.len());
                for (key, value) in map.iter() {
                    result.insert(key.to_owned(), Value::try_from(value)?);
                }
                Ok(Value::Map(result))
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Value::try_from(&value)
    }
}

impl<'a> TryFrom<&'a serde_yaml::Value> for Value {
    type Error = Error;

    fn try_from(value: &'a serde_yaml::Value) -> Result<Self, Self::Error> {
        match value {
            serde_yaml::Value::Null => Ok(Value::Null),
            serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_yaml::Value::String(s) => Ok(Value::String(s.to_owned())),
            serde_yaml::Value::Number(num) => {
                if num.is_i64() {
                    Ok(Value::Int(num.as_i64().unwrap()))
                } else if num.is_u64() {
                    Ok(Value::Int(num.as_u64().unwrap() as i64))
                } else {
                    Ok(Value::Float(num.as_f64().unwrap()))
                }
            }
            serde_yaml::Value::Sequence(seq) => {
                let mut result: Vec<Value> = Vec::with_capacity(seq.len());
                for each in seq {
                    result.push(Value::try_from(each)?)
                }
                Ok(Value::List(result))
            }
            serde_yaml::Value::Mapping(map) => {
                let mut result = IndexMap::with_capacity(map.len());
                for (key, value) in map.iter() {
                    let key = match key {
                        serde_yaml::Value::String(s) => s.to_owned(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        serde_yaml::Value::Number(n) => n.to_string(),
                        _ => {
                            return Err(Error::IncompatibleValue(format!(
                                "Mapping keys must be scalar, found {:?}",
                                key
                            )))
                        }
                    };
                    result.insert(key, Value::try_from(value)?);
                }
                Ok(Value::Map(result))
            }
            //
            // CloudFormation YAML short forms (!Ref x, !Join [..]) arrive as
            // tagged values. They are re-expanded to the long form mapping so
            // the rest of the pipeline sees a single encoding.
            //
            serde_yaml::Value::Tagged(tagged) => {
                let name = tagged.tag.to_string();
                let name = name.trim_start_matches('!');
                let key = match name {
                    "Ref" | "Condition" => name.to_string(),
                    short => format!("Fn::{}", short),
                };
                let mut map = IndexMap::with_capacity(1);
                map.insert(key, Value::try_from(&tagged.value)?);
                Ok(Value::Map(map))
            }
        }
    }
}

impl TryFrom<serde_yaml::Value> for Value {
    type Error = Error;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        Value::try_from(&value)
    }
}

#[cfg(test)]
#[path = "values_tests.rs"]
mod values_tests;
