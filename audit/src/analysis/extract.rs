// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::convert::TryFrom;
use std::fmt::Formatter;

use indexmap::map::IndexMap;
use lazy_static::lazy_static;
use log::{debug, trace, warn};
use serde::Serialize;

use crate::analysis::errors::Error;
use crate::analysis::report::StructuralError;
use crate::analysis::values::{type_info, Value};
use crate::analysis::Result;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Path(pub(crate) String);

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Path {
    pub fn root() -> Self {
        Path("".to_string())
    }

    pub(crate) fn extend_str(&self, part: &str) -> Path {
        if self.0.is_empty() {
            return Path(part.to_string());
        }
        let mut copy = self.0.clone();
        copy.push('/');
        copy.push_str(part);
        Path(copy)
    }

    pub(crate) fn extend_usize(&self, part: usize) -> Path {
        self.extend_str(part.to_string().as_str())
    }
}

impl TryFrom<&[&str]> for Path {
    type Error = Error;

    fn try_from(value: &[&str]) -> Result<Self> {
        Ok(value
            .iter()
            .fold(Path::root(), |path, part| path.extend_str(part)))
    }
}

/// Where a policy document was found: the resource's logical name and the
/// field path inside that resource. The path always matches one of the
/// catalog paths declared for the resource's type tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PolicyLocation {
    pub resource: String,
    pub path: Path,
}

impl std::fmt::Display for PolicyLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}/{}", self.resource, self.path))
    }
}

/// One policy-bearing resource type: which property paths hold policy
/// documents and, when the service enforces one, the serialized-size limit
/// for documents at those paths.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub type_tag: &'static str,
    pub paths: Vec<&'static [&'static str]>,
    pub size_limit: Option<usize>,
}

/// Version tag of the built-in catalog table; bumped whenever entries are
/// added or their field paths change.
pub const BUILTIN_CATALOG_VERSION: &str = "2025-11-01";

/// Static table of resource type tag to policy field paths. The built-in
/// table covers the common policy-bearing types; embedders extend it with
/// `with_entry` for types this crate does not know about.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

lazy_static! {
    static ref BUILTIN_ENTRIES: Vec<CatalogEntry> = vec![
        CatalogEntry {
            type_tag: "AWS::S3::BucketPolicy",
            paths: vec![&["Properties", "PolicyDocument"]],
            size_limit: None,
        },
        CatalogEntry {
            type_tag: "AWS::ECR::Repository",
            paths: vec![&["Properties", "RepositoryPolicyText"]],
            size_limit: None,
        },
        CatalogEntry {
            type_tag: "AWS::SQS::QueuePolicy",
            paths: vec![&["Properties", "PolicyDocument"]],
            size_limit: None,
        },
        CatalogEntry {
            type_tag: "AWS::SNS::TopicPolicy",
            paths: vec![&["Properties", "PolicyDocument"]],
            size_limit: None,
        },
        CatalogEntry {
            type_tag: "AWS::KMS::Key",
            paths: vec![&["Properties", "KeyPolicy"]],
            size_limit: None,
        },
        CatalogEntry {
            type_tag: "AWS::SecretsManager::ResourcePolicy",
            paths: vec![&["Properties", "ResourcePolicy"]],
            size_limit: None,
        },
        CatalogEntry {
            type_tag: "AWS::IAM::Role",
            paths: vec![&["Properties", "AssumeRolePolicyDocument"]],
            // Role trust policy JSON text cannot be longer than 2048
            // characters
            size_limit: Some(2048),
        },
    ];
}

impl Catalog {
    pub fn builtin() -> Self {
        Catalog {
            entries: BUILTIN_ENTRIES.clone(),
        }
    }

    pub fn empty() -> Self {
        Catalog::default()
    }

    pub fn with_entry(mut self, entry: CatalogEntry) -> Self {
        self.entries.push(entry);
        self
    }

    fn entry_for(&self, type_tag: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.type_tag == type_tag)
    }
}

/// A policy document as extracted: always a mapping by the time it leaves
/// this module, whether the template embedded it natively or as a JSON
/// string. `size_limit` is carried over from the catalog entry that
/// declared the field.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedDocument {
    pub location: PolicyLocation,
    pub document: IndexMap<String, Value>,
    pub size_limit: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Extracted {
    pub documents: Vec<ExtractedDocument>,
    pub errors: Vec<StructuralError>,
}

/// Walks every resource in the template and pulls out each policy document
/// the catalog knows a field path for. Resources whose type has no catalog
/// entry are expected and skipped silently; a declared-but-absent field is
/// skipped too. A present field of the wrong type, or an embedded JSON
/// string that does not parse, is a structural error for that location and
/// the walk continues.
pub fn extract_policies(template: &Value, catalog: &Catalog) -> Result<Extracted> {
    debug!("Entered extract_policies");

    let root = match template.as_map() {
        Some(root) => root,
        None => {
            return Err(Error::MalformedTemplate(format!(
                "Template root must be a mapping, found {}",
                type_info(template)
            )))
        }
    };
    let resources = match root.get("Resources").and_then(Value::as_map) {
        Some(resources) => resources,
        None => {
            return Err(Error::MalformedTemplate(
                "Template does not contain a [Resources] section".to_string(),
            ))
        }
    };

    let mut extracted = Extracted::default();
    for (logical_id, resource) in resources {
        let resource_map = match resource.as_map() {
            Some(map) => map,
            None => {
                warn!("Resource entry {} is not a mapping, skipping", logical_id);
                continue;
            }
        };
        let type_tag = match resource_map.get("Type").and_then(Value::as_str) {
            Some(tag) => tag,
            None => {
                warn!("Resource {} carries no Type tag, skipping", logical_id);
                continue;
            }
        };
        let entry = match catalog.entry_for(type_tag) {
            Some(entry) => entry,
            // not every resource carries a policy
            None => continue,
        };
        trace!("Resource {} matched catalog entry {}", logical_id, type_tag);

        for field_path in &entry.paths {
            let value = match value_at(logical_id, resource_map, field_path) {
                Some(value) => value,
                None => continue,
            };
            let location = PolicyLocation {
                resource: logical_id.clone(),
                path: Path::try_from(*field_path)?,
            };
            match decode_document(value) {
                Ok(document) => extracted.documents.push(ExtractedDocument {
                    location,
                    document,
                    size_limit: entry.size_limit,
                }),
                Err(reason) => extracted.errors.push(StructuralError { location, reason }),
            }
        }
    }

    debug!(
        "Extracted {} policy documents, {} structural errors",
        extracted.documents.len(),
        extracted.errors.len()
    );
    Ok(extracted)
}

fn value_at<'v>(
    logical_id: &str,
    map: &'v IndexMap<String, Value>,
    path: &[&str],
) -> Option<&'v Value> {
    let mut current = map;
    let (last, intermediate) = path.split_last()?;
    for part in intermediate {
        let next = current.get(*part)?;
        current = match next.as_map() {
            Some(map) => map,
            None => {
                warn!(
                    "Resource {} field {} is {} rather than a mapping, skipping",
                    logical_id,
                    part,
                    type_info(next)
                );
                return None;
            }
        };
    }
    current.get(*last)
}

/// Interprets an extracted policy field. Native mappings pass through;
/// strings are decoded as embedded JSON so the rest of the pipeline never
/// learns which encoding the template used.
fn decode_document(value: &Value) -> std::result::Result<IndexMap<String, Value>, String> {
    match value {
        Value::Map(map) => Ok(map.clone()),
        Value::String(embedded) => {
            let parsed: serde_json::Value = serde_json::from_str(embedded).map_err(|err| {
                format!("Embedded policy string is not valid JSON: {}", err)
            })?;
            match Value::try_from(&parsed) {
                Ok(Value::Map(map)) => Ok(map),
                Ok(other) => Err(format!(
                    "Embedded policy string must decode to a mapping, found {}",
                    type_info(&other)
                )),
                Err(err) => Err(err.to_string()),
            }
        }
        other => Err(format!(
            "Policy field must be a mapping or an embedded JSON string, found {}",
            type_info(other)
        )),
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod extract_tests;
