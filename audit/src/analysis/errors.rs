// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error parsing incoming JSON context {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Error parsing incoming YAML context {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Formatting error when writing {0}")]
    FormatError(#[from] std::fmt::Error),
    #[error("Template was malformed at the top level `{0}`")]
    MalformedTemplate(String),
    #[error("Could not convert incoming value `{0}`")]
    IncompatibleValue(String),
}
