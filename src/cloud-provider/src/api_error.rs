// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The error payload returned by the compute API, and helpers to classify it.

use crate::service::ServiceError;
use serde::{Deserialize, Serialize};

const NOT_FOUND_REASON: &str = "notFound";
const INVALID_REASON: &str = "invalid";

/// An error returned by the compute API.
///
/// The service reports errors as:
///
/// ```json
/// {"error": {"code": 404, "message": "...", "errors": [
///     {"domain": "global", "reason": "notFound", "message": "..."}]}}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ApiError {
    /// The HTTP status code.
    pub code: u16,
    /// A developer-facing description of the error.
    pub message: String,
    /// The individual errors, each with a machine-readable `reason`.
    pub errors: Vec<ErrorItem>,
}

/// One of the errors in an [ApiError].
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ErrorItem {
    pub domain: String,
    pub reason: String,
    pub message: String,
}

impl ApiError {
    /// Returns true if any of the individual errors has the given `reason`.
    pub fn has_reason(&self, reason: &str) -> bool {
        self.errors.iter().any(|e| e.reason == reason)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compute API error {}: {}", self.code, self.message)?;
        for e in &self.errors {
            write!(f, ", {}/{}: {}", e.domain, e.reason, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ApiError,
}

impl TryFrom<&bytes::Bytes> for ApiError {
    type Error = serde_json::Error;

    fn try_from(value: &bytes::Bytes) -> Result<Self, Self::Error> {
        serde_json::from_slice::<ErrorWrapper>(value).map(|w| w.error)
    }
}

/// Returns true if `err`, or any error in its source chain, is an
/// [ApiError] with a sub-error whose reason is `reason`.
pub fn is_gce_error(err: &(dyn std::error::Error + 'static), reason: &str) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let api = e.downcast_ref::<ApiError>().or_else(|| match e.downcast_ref::<ServiceError>() {
            Some(ServiceError::Api(api)) => Some(api),
            _ => None,
        });
        if api.is_some_and(|a| a.has_reason(reason)) {
            return true;
        }
        current = e.source();
    }
    false
}

/// Returns true if `err` is a compute API "not found" error.
pub fn is_gce_not_found_error(err: &(dyn std::error::Error + 'static)) -> bool {
    is_gce_error(err, NOT_FOUND_REASON)
}

/// Returns true if `err` is a compute API "invalid" error.
pub fn is_gce_invalid_error(err: &(dyn std::error::Error + 'static)) -> bool {
    is_gce_error(err, INVALID_REASON)
}
