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

//! Compute Engine cloud provider for the Persistent Disk CSI driver.
//!
//! This crate provisions an authenticated handle to the [Compute Engine API].
//! At startup the driver calls [CloudProvider::new] (or configures a
//! [Builder][provider::Builder]), which:
//!
//! * loads the optional cloud provider configuration file,
//! * selects a token source: an operator-supplied token service, the
//!   [Application Default Credentials], or the instance metadata service,
//! * waits until the token source produces a token,
//! * creates the stable (`v1`) and preview (`alpha`) API clients, and
//! * resolves the project and zone, from the configuration file or the
//!   metadata service.
//!
//! Errors returned by the API can be classified with [is_gce_not_found_error]
//! and [is_gce_invalid_error].
//!
//! [Compute Engine API]: https://cloud.google.com/compute/docs/reference/rest/v1
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

pub mod api_error;
pub mod build_errors;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod identity;
pub mod mds;
pub mod provider;
pub mod service;

pub(crate) mod token;
pub(crate) mod token_cache;
pub(crate) mod warmup;

/// A `Result` alias where the `Err` case is
/// `google_cloud_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

pub use api_error::{ApiError, is_gce_error, is_gce_invalid_error, is_gce_not_found_error};
pub use build_errors::Error;
pub use identity::ResolvedIdentity;
pub use provider::CloudProvider;
pub use service::{ApiVersion, ServiceClient, ServiceError};
