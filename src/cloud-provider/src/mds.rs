// Copyright 2026 Google LLC
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

//! A client for the Compute Engine [Metadata Service].
//!
//! The cloud provider uses the metadata service to detect whether it runs on
//! Google Cloud, and to discover the project and zone when the configuration
//! file does not provide them. Tokens for the instance service account come
//! from the [google_cloud_auth] metadata credentials.
//!
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

pub(crate) mod client;

pub use client::Client;

pub(crate) const METADATA_PREFIX: &str = "/computeMetadata/v1";
pub(crate) const METADATA_FLAVOR_VALUE: &str = "Google";
pub(crate) const METADATA_FLAVOR: &str = "metadata-flavor";
pub(crate) const METADATA_ROOT: &str = "http://metadata.google.internal";
pub(crate) const METADATA_HOST_NAME: &str = "metadata.google.internal";
pub(crate) const METADATA_IP: [u8; 4] = [169, 254, 169, 254];
pub(crate) const GCE_METADATA_HOST_ENV_VAR: &str = "GCE_METADATA_HOST";
// Linux exposes the DMI product name, it is "Google" or "Google Compute
// Engine" on GCE VMs.
pub(crate) const DMI_PRODUCT_NAME: &str = "/sys/class/dmi/id/product_name";
