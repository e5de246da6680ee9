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

//! Token sources used to authenticate the compute API clients.
//!
//! The cloud provider selects exactly one [TokenSource] at startup:
//!
//! 1. If the configuration file sets `token-url` (to anything other than the
//!    literal `nil`), use an [alternate token source][alternate] that
//!    exchanges `token-body` at that URL.
//! 2. Otherwise use [Application Default Credentials], scoped to the cloud
//!    platform and compute scopes.
//! 3. But, if `GOOGLE_APPLICATION_CREDENTIALS` is not set and the process
//!    runs on Google Cloud, use the [metadata service credentials] with an
//!    explicit cloud platform scope. ADC would also find the metadata service
//!    in this case, but the tokens it returns are not guaranteed to carry the
//!    requested scopes.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials
//! [metadata service credentials]: google_cloud_auth::credentials::mds

pub mod alternate;

use crate::build_errors::Error;
use crate::config::ConfigFile;
use google_cloud_auth::credentials::{Builder as DefaultCredentialsBuilder, Credentials, mds};

/// The OAuth2 scope granting access to all Google Cloud APIs.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// The OAuth2 scope granting access to the compute API.
pub const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";

/// The environment variable naming an ADC credentials file.
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

// Some configuration files spell "no token URL" this way.
const NIL_TOKEN_URL: &str = "nil";

/// The token source selected for a cloud provider.
#[derive(Clone, Debug)]
pub enum TokenSource {
    /// Tokens exchanged at an operator-supplied URL.
    Alternate(alternate::AltCredentials),
    /// Application Default Credentials.
    DefaultCredentials(Credentials),
    /// Metadata service credentials with an explicit cloud platform scope.
    MetadataOverride(Credentials),
}

impl TokenSource {
    /// A short name for the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alternate(_) => "alternate",
            Self::DefaultCredentials(_) => "default-credentials",
            Self::MetadataOverride(_) => "metadata-override",
        }
    }
}

impl From<TokenSource> for Credentials {
    fn from(source: TokenSource) -> Self {
        match source {
            TokenSource::Alternate(c) => Credentials::from(c),
            TokenSource::DefaultCredentials(c) | TokenSource::MetadataOverride(c) => c,
        }
    }
}

/// Selects the token source for `config`.
///
/// No token is fetched here. Errors building Application Default Credentials
/// are reported as [Error::is_credentials_unavailable], unless the metadata
/// service credentials replace them.
pub async fn build_token_source(
    config: Option<&ConfigFile>,
    metadata: &crate::mds::Client,
) -> Result<TokenSource, Error> {
    if let Some(global) = config.map(|c| &c.global) {
        if !global.token_url.is_empty() && global.token_url != NIL_TOKEN_URL {
            // The token service is called with the instance default scopes.
            let caller = metadata_credentials(metadata, &[])?;
            let source =
                alternate::AltCredentials::new(&global.token_url, &global.token_body, caller);
            tracing::debug!("using alternate token source {source:?}");
            return Ok(TokenSource::Alternate(source));
        }
    }

    let default_credentials = DefaultCredentialsBuilder::default()
        .with_scopes([CLOUD_PLATFORM_SCOPE, COMPUTE_SCOPE])
        .build();

    let on_gce = metadata.on_gce().await;
    tracing::debug!("metadata info: on GCE: {on_gce}");

    match std::env::var_os(GOOGLE_APPLICATION_CREDENTIALS) {
        Some(path) => {
            tracing::debug!(
                "{GOOGLE_APPLICATION_CREDENTIALS} env var set {}",
                path.to_string_lossy()
            );
        }
        None => {
            tracing::warn!("{GOOGLE_APPLICATION_CREDENTIALS} env var not set");
            if on_gce {
                if let Err(e) = &default_credentials {
                    tracing::debug!("ignoring default credentials error: {e}");
                }
                let source = metadata_credentials(metadata, &[CLOUD_PLATFORM_SCOPE])?;
                tracing::debug!("using metadata token source {source:?}");
                return Ok(TokenSource::MetadataOverride(source));
            }
        }
    }

    let source = default_credentials.map_err(Error::credentials_unavailable)?;
    tracing::debug!("using default credentials {source:?}");
    Ok(TokenSource::DefaultCredentials(source))
}

// Without `scopes` the metadata service uses the scopes configured for the
// instance.
fn metadata_credentials(
    metadata: &crate::mds::Client,
    scopes: &[&str],
) -> Result<Credentials, Error> {
    let builder = mds::Builder::default().with_endpoint(metadata.endpoint());
    let builder = if scopes.is_empty() {
        builder
    } else {
        builder.with_scopes(scopes.iter().copied())
    };
    builder.build().map_err(Error::credentials_unavailable)
}
