// Copyright 2025 Google LLC
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

use crate::build_errors::Error;
use crate::config::read_config;
use crate::credentials::build_token_source;
use crate::identity::{ResolvedIdentity, resolve_identity};
use crate::service::{Endpoints, ServiceClient, ServiceError, build_services};
use crate::warmup::{WARMUP_INTERVAL, WARMUP_TIMEOUT, warm_up};
use google_cloud_auth::credentials::Credentials;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

type ZonesCache = Mutex<HashMap<String, Arc<OnceCell<Vec<String>>>>>;

/// An authenticated handle to the compute API.
///
/// # Example
/// ```no_run
/// # use gce_cloud_provider::CloudProvider;
/// # tokio_test::block_on(async {
/// let provider = CloudProvider::builder("v1.13.0")
///     .with_config_path("/etc/gce.conf")
///     .build()
///     .await?;
/// println!("running in {}/{}", provider.project(), provider.zone());
/// let zones = provider.list_zones("us-central1").await?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug)]
pub struct CloudProvider {
    service: ServiceClient,
    preview_service: ServiceClient,
    identity: ResolvedIdentity,
    zones_cache: ZonesCache,
}

impl CloudProvider {
    /// Returns a builder for a provider stamped with `vendor_version`.
    pub fn builder<V: Into<String>>(vendor_version: V) -> Builder {
        Builder::new(vendor_version)
    }

    /// Creates a provider with the default settings, reading the
    /// configuration file at `config_path`. An empty path means no
    /// configuration file.
    pub async fn new<V, P>(vendor_version: V, config_path: P) -> Result<Self, Error>
    where
        V: Into<String>,
        P: Into<String>,
    {
        Builder::new(vendor_version)
            .with_config_path(config_path)
            .build()
            .await
    }

    /// The client for the stable (`v1`) API.
    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    /// The client for the preview (`alpha`) API.
    pub fn preview_service(&self) -> &ServiceClient {
        &self.preview_service
    }

    /// The project used by the driver.
    pub fn project(&self) -> &str {
        &self.identity.project_id
    }

    /// The zone used by the driver.
    pub fn zone(&self) -> &str {
        &self.identity.zone
    }

    /// The project and zone used by the driver.
    pub fn identity(&self) -> &ResolvedIdentity {
        &self.identity
    }

    /// Returns the names of the zones in `region`.
    ///
    /// Successful results are cached for the lifetime of the provider.
    /// Concurrent calls for the same region share a single lookup.
    pub async fn list_zones(&self, region: &str) -> Result<Vec<String>, ServiceError> {
        let cell = {
            let mut cache = self
                .zones_cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cache.entry(region.to_string()).or_default().clone()
        };
        let zones = cell.get_or_try_init(|| self.fetch_zones(region)).await?;
        Ok(zones.clone())
    }

    async fn fetch_zones(&self, region: &str) -> Result<Vec<String>, ServiceError> {
        let path = format!("projects/{}/zones", self.identity.project_id);
        let filter = format!("region eq .*{region}$");
        let mut zones = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut query = vec![("filter", filter.as_str())];
            if !page_token.is_empty() {
                query.push(("pageToken", page_token.as_str()));
            }
            let page = self.service.get::<ZoneList>(&path, &query).await?;
            zones.extend(page.items.into_iter().map(|z| z.name));
            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }
        tracing::debug!("zones in region {region}: {zones:?}");
        Ok(zones)
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneList {
    #[serde(default)]
    items: Vec<ZoneItem>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(serde::Deserialize)]
struct ZoneItem {
    name: String,
}

/// Configures and creates a [CloudProvider].
///
/// Construction runs these steps, failing on the first error:
/// 1. Read the configuration file, if any.
/// 2. Select the token source.
/// 3. Wait until the token source produces a token.
/// 4. Create the stable and preview API clients.
/// 5. Resolve the project and zone.
#[derive(Debug)]
pub struct Builder {
    vendor_version: String,
    config_path: String,
    metadata_endpoint: Option<String>,
    endpoints: Endpoints,
    cancel: CancellationToken,
    warmup_interval: Duration,
    warmup_timeout: Duration,
}

impl Builder {
    fn new<V: Into<String>>(vendor_version: V) -> Self {
        Self {
            vendor_version: vendor_version.into(),
            config_path: String::new(),
            metadata_endpoint: None,
            endpoints: Endpoints::default(),
            cancel: CancellationToken::new(),
            warmup_interval: WARMUP_INTERVAL,
            warmup_timeout: WARMUP_TIMEOUT,
        }
    }

    /// Reads the configuration file at `path`. An empty path (the default)
    /// means no configuration file.
    pub fn with_config_path<P: Into<String>>(mut self, path: P) -> Self {
        self.config_path = path.into();
        self
    }

    /// Overrides the metadata server endpoint.
    ///
    /// The `GCE_METADATA_HOST` environment variable takes precedence.
    pub fn with_metadata_endpoint<E: Into<String>>(mut self, endpoint: E) -> Self {
        self.metadata_endpoint = Some(endpoint.into());
        self
    }

    /// Overrides the stable API endpoint.
    pub fn with_compute_endpoint<E: Into<String>>(mut self, endpoint: E) -> Self {
        self.endpoints.stable = endpoint.into();
        self
    }

    /// Overrides the preview API endpoint.
    pub fn with_preview_endpoint<E: Into<String>>(mut self, endpoint: E) -> Self {
        self.endpoints.preview = endpoint.into();
        self
    }

    /// Aborts construction when `cancel` is cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Changes the time between token attempts during startup (default 5s).
    pub fn with_warmup_interval(mut self, interval: Duration) -> Self {
        self.warmup_interval = interval;
        self
    }

    /// Changes how long to wait for the first token during startup
    /// (default 30s).
    pub fn with_warmup_timeout(mut self, timeout: Duration) -> Self {
        self.warmup_timeout = timeout;
        self
    }

    /// Creates the provider.
    pub async fn build(self) -> Result<CloudProvider, Error> {
        let config = read_config(&self.config_path)?;
        let metadata = crate::mds::Client::new(self.metadata_endpoint);

        let source = build_token_source(config.as_ref(), &metadata).await?;
        tracing::info!("using the {} token source", source.kind());

        let credentials = Credentials::from(source);
        warm_up(
            &credentials,
            self.warmup_interval,
            self.warmup_timeout,
            &self.cancel,
        )
        .await?;

        let (service, preview_service) =
            build_services(&self.vendor_version, credentials, &self.endpoints)?;

        let identity = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::cancelled()),
            r = resolve_identity(config.as_ref(), &metadata) => r?,
        };
        tracing::info!(
            "cloud provider ready for project {} in zone {}",
            identity.project_id,
            identity.zone
        );

        Ok(CloudProvider {
            service,
            preview_service,
            identity,
            zones_cache: ZonesCache::default(),
        })
    }
}
