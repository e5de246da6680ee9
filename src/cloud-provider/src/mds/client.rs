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

use crate::errors::{self, CredentialsError};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const DETECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A client for the GCE Metadata Service (MDS).
///
/// Clones share the result of the [on_gce][Client::on_gce] check.
#[derive(Clone, Debug)]
pub struct Client {
    endpoint: String,
    inner: ReqwestClient,
    /// True if the endpoint was NOT overridden by env var or constructor arg.
    is_default_endpoint: bool,
    on_gce: Arc<OnceCell<bool>>,
}

impl Client {
    /// Creates a new client for the Metadata Service.
    ///
    /// The `GCE_METADATA_HOST` environment variable takes precedence over
    /// `endpoint_override`. Without either, the client uses
    /// `http://metadata.google.internal`.
    pub fn new(endpoint_override: Option<String>) -> Self {
        let (endpoint, is_default_endpoint) = Self::resolve_endpoint(endpoint_override);
        let endpoint = endpoint.trim_end_matches('/').to_string();

        Self {
            endpoint,
            inner: ReqwestClient::new(),
            is_default_endpoint,
            on_gce: Arc::new(OnceCell::new()),
        }
    }

    fn resolve_endpoint(endpoint_override: Option<String>) -> (String, bool) {
        if let Ok(host) = std::env::var(super::GCE_METADATA_HOST_ENV_VAR) {
            (format!("http://{host}"), false)
        } else if let Some(e) = endpoint_override {
            (e, false)
        } else {
            (super::METADATA_ROOT.to_string(), true)
        }
    }

    /// Returns the resolved endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        self.inner
            .get(url)
            .header(super::METADATA_FLAVOR, super::METADATA_FLAVOR_VALUE)
    }

    /// Returns true if the process runs on Google Cloud.
    ///
    /// The result is computed once per client (and its clones). Setting
    /// `GCE_METADATA_HOST` forces a positive result.
    pub async fn on_gce(&self) -> bool {
        *self.on_gce.get_or_init(|| self.detect()).await
    }

    async fn detect(&self) -> bool {
        if std::env::var_os(super::GCE_METADATA_HOST_ENV_VAR).is_some() {
            return true;
        }
        tokio::time::timeout(DETECTION_TIMEOUT, self.detect_race())
            .await
            .unwrap_or(false)
    }

    async fn detect_race(&self) -> bool {
        let mut http = std::pin::pin!(self.check_http());
        if !self.is_default_endpoint {
            // The DNS check is meaningless for a custom endpoint.
            return http.await;
        }
        let mut dns = std::pin::pin!(check_dns());
        let (first, http_pending) = tokio::select! {
            r = &mut http => (r, false),
            r = &mut dns => (r, true),
        };
        if first || !system_info_suggests_gce() {
            return first;
        }
        if http_pending { http.await } else { dns.await }
    }

    async fn check_http(&self) -> bool {
        match self.inner.get(format!("{}/", self.endpoint)).send().await {
            Ok(response) => response
                .headers()
                .get(super::METADATA_FLAVOR)
                .is_some_and(|v| v == super::METADATA_FLAVOR_VALUE),
            Err(e) => {
                tracing::debug!("metadata server check failed: {e}");
                false
            }
        }
    }

    /// Fetches the project id of the current instance.
    pub async fn project_id(&self) -> crate::Result<String> {
        self.get_trimmed("project/project-id", "failed to fetch project id")
            .await
    }

    /// Fetches the zone of the current instance, e.g. `us-central1-a`.
    pub async fn zone(&self) -> crate::Result<String> {
        let zone = self
            .get_trimmed("instance/zone", "failed to fetch zone")
            .await?;
        // The service returns `projects/<number>/zones/<zone>`.
        let zone = zone.rsplit('/').next().unwrap_or_default().to_string();
        if zone.is_empty() {
            return Err(errors::non_retryable_from_str(
                "the metadata server returned an empty zone",
            ));
        }
        Ok(zone)
    }

    async fn get_trimmed(&self, suffix: &str, error_message: &str) -> crate::Result<String> {
        let path = format!("{}/{suffix}", super::METADATA_PREFIX);
        let response = self
            .get(&path)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        let response = Self::check_response_status(response, error_message).await?;
        let value = response
            .text()
            .await
            .map_err(|e| CredentialsError::from_source(!e.is_decode(), e))?;
        Ok(value.trim().to_string())
    }

    async fn check_response_status(
        response: reqwest::Response,
        error_message: &str,
    ) -> crate::Result<reqwest::Response> {
        if !response.status().is_success() {
            Err(errors::from_http_response(response, error_message).await)
        } else {
            Ok(response)
        }
    }
}

async fn check_dns() -> bool {
    match tokio::net::lookup_host((super::METADATA_HOST_NAME, 80)).await {
        Ok(mut addrs) => {
            let want = IpAddr::V4(Ipv4Addr::from(super::METADATA_IP));
            addrs.any(|a| a.ip() == want)
        }
        Err(_) => false,
    }
}

fn system_info_suggests_gce() -> bool {
    if !cfg!(target_os = "linux") {
        return false;
    }
    std::fs::read_to_string(super::DMI_PRODUCT_NAME)
        .map(|name| {
            let name = name.trim();
            name == "Google" || name == "Google Compute Engine"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serial_test::{parallel, serial};

    #[tokio::test]
    #[parallel]
    async fn project_id_success() {
        let server = Server::run();
        let client = Client::new(Some(format!("http://{}", server.addr())));
        server.expect(
            Expectation::matching(all_of![
                request::method("GET"),
                request::path("/computeMetadata/v1/project/project-id"),
                request::headers(contains(("metadata-flavor", "Google"))),
            ])
            .respond_with(status_code(200).body("my-project\n")),
        );

        let project = client.project_id().await.unwrap();
        assert_eq!(project, "my-project");
    }

    #[tokio::test]
    #[parallel]
    async fn zone_success() {
        let server = Server::run();
        let client = Client::new(Some(format!("http://{}", server.addr())));
        server.expect(
            Expectation::matching(request::path("/computeMetadata/v1/instance/zone"))
                .respond_with(status_code(200).body("projects/123456/zones/us-central1-b")),
        );

        let zone = client.zone().await.unwrap();
        assert_eq!(zone, "us-central1-b");
    }

    #[tokio::test]
    #[parallel]
    async fn zone_failure() {
        let server = Server::run();
        let client = Client::new(Some(format!("http://{}", server.addr())));
        server.expect(
            Expectation::matching(request::path("/computeMetadata/v1/instance/zone"))
                .respond_with(status_code(404).body("Not Found")),
        );

        let err = client.zone().await.unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("failed to fetch zone"), "{err}");
    }

    #[tokio::test]
    #[parallel]
    async fn on_gce_positive_is_memoized() {
        let server = Server::run();
        let client = Client::new(Some(format!("http://{}", server.addr())));
        server.expect(
            Expectation::matching(all_of![request::method("GET"), request::path("/")])
                .times(1)
                .respond_with(status_code(200).insert_header("Metadata-Flavor", "Google")),
        );

        assert!(client.on_gce().await);
        assert!(client.clone().on_gce().await);
    }

    #[tokio::test]
    #[parallel]
    async fn on_gce_requires_flavor_header() {
        let server = Server::run();
        let client = Client::new(Some(format!("http://{}", server.addr())));
        server.expect(
            Expectation::matching(request::path("/")).respond_with(status_code(200)),
        );

        assert!(!client.on_gce().await);
    }

    #[tokio::test]
    #[parallel]
    async fn on_gce_unreachable() {
        // Nothing listens on the discard port.
        let client = Client::new(Some("http://127.0.0.1:9".to_string()));
        assert!(!client.on_gce().await);
    }

    #[tokio::test]
    #[serial]
    async fn on_gce_env_var() {
        let _e = ScopedEnv::set(crate::mds::GCE_METADATA_HOST_ENV_VAR, "127.0.0.1:9");
        let client = Client::new(None);
        assert!(client.on_gce().await);
    }

    #[test]
    #[parallel]
    fn resolve_endpoint_default() {
        let client = Client::new(None);
        assert_eq!(client.endpoint(), "http://metadata.google.internal");
        assert!(client.is_default_endpoint);
    }

    #[test]
    #[parallel]
    fn resolve_endpoint_override() {
        let client = Client::new(Some("http://custom.endpoint/".to_string()));
        assert_eq!(client.endpoint(), "http://custom.endpoint");
        assert!(!client.is_default_endpoint);
    }

    #[test]
    #[serial]
    fn resolve_endpoint_env_var_priority() {
        let _e = ScopedEnv::set(crate::mds::GCE_METADATA_HOST_ENV_VAR, "env.priority.host");
        let client = Client::new(Some("http://custom.endpoint".to_string()));
        assert_eq!(client.endpoint(), "http://env.priority.host");
    }
}
