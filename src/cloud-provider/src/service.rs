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

//! Authenticated clients for the compute API.

use crate::api_error::ApiError;
use crate::build_errors::Error as BuildError;
use crate::errors::{self, CredentialsError};
use google_cloud_auth::credentials::{CacheableResource, Credentials};
use http::Extensions;
use http::header::{HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};

/// The default endpoint for the stable (`v1`) compute API.
pub const COMPUTE_V1_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1/";
/// The default endpoint for the `beta` compute API.
pub const COMPUTE_BETA_ENDPOINT: &str = "https://compute.googleapis.com/compute/beta/";
/// The default endpoint for the preview (`alpha`) compute API.
pub const COMPUTE_ALPHA_ENDPOINT: &str = "https://compute.googleapis.com/compute/alpha/";

/// The version of the API surface used by a [ServiceClient].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiVersion {
    /// The `v1` API.
    Stable,
    /// The `alpha` API.
    Preview,
}

impl ApiVersion {
    fn surface(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Preview => "preview",
        }
    }
}

/// An error making a request with a [ServiceClient].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ServiceError {
    /// No token was available to authenticate the request.
    #[error("cannot authenticate the request: {0}")]
    Authentication(#[source] CredentialsError),
    /// The request could not be sent, or the response could not be received.
    #[error("cannot send the request: {0}")]
    Transport(#[source] reqwest::Error),
    /// The service rejected the request with a structured error.
    #[error("{0}")]
    Api(#[source] ApiError),
    /// The service rejected the request without a structured error.
    #[error("the service returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    /// The response could not be decoded.
    #[error("cannot decode the response: {0}")]
    Deserialization(#[source] serde_json::Error),
}

/// Returns the user agent sent by the driver.
pub fn user_agent(vendor_version: &str) -> String {
    format!(
        "GCE CSI Driver/{vendor_version} ({} {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

// Shared by the stable and preview clients.
#[derive(Clone, Debug)]
struct Transport {
    credentials: Credentials,
    inner: reqwest::Client,
}

/// A client for one version of the compute API.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    version: ApiVersion,
    endpoint: String,
    user_agent: HeaderValue,
    transport: Transport,
}

impl ServiceClient {
    fn new(
        version: ApiVersion,
        endpoint: &str,
        user_agent: &str,
        transport: Transport,
    ) -> Result<Self, BuildError> {
        let surface = version.surface();
        let endpoint = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{endpoint}/")
        };
        reqwest::Url::parse(&endpoint).map_err(|e| BuildError::client_construction(surface, e))?;
        let user_agent =
            HeaderValue::from_str(user_agent).map_err(|e| BuildError::client_construction(surface, e))?;
        Ok(Self {
            version,
            endpoint,
            user_agent,
            transport,
        })
    }

    /// The API version used by this client.
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// The base URL for requests, always ends with `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The `User-Agent` header sent with each request.
    pub fn user_agent(&self) -> &str {
        // Constructed from a `&str`.
        self.user_agent.to_str().unwrap_or_default()
    }

    /// Sends a `GET` request to `path`, relative to the endpoint.
    pub async fn get<O>(&self, path: &str, query: &[(&str, &str)]) -> Result<O, ServiceError>
    where
        O: serde::de::DeserializeOwned,
    {
        self.execute::<(), O>(Method::GET, path, query, None).await
    }

    /// Sends a request to `path`, relative to the endpoint, with an optional
    /// JSON body.
    pub async fn execute<I, O>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&I>,
    ) -> Result<O, ServiceError>
    where
        I: serde::Serialize + ?Sized,
        O: serde::de::DeserializeOwned,
    {
        let auth_headers = match self
            .transport
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(ServiceError::Authentication)?
        {
            CacheableResource::New { data, .. } => data,
            CacheableResource::NotModified => {
                return Err(ServiceError::Authentication(errors::non_retryable_from_str(
                    "the credentials did not return any headers",
                )));
            }
        };

        let url = format!("{}{}", self.endpoint, path.trim_start_matches('/'));
        let mut builder = self
            .transport
            .inner
            .request(method, url)
            .headers(auth_headers)
            .header(USER_AGENT, self.user_agent.clone())
            .query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(ServiceError::Transport)?;
        let status = response.status();
        let content = response.bytes().await.map_err(ServiceError::Transport)?;
        if !status.is_success() {
            return Err(match ApiError::try_from(&content) {
                Ok(api) => ServiceError::Api(api),
                Err(_) => ServiceError::Http {
                    status,
                    body: String::from_utf8_lossy(&content).into_owned(),
                },
            });
        }
        serde_json::from_slice::<O>(&content).map_err(ServiceError::Deserialization)
    }
}

/// The endpoints used by [build_services].
#[derive(Clone, Debug)]
pub(crate) struct Endpoints {
    pub(crate) stable: String,
    pub(crate) preview: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            stable: COMPUTE_V1_ENDPOINT.to_string(),
            preview: COMPUTE_ALPHA_ENDPOINT.to_string(),
        }
    }
}

/// Creates the stable and preview clients, sharing one transport
/// authenticated by `credentials`.
pub(crate) fn build_services(
    vendor_version: &str,
    credentials: Credentials,
    endpoints: &Endpoints,
) -> Result<(ServiceClient, ServiceClient), BuildError> {
    let user_agent = user_agent(vendor_version);
    let transport = Transport {
        credentials,
        inner: reqwest::Client::new(),
    };
    let stable = ServiceClient::new(
        ApiVersion::Stable,
        &endpoints.stable,
        &user_agent,
        transport.clone(),
    )?;
    let preview = ServiceClient::new(ApiVersion::Preview, &endpoints.preview, &user_agent, transport)?;
    tracing::debug!(
        "created compute clients for {} and {} with user agent {user_agent}",
        stable.endpoint(),
        preview.endpoint()
    );
    Ok((stable, preview))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_error::is_gce_not_found_error;
    use crate::credentials::tests::{MockCredentials, bearer_headers};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use pretty_assertions::assert_eq;

    fn endpoints(server: &Server) -> Endpoints {
        Endpoints {
            stable: server.url_str("/compute/v1/"),
            preview: server.url_str("/compute/alpha"),
        }
    }

    fn mock_credentials(times: usize) -> Credentials {
        let mut mock = MockCredentials::new();
        mock.expect_headers()
            .times(times)
            .returning(|_| Ok(bearer_headers("test-token")));
        Credentials::from(mock)
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Zone {
        name: String,
    }

    #[test]
    fn user_agent_format() {
        let got = user_agent("v1.2.3");
        assert_eq!(
            got,
            format!(
                "GCE CSI Driver/v1.2.3 ({} {})",
                std::env::consts::OS,
                std::env::consts::ARCH
            )
        );
    }

    #[test]
    fn build_defaults() -> anyhow::Result<()> {
        let (stable, preview) = build_services("v1.2.3", mock_credentials(0), &Endpoints::default())?;
        assert_eq!(stable.version(), ApiVersion::Stable);
        assert_eq!(stable.endpoint(), COMPUTE_V1_ENDPOINT);
        assert_eq!(preview.version(), ApiVersion::Preview);
        assert_eq!(preview.endpoint(), COMPUTE_ALPHA_ENDPOINT);
        assert_eq!(stable.user_agent(), user_agent("v1.2.3"));
        assert_eq!(preview.user_agent(), user_agent("v1.2.3"));
        Ok(())
    }

    #[test]
    fn build_bad_user_agent() {
        let err = build_services("v1\n", mock_credentials(0), &Endpoints::default()).unwrap_err();
        assert!(err.is_client_construction(), "{err:?}");
        assert!(err.to_string().contains("stable"), "{err}");
    }

    #[test]
    fn build_bad_preview_endpoint() {
        let endpoints = Endpoints {
            preview: "not a url".to_string(),
            ..Endpoints::default()
        };
        let err = build_services("v1", mock_credentials(0), &endpoints).unwrap_err();
        assert!(err.is_client_construction(), "{err:?}");
        assert!(err.to_string().contains("preview"), "{err}");
    }

    #[tokio::test]
    async fn get_success() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/compute/v1/projects/p/zones/z"),
                request::headers(contains(("authorization", "Bearer test-token"))),
                request::headers(contains(("user-agent", user_agent("v1.2.3")))),
                request::query(url_decoded(contains(("fields", "name")))),
            ])
            .respond_with(json_encoded(serde_json::json!({"name": "z"}))),
        );

        let (stable, _) = build_services("v1.2.3", mock_credentials(1), &endpoints(&server))?;
        let zone = stable
            .get::<Zone>("/projects/p/zones/z", &[("fields", "name")])
            .await?;
        assert_eq!(zone, Zone { name: "z".into() });
        Ok(())
    }

    #[tokio::test]
    async fn preview_uses_its_endpoint() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/compute/alpha/projects/p/disks"))
                .respond_with(json_encoded(serde_json::json!({"name": "op-1"}))),
        );

        let (_, preview) = build_services("v1", mock_credentials(1), &endpoints(&server))?;
        let op = preview
            .execute::<_, Zone>(
                Method::POST,
                "projects/p/disks",
                &[],
                Some(&serde_json::json!({"name": "disk-1"})),
            )
            .await?;
        assert_eq!(op.name, "op-1");
        Ok(())
    }

    #[tokio::test]
    async fn structured_error() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v1/projects/p/zones/z"))
                .respond_with(status_code(404).body(
                    r#"{"error": {"code": 404, "message": "not found",
                    "errors": [{"domain": "global", "reason": "notFound", "message": "not found"}]}}"#,
                )),
        );

        let (stable, _) = build_services("v1", mock_credentials(1), &endpoints(&server))?;
        let err = stable
            .get::<Zone>("projects/p/zones/z", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Api(_)), "{err:?}");
        assert!(is_gce_not_found_error(&err), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn unstructured_error() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v1/projects/p/zones/z"))
                .respond_with(status_code(502).body("bad gateway")),
        );

        let (stable, _) = build_services("v1", mock_credentials(1), &endpoints(&server))?;
        let err = stable
            .get::<Zone>("projects/p/zones/z", &[])
            .await
            .unwrap_err();
        match &err {
            ServiceError::Http { status, body } => {
                assert_eq!(*status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "bad gateway");
            }
            _ => panic!("unexpected error {err:?}"),
        }
        assert!(!is_gce_not_found_error(&err), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn bad_payload() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/compute/v1/projects/p/zones/z"))
                .respond_with(status_code(200).body("not json")),
        );

        let (stable, _) = build_services("v1", mock_credentials(1), &endpoints(&server))?;
        let err = stable
            .get::<Zone>("projects/p/zones/z", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Deserialization(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn token_failure() -> anyhow::Result<()> {
        let mut mock = MockCredentials::new();
        mock.expect_headers()
            .times(1)
            .returning(|_| Err(CredentialsError::from_msg(true, "no token")));
        let (stable, _) = build_services("v1", Credentials::from(mock), &Endpoints::default())?;
        let err = stable
            .get::<Zone>("projects/p/zones/z", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn not_modified_headers() -> anyhow::Result<()> {
        let mut mock = MockCredentials::new();
        mock.expect_headers()
            .times(1)
            .returning(|_| Ok(CacheableResource::NotModified));
        let (stable, _) = build_services("v1", Credentials::from(mock), &Endpoints::default())?;
        let err = stable
            .get::<Zone>("projects/p/zones/z", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(_)), "{err:?}");
        Ok(())
    }
}
