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

//! Tokens minted by an operator-supplied token service.
//!
//! Some deployments run the driver with credentials vended by a separate
//! service. The configuration file names the service (`token-url`) and an
//! opaque JSON request (`token-body`). The request is authenticated with the
//! instance's own service account, and the service replies with:
//!
//! ```json
//! { "accessToken": "ya29...", "expireTime": "2024-01-01T00:00:00Z" }
//! ```

use crate::Result;
use crate::errors::{self, CredentialsError};
use crate::token::{Token, TokenProvider};
use crate::token_cache::TokenCache;
use google_cloud_auth::credentials::{
    CacheableResource, Credentials, CredentialsProvider, EntityTag,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::Extensions;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;

/// Credentials backed by an operator-supplied token service.
///
/// Tokens are cached until they expire.
#[derive(Clone, Debug)]
pub struct AltCredentials {
    token_url: String,
    tokens: TokenCache<AltTokenProvider>,
}

impl AltCredentials {
    /// `caller` authenticates the requests to the token service.
    pub(crate) fn new(token_url: &str, token_body: &str, caller: Credentials) -> Self {
        let provider = AltTokenProvider {
            token_url: token_url.to_string(),
            token_body: token_body.to_string(),
            caller,
            client: reqwest::Client::new(),
        };
        Self {
            token_url: token_url.to_string(),
            tokens: TokenCache::new(provider),
        }
    }

    /// The URL of the token service.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl CredentialsProvider for AltCredentials {
    async fn headers(&self, _extensions: Extensions) -> Result<CacheableResource<HeaderMap>> {
        let token = self.tokens.token().await?;
        let mut value = HeaderValue::from_str(&format!("{} {}", token.token_type, token.token))
            .map_err(errors::non_retryable)?;
        value.set_sensitive(true);
        Ok(CacheableResource::New {
            entity_tag: EntityTag::default(),
            data: HeaderMap::from_iter([(AUTHORIZATION, value)]),
        })
    }

    async fn universe_domain(&self) -> Option<String> {
        None
    }
}

/// Exchanges the configured body at the configured URL.
pub(crate) struct AltTokenProvider {
    token_url: String,
    token_body: String,
    caller: Credentials,
    client: reqwest::Client,
}

impl std::fmt::Debug for AltTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AltTokenProvider")
            .field("token_url", &self.token_url)
            .field("token_body", &"[censored]")
            .finish()
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AltTokenResponse {
    access_token: String,
    expire_time: String,
}

impl AltTokenProvider {
    async fn caller_headers(&self) -> Result<HeaderMap> {
        match self.caller.headers(Extensions::new()).await? {
            CacheableResource::New { data, .. } => Ok(data),
            CacheableResource::NotModified => Err(errors::non_retryable_from_str(
                "the instance credentials did not return any headers",
            )),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for AltTokenProvider {
    async fn token(&self) -> Result<Token> {
        let caller = self.caller_headers().await?;

        let error_message = "failed to exchange token body";
        let response = self
            .client
            .post(self.token_url.as_str())
            .headers(caller)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(self.token_body.clone())
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, error_message).await);
        }
        let response = response
            .json::<AltTokenResponse>()
            .await
            .map_err(|e| CredentialsError::from_source(!e.is_decode(), e))?;

        let expire_time =
            OffsetDateTime::parse(&response.expire_time, &Rfc3339).map_err(errors::non_retryable)?;
        let remaining = std::time::Duration::try_from(expire_time - OffsetDateTime::now_utc())
            .unwrap_or_default();
        Ok(Token {
            token: response.access_token,
            token_type: "Bearer".to_string(),
            expires_at: Some(Instant::now() + remaining),
        })
    }
}
