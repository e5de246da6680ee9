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

//! Helpers to create [CredentialsError] values for failed HTTP requests.
//!
//! The metadata server client and the alternate token source report errors
//! with the same type as the [google_cloud_auth] credentials, so the warm-up
//! loop and the service clients handle all token sources uniformly.

pub use google_cloud_auth::errors::CredentialsError;
use http::StatusCode;

pub(crate) fn non_retryable<T: std::error::Error + Send + Sync + 'static>(
    source: T,
) -> CredentialsError {
    CredentialsError::from_source(false, source)
}

pub(crate) fn non_retryable_from_str<T: Into<String>>(message: T) -> CredentialsError {
    CredentialsError::from_msg(false, message)
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}

/// Maps a failed request to a [CredentialsError].
///
/// Connection failures are retryable: the metadata server, or the token
/// endpoint, may not be reachable during process startup.
pub(crate) fn from_http_error(err: reqwest::Error, msg: &str) -> CredentialsError {
    let message = format!("{msg}: {err}");
    match err.status() {
        Some(status) => CredentialsError::from_msg(is_retryable(status), message),
        None => CredentialsError::from_msg(true, message),
    }
}

/// Maps a non-2xx response to a [CredentialsError], capturing the body.
pub(crate) async fn from_http_response(response: reqwest::Response, msg: &str) -> CredentialsError {
    let status = response.status();
    let retryable = is_retryable(status);
    match response.text().await {
        Ok(body) => {
            CredentialsError::from_msg(retryable, format!("{msg}, status: {status}, body: {body}"))
        }
        Err(e) => CredentialsError::from_source(retryable, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use std::error::Error as _;
    use test_case::test_case;

    #[test_case(StatusCode::INTERNAL_SERVER_ERROR)]
    #[test_case(StatusCode::SERVICE_UNAVAILABLE)]
    #[test_case(StatusCode::REQUEST_TIMEOUT)]
    #[test_case(StatusCode::TOO_MANY_REQUESTS)]
    fn retryable_status(c: StatusCode) {
        assert!(is_retryable(c));
    }

    #[test_case(StatusCode::NOT_FOUND)]
    #[test_case(StatusCode::UNAUTHORIZED)]
    #[test_case(StatusCode::BAD_REQUEST)]
    #[test_case(StatusCode::BAD_GATEWAY)]
    #[test_case(StatusCode::PRECONDITION_FAILED)]
    fn non_retryable_status(c: StatusCode) {
        assert!(!is_retryable(c));
    }

    #[test]
    fn helpers() {
        let e = non_retryable(std::io::Error::other("test-only-io"));
        assert!(!e.is_transient(), "{e:?}");
        assert!(e.source().is_some(), "{e:?}");

        let e = non_retryable_from_str("test-only-msg");
        assert!(!e.is_transient(), "{e:?}");
        assert!(e.to_string().contains("test-only-msg"), "{e}");
    }

    #[tokio::test]
    async fn response_keeps_body() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path("/token"))
                .respond_with(status_code(503).body("try again later")),
        );
        let response = reqwest::get(server.url_str("/token")).await?;

        let e = from_http_response(response, "test-only-msg").await;
        assert!(e.is_transient(), "{e:?}");
        let fmt = e.to_string();
        assert!(fmt.contains("test-only-msg"), "{fmt}");
        assert!(fmt.contains("try again later"), "{fmt}");
        Ok(())
    }

    #[tokio::test]
    async fn connection_errors_are_retryable() {
        // Nothing listens on the discard port.
        let err = reqwest::get("http://127.0.0.1:9/token").await.unwrap_err();
        let e = from_http_error(err, "test-only-msg");
        assert!(e.is_transient(), "{e:?}");
        assert!(e.to_string().contains("test-only-msg"), "{e}");
    }
}
