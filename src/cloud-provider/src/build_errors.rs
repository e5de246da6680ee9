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

//! Errors created while constructing a [CloudProvider].
//!
//! [CloudProvider]: crate::provider::CloudProvider

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for [CloudProvider] construction.
///
/// All of these conditions are fatal to startup. The error carries the
/// attempted source (a file path, the metadata server, an endpoint) and the
/// underlying cause, which is available via [std::error::Error::source].
///
/// [CloudProvider]: crate::provider::CloudProvider
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The configuration file could not be opened.
    pub fn is_config_unreadable(&self) -> bool {
        matches!(self.0, ErrorKind::ConfigUnreadable { .. })
    }

    /// The configuration file was opened, but its contents are not valid.
    pub fn is_config_malformed(&self) -> bool {
        matches!(self.0, ErrorKind::ConfigMalformed { .. })
    }

    /// No token could be obtained from the selected token source.
    pub fn is_credentials_unavailable(&self) -> bool {
        matches!(self.0, ErrorKind::CredentialsUnavailable(_))
    }

    /// One of the API service clients could not be created.
    pub fn is_client_construction(&self) -> bool {
        matches!(self.0, ErrorKind::ClientConstructionFailed { .. })
    }

    /// The zone was not configured and the metadata server did not provide it.
    pub fn is_zone_undiscoverable(&self) -> bool {
        matches!(self.0, ErrorKind::ZoneUndiscoverable(_))
    }

    /// The project was not configured and the metadata server did not provide
    /// it.
    pub fn is_project_undiscoverable(&self) -> bool {
        matches!(self.0, ErrorKind::ProjectUndiscoverable(_))
    }

    /// The caller cancelled the construction.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.0, ErrorKind::Cancelled)
    }

    pub(crate) fn config_unreadable<T>(path: &str, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::ConfigUnreadable {
            path: path.to_string(),
            source: source.into(),
        })
    }

    pub(crate) fn config_malformed<T>(path: &str, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::ConfigMalformed {
            path: path.to_string(),
            source: source.into(),
        })
    }

    pub(crate) fn credentials_unavailable<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::CredentialsUnavailable(source.into()))
    }

    pub(crate) fn client_construction<T>(surface: &'static str, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::ClientConstructionFailed {
            surface,
            source: source.into(),
        })
    }

    pub(crate) fn zone_undiscoverable<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::ZoneUndiscoverable(source.into()))
    }

    pub(crate) fn project_undiscoverable<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::ProjectUndiscoverable(source.into()))
    }

    pub(crate) fn cancelled() -> Error {
        Error(ErrorKind::Cancelled)
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("couldn't open cloud provider configuration at {path}: {source}")]
    ConfigUnreadable {
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("couldn't read cloud provider configuration at {path}: {source}")]
    ConfigMalformed {
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("cannot obtain an access token: {0}")]
    CredentialsUnavailable(#[source] BoxError),
    #[error("cannot create the {surface} compute service: {source}")]
    ClientConstructionFailed {
        surface: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("cannot get the zone from the metadata server: {0}")]
    ZoneUndiscoverable(#[source] BoxError),
    #[error("cannot get the project id from the metadata server: {0}")]
    ProjectUndiscoverable(#[source] BoxError),
    #[error("cloud provider construction was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn constructors() {
        let error = Error::config_unreadable("/etc/gce.conf", "test message");
        assert!(error.is_config_unreadable(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");
        assert!(error.to_string().contains("/etc/gce.conf"), "{error}");

        let error = Error::config_malformed("/etc/gce.conf", "test message");
        assert!(error.is_config_malformed(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("/etc/gce.conf"), "{error}");

        let error = Error::credentials_unavailable("test message");
        assert!(error.is_credentials_unavailable(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");

        let error = Error::client_construction("alpha", "test message");
        assert!(error.is_client_construction(), "{error:?}");
        assert!(error.to_string().contains("alpha"), "{error}");

        let error = Error::zone_undiscoverable("test message");
        assert!(error.is_zone_undiscoverable(), "{error:?}");
        assert!(!error.is_project_undiscoverable(), "{error:?}");

        let error = Error::project_undiscoverable("test message");
        assert!(error.is_project_undiscoverable(), "{error:?}");
        assert!(!error.is_zone_undiscoverable(), "{error:?}");

        let error = Error::cancelled();
        assert!(error.is_cancelled(), "{error:?}");
        assert!(error.source().is_none(), "{error:?}");
    }
}
