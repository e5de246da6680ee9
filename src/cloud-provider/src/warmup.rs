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
use crate::errors::CredentialsError;
use google_cloud_auth::credentials::Credentials;
use http::Extensions;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub(crate) const WARMUP_INTERVAL: Duration = Duration::from_secs(5);
pub(crate) const WARMUP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
#[error("no token after {attempts} attempt(s) in {timeout:?}")]
struct WarmupExhausted {
    attempts: u32,
    timeout: Duration,
    #[source]
    last: Option<CredentialsError>,
}

/// Waits until `credentials` produce the authorization headers.
///
/// The first attempt happens immediately, then one attempt every `interval`
/// until `timeout` elapses. Failed attempts are logged and retried, whether
/// the error is retryable or not. The token sources are slow to become usable
/// on freshly started VMs. If all attempts fail, the error from the last one
/// is the source of the returned error.
///
/// Cancelling `cancel` stops the loop at the next await point.
pub(crate) async fn warm_up(
    credentials: &Credentials,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0;
    let mut last = None;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {},
        }
        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            r = tokio::time::timeout_at(deadline, credentials.headers(Extensions::new())) => r,
        };
        match result {
            Ok(Ok(_)) => {
                tracing::debug!("token source ready after {attempts} attempt(s)");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::warn!("error fetching initial token (attempt {attempts}): {e}");
                last = Some(e);
            }
            Err(_) => break,
        }
    }
    Err(Error::credentials_unavailable(WarmupExhausted {
        attempts,
        timeout,
        last,
    }))
}
