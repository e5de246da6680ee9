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

use crate::Result;
use crate::errors::CredentialsError;
use crate::token::{Token, TokenProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

// Refresh a little before the actual expiration, the token may expire while
// the request is in flight.
const EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Reuses tokens from an inner [TokenProvider] until they expire.
///
/// Concurrent callers share a single in-flight refresh.
#[derive(Debug)]
pub struct TokenCache<T>
where
    T: TokenProvider,
{
    // The cached token, or the last seen error.
    token: Arc<Mutex<Result<Token>>>,

    // Tracks if a refresh is ongoing. If the lock is held, there is a refresh.
    refresh_in_progress: Arc<Mutex<()>>,
    // Allows us to await the result of a refresh in multiple tasks.
    refresh_notify: Arc<Notify>,

    inner: Arc<T>,
}

// Returns true if we are holding an error, or a token that has expired.
fn invalid(token: &Result<Token>) -> bool {
    match token {
        Ok(t) => t
            .expires_at
            .is_some_and(|e| e <= Instant::now() + EXPIRY_MARGIN),
        Err(_) => true,
    }
}

// Implemented manually, deriving `Clone` would require `T: Clone`.
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            token: self.token.clone(),
            refresh_in_progress: self.refresh_in_progress.clone(),
            refresh_notify: self.refresh_notify.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider> TokenCache<T> {
    pub fn new(inner: T) -> TokenCache<T> {
        TokenCache {
            token: Arc::new(Mutex::new(Err(CredentialsError::from_msg(
                true,
                "no token in the cache",
            )))),
            refresh_in_progress: Arc::new(Mutex::new(())),
            refresh_notify: Arc::new(Notify::new()),
            inner: Arc::new(inner),
        }
    }

    async fn current_token(&self) -> Result<Token> {
        self.token.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for TokenCache<T> {
    async fn token(&self) -> Result<Token> {
        let token = self.current_token().await;
        if !invalid(&token) {
            return token;
        }

        match self.refresh_in_progress.try_lock() {
            Ok(guard) => {
                let token = self.inner.token().await;
                *self.token.lock().await = token.clone();
                drop(guard);
                self.refresh_notify.notify_waiters();
                return token;
            }
            Err(_) => {
                // `notified()` captures any `notify_waiters()` call made after
                // this point. The refresh may have completed between
                // `try_lock()` and `notified()`.
                let notified = self.refresh_notify.notified();
                if self.refresh_in_progress.try_lock().is_err() {
                    notified.await;
                }
            }
        }

        self.current_token().await
    }
}
