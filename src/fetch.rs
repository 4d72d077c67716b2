/*
 *  fetch.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Shared HTTP client and the error taxonomy every provider reports with
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Why a provider could not produce fresh content.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network, TLS or HTTP-level failure.
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("request abandoned after {0:?}")]
    Timeout(Duration),
    /// Payload was not the JSON shape we expected.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("cached data is {age:?} old")]
    StaleData { age: Duration },
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("clock source unavailable")]
    ClockUnavailable,
}

/// Run `fut`, giving up after `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(deadline)),
    }
}

/// A decoded response, or the server's explicit "nothing here".
#[derive(Debug)]
pub enum Fetched<T> {
    Document(T),
    Empty,
}

/// Thin wrapper around a pre-configured reqwest client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(VERSION));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(2_000).min(timeout))
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send `request` and decode the JSON body into `T`.
    ///
    /// Unknown fields are ignored by serde, so `T` doubles as the response
    /// filter. `204 No Content` comes back as [`Fetched::Empty`].
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Fetched<T>, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Fetched::Empty);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Fetched::Empty);
        }
        decode(&body).map(Fetched::Document)
    }
}

/// Decode a JSON body; malformed input is an error, never a panic.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Doc {
        name: String,
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let doc: Doc = decode(r#"{"name":"x","extra":[1,2,3]}"#).unwrap();
        assert_eq!(doc.name, "x");
    }

    #[test]
    fn test_decode_malformed_is_error() {
        assert!(matches!(decode::<Doc>("{not json"), Err(ProviderError::Decode(_))));
        assert!(matches!(decode::<Doc>(r#"{"other":1}"#), Err(ProviderError::Decode(_))));
    }

    #[tokio::test]
    async fn test_deadline_abandons_hung_future() {
        let result: Result<(), ProviderError> = with_deadline(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_result() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, ProviderError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }
}
