mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use tracing::{debug, warn};

use crate::error::{FuelError, Result};

/// GETs `url` through `client` and returns the body.
///
/// # Errors
///
/// [`FuelError::Transport`] when the request cannot be sent and
/// [`FuelError::Status`] for a non-success reply.
#[tracing::instrument(skip(client))]
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse()
            .map_err(|e| FuelError::Config(format!("invalid url '{url}': {e}")))?,
    );

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Upstream rejected request");
        return Err(FuelError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?.to_vec();
    debug!(bytes = bytes.len(), "Response received");
    Ok(bytes)
}

/// Like [`fetch_bytes`] but decodes the body as JSON.
pub async fn fetch_json<C: HttpClient>(client: &C, url: &str) -> Result<serde_json::Value> {
    let bytes = fetch_bytes(client, url).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::{Request, Response};

    /// Replies to every request with a fixed status and body.
    struct CannedClient {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn execute(&self, _request: Request) -> reqwest::Result<Response> {
            let reply = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(Response::from(reply))
        }
    }

    #[tokio::test]
    async fn test_non_success_becomes_status_error() {
        let client = CannedClient {
            status: 503,
            body: "down for maintenance",
        };
        let err = fetch_bytes(&client, "https://example.test/prices")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FuelError::Status {
                status: 503,
                body: "down for maintenance".into()
            }
        );
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let client = CannedClient {
            status: 200,
            body: "SiteId,Price\n1,1940\n",
        };
        let body = fetch_bytes(&client, "https://example.test/export.csv")
            .await
            .unwrap();
        assert_eq!(body, b"SiteId,Price\n1,1940\n");
    }

    #[tokio::test]
    async fn test_fetch_json_rejects_non_json() {
        let client = CannedClient {
            status: 200,
            body: "<html>maintenance</html>",
        };
        let err = fetch_json(&client, "https://example.test/prices")
            .await
            .unwrap_err();
        assert!(matches!(err, FuelError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unparseable_url_is_config_error() {
        let client = CannedClient {
            status: 200,
            body: "",
        };
        let err = fetch_bytes(&client, "not a url").await.unwrap_err();
        assert!(matches!(err, FuelError::Config(_)));
    }
}
