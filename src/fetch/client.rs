use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends an already-built request. Credential wrappers such as
/// [`ApiKey`](super::auth::ApiKey) decorate the request and delegate.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> reqwest::Result<Response>;
}
