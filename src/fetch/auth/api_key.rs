use crate::error::{FuelError, Result};
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects a credential as an HTTP header.
///
/// The header is validated once at construction, so sending never fails on
/// a malformed token.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| FuelError::InvalidHeader(format!("{header_name}: {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| FuelError::InvalidHeader(format!("{header_name} value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(inner: C, token: &str) -> Result<Self> {
        Self::new(inner, AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// `Authorization: FPDAPI SubscriberToken=<token>`, the scheme used by
    /// the Queensland fuel price API.
    pub fn subscriber_token(inner: C, token: &str) -> Result<Self> {
        Self::new(
            inner,
            AUTHORIZATION.as_str(),
            &format!("FPDAPI SubscriberToken={token}"),
        )
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.apply(&mut req);
        self.inner.execute(req).await
    }
}

impl<C> ApiKey<C> {
    fn apply(&self, req: &mut reqwest::Request) {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
    }
}
