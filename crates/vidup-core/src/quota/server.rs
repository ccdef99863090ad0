//! Quota lookups against the video server's user endpoints.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use super::{QuotaLimits, QuotaSource, QuotaUsage};
use crate::auth::AuthProvider;
use crate::transport::{HttpRequest, HttpTransport, Method};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaUsedBody {
    video_quota_used: i64,
    video_quota_used_daily: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeBody {
    video_quota: i64,
    video_quota_daily: i64,
}

/// Reads usage from `GET /api/v1/users/me/video-quota-used` and limits from `GET /api/v1/users/me`.
pub struct ServerQuota {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    base: url::Url,
}

impl ServerQuota {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        server_url: &str,
    ) -> Result<Self> {
        let base = url::Url::parse(server_url)
            .with_context(|| format!("invalid server URL {}", server_url))?;
        Ok(Self {
            transport,
            auth,
            base,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base.join(path).with_context(|| format!("join {}", path))?;
        let token = self.auth.access_token();
        let request = HttpRequest::new(Method::Get, url.as_str()).bearer(token.as_deref());
        let response = self
            .transport
            .execute(request)
            .await
            .with_context(|| format!("GET {}", url))?;
        if !response.is_success() {
            bail!("GET {} returned HTTP {}", url, response.status);
        }
        serde_json::from_slice(&response.body).with_context(|| format!("parse {}", url))
    }

    /// Account limits (`videoQuota`, `videoQuotaDaily`); -1 means unlimited.
    pub async fn fetch_limits(&self) -> Result<QuotaLimits> {
        let me: MeBody = self.get_json("/api/v1/users/me").await?;
        Ok(QuotaLimits {
            limit: me.video_quota,
            limit_daily: me.video_quota_daily,
        })
    }
}

#[async_trait]
impl QuotaSource for ServerQuota {
    async fn current_usage(&self) -> Result<QuotaUsage> {
        let body: QuotaUsedBody = self.get_json("/api/v1/users/me/video-quota-used").await?;
        Ok(QuotaUsage {
            used: body.video_quota_used,
            used_daily: body.video_quota_used_daily,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::transport::{HttpResponse, TransportError};

    struct UserEndpoints;

    #[async_trait]
    impl HttpTransport for UserEndpoints {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            assert_eq!(request.header_value("Authorization"), Some("Bearer tok"));
            let body = if request.url.ends_with("/video-quota-used") {
                r#"{"videoQuotaUsed":9000000,"videoQuotaUsedDaily":12}"#
            } else if request.url.ends_with("/users/me") {
                r#"{"id":1,"videoQuota":10000000,"videoQuotaDaily":-1}"#
            } else {
                return Ok(HttpResponse::new(404));
            };
            Ok(HttpResponse::new(200).with_body(body))
        }
    }

    #[tokio::test]
    async fn reads_usage_and_limits() {
        let quota = ServerQuota::new(
            Arc::new(UserEndpoints),
            Arc::new(StaticToken::new("tok")),
            "https://videos.example.org",
        )
        .unwrap();
        let usage = quota.current_usage().await.unwrap();
        assert_eq!(usage.used, 9_000_000);
        assert_eq!(usage.used_daily, 12);
        let limits = quota.fetch_limits().await.unwrap();
        assert_eq!(limits.limit, 10_000_000);
        assert_eq!(limits.limit_daily, super::super::UNLIMITED);
    }
}
