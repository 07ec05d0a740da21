//! HTTP client for the central order service

use super::error::{FeedError, FeedResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use shared::{Order, ReceiptTemplate};
use std::time::Duration;

/// One page of new orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBatch {
    #[serde(default)]
    pub orders: Vec<Order>,
    /// Server-side cursor after this page
    #[serde(default)]
    pub cursor: Option<u64>,
}

/// Result of a conditional template fetch
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateFetch {
    /// Cached version is current (HTTP 304)
    NotModified,
    Updated(ReceiptTemplate),
}

/// Calls the agent makes to the central order service, scoped to one location
#[async_trait]
pub trait OrderFeed: Send + Sync {
    /// Orders placed after `after`, in server order
    async fn list_new_orders(&self, after: u64) -> FeedResult<OrderBatch>;

    /// Receipt template, conditional on the cached version
    async fn fetch_template(&self, cached_version: Option<u32>) -> FeedResult<TemplateFetch>;

    /// Tell the server an order printed
    async fn acknowledge(&self, order_number: u64) -> FeedResult<()>;

    /// Raw logo image bytes
    async fn fetch_logo(&self, url: &str) -> FeedResult<Vec<u8>>;
}

/// reqwest-backed [`OrderFeed`]
///
/// Every call is bounded by the client timeout.
#[derive(Debug, Clone)]
pub struct HttpOrderFeed {
    client: Client,
    base_url: Url,
    location_id: String,
}

impl HttpOrderFeed {
    pub fn new(server_url: &str, location_id: &str, timeout: Duration) -> FeedResult<Self> {
        let base_url = Url::parse(server_url.trim())
            .map_err(|e| FeedError::InvalidUrl(format!("{}: {}", server_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FeedError::InvalidUrl(server_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("crab-print-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            location_id: location_id.to_string(),
        })
    }

    /// `{base}/api/print-agent/locations/{id}/{segments...}`, percent-encoded
    pub fn location_url(&self, segments: &[&str]) -> FeedResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "print-agent", "locations", self.location_id.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Map non-success statuses to feed errors
    async fn check_status(response: Response) -> FeedResult<Response> {
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(response);
        }

        let url = response.url().to_string();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(FeedError::Fatal {
                    status: status.as_u16(),
                    url,
                })
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                Err(FeedError::Throttled {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                })
            }
            s if s.is_server_error() => Err(FeedError::Server {
                status: s.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            s => Err(FeedError::Rejected {
                status: s.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> FeedResult<T> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| FeedError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl OrderFeed for HttpOrderFeed {
    async fn list_new_orders(&self, after: u64) -> FeedResult<OrderBatch> {
        let url = self.location_url(&["orders"])?;
        let response = self
            .client
            .get(url)
            .query(&[("after", after)])
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Self::decode(response).await
    }

    async fn fetch_template(&self, cached_version: Option<u32>) -> FeedResult<TemplateFetch> {
        let url = self.location_url(&["receipt-template"])?;
        let mut request = self.client.get(url);
        if let Some(version) = cached_version {
            request = request.header(header::IF_NONE_MATCH, format!("\"{}\"", version));
        }

        let response = Self::check_status(request.send().await?).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(TemplateFetch::NotModified);
        }
        Ok(TemplateFetch::Updated(Self::decode(response).await?))
    }

    async fn acknowledge(&self, order_number: u64) -> FeedResult<()> {
        let order_number = order_number.to_string();
        let url = self.location_url(&["orders", order_number.as_str(), "printed"])?;
        Self::check_status(self.client.post(url).send().await?).await?;
        Ok(())
    }

    async fn fetch_logo(&self, url: &str) -> FeedResult<Vec<u8>> {
        // Relative logo URLs resolve against the server
        let url = self
            .base_url
            .join(url)
            .map_err(|e| FeedError::InvalidResponse(format!("logo url {}: {}", url, e)))?;
        let response = Self::check_status(self.client.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorClass;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the raw request head
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_location_url_is_encoded() {
        let feed =
            HttpOrderFeed::new("http://orders.local:8080/", "loc 1", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            feed.location_url(&["orders"]).unwrap().as_str(),
            "http://orders.local:8080/api/print-agent/locations/loc%201/orders"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpOrderFeed::new("not a url", "loc-1", Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Config);
    }

    #[tokio::test]
    async fn test_list_orders_decodes_batch() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 24\r\nConnection: close\r\n\r\n{\"orders\":[],\"cursor\":7}",
        )
        .await;

        let feed = HttpOrderFeed::new(&base, "loc-1", Duration::from_secs(5)).unwrap();
        let batch = feed.list_new_orders(5).await.unwrap();
        assert!(batch.orders.is_empty());
        assert_eq!(batch.cursor, Some(7));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/print-agent/locations/loc-1/orders?after=5 "));
    }

    #[tokio::test]
    async fn test_not_found_is_fatal() {
        let (base, _server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let feed = HttpOrderFeed::new(&base, "loc-1", Duration::from_secs(5)).unwrap();
        let err = feed.list_new_orders(0).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_template_not_modified() {
        let (base, server) = serve_once(
            "HTTP/1.1 304 Not Modified\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let feed = HttpOrderFeed::new(&base, "loc-1", Duration::from_secs(5)).unwrap();
        assert_eq!(
            feed.fetch_template(Some(3)).await.unwrap(),
            TemplateFetch::NotModified
        );

        let request = server.await.unwrap().to_lowercase();
        assert!(request.contains("if-none-match: \"3\""));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let (base, _server) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        )
        .await;

        let feed = HttpOrderFeed::new(&base, "loc-1", Duration::from_secs(5)).unwrap();
        let err = feed.fetch_template(None).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_too_many_requests_is_transient() {
        let (base, _server) = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 5\r\nContent-Length: 4\r\nConnection: close\r\n\r\nslow",
        )
        .await;

        let feed = HttpOrderFeed::new(&base, "loc-1", Duration::from_secs(5)).unwrap();
        let err = feed.fetch_template(None).await.unwrap_err();
        assert!(matches!(err, FeedError::Throttled { status: 429, .. }));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_other_client_error_is_data_error() {
        let (base, _server) = serve_once(
            "HTTP/1.1 422 Unprocessable Entity\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let feed = HttpOrderFeed::new(&base, "loc-1", Duration::from_secs(5)).unwrap();
        let err = feed.fetch_template(None).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Data);
    }
}
