//! Receipt template cache
//!
//! The template is owned by the central server. The cache keeps the last
//! copy and asks the server with `If-None-Match`, so a full body is only
//! transferred when the version changes.

use super::error::{FeedError, FeedResult};
use super::http::{OrderFeed, TemplateFetch};
use crate::core::ErrorClass;
use shared::ReceiptTemplate;
use std::sync::Arc;

/// Version-aware template cache (owned by the dispatcher)
pub struct TemplateCache {
    feed: Arc<dyn OrderFeed>,
    cached: Option<Arc<ReceiptTemplate>>,
}

impl TemplateCache {
    pub fn new(feed: Arc<dyn OrderFeed>) -> Self {
        Self { feed, cached: None }
    }

    pub fn cached_version(&self) -> Option<u32> {
        self.cached.as_ref().map(|t| t.version)
    }

    /// Current template
    ///
    /// Transient failures fall back to the cached copy when there is one.
    /// Fatal and data errors are always returned.
    pub async fn resolve(&mut self) -> FeedResult<Arc<ReceiptTemplate>> {
        match self.feed.fetch_template(self.cached_version()).await {
            Ok(TemplateFetch::Updated(template)) => {
                if let Some(old) = self.cached_version() {
                    tracing::info!(old, new = template.version, "Receipt template updated");
                }
                let template = Arc::new(template);
                self.cached = Some(template.clone());
                Ok(template)
            }
            Ok(TemplateFetch::NotModified) => match &self.cached {
                Some(template) => Ok(template.clone()),
                None => Err(FeedError::InvalidResponse(
                    "server answered 304 without a cached template".into(),
                )),
            },
            Err(e) if e.class() == ErrorClass::Transient => match &self.cached {
                Some(template) => {
                    tracing::warn!(
                        version = template.version,
                        error = %e,
                        "Template fetch failed, using cached copy"
                    );
                    Ok(template.clone())
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OrderBatch;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Feed that answers template fetches from a script
    struct ScriptedFeed {
        replies: Mutex<Vec<FeedResult<TemplateFetch>>>,
        seen_versions: Mutex<Vec<Option<u32>>>,
    }

    impl ScriptedFeed {
        fn new(mut replies: Vec<FeedResult<TemplateFetch>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen_versions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderFeed for ScriptedFeed {
        async fn list_new_orders(&self, _after: u64) -> FeedResult<OrderBatch> {
            Ok(OrderBatch::default())
        }

        async fn fetch_template(&self, cached_version: Option<u32>) -> FeedResult<TemplateFetch> {
            self.seen_versions.lock().unwrap().push(cached_version);
            self.replies.lock().unwrap().pop().unwrap()
        }

        async fn acknowledge(&self, _order_number: u64) -> FeedResult<()> {
            Ok(())
        }

        async fn fetch_logo(&self, _url: &str) -> FeedResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn template(version: u32) -> ReceiptTemplate {
        ReceiptTemplate {
            version,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refetch_only_on_version_change() {
        let feed = Arc::new(ScriptedFeed::new(vec![
            Ok(TemplateFetch::Updated(template(1))),
            Ok(TemplateFetch::NotModified),
            Ok(TemplateFetch::Updated(template(2))),
        ]));
        let mut cache = TemplateCache::new(feed.clone());

        assert_eq!(cache.resolve().await.unwrap().version, 1);
        assert_eq!(cache.resolve().await.unwrap().version, 1);
        assert_eq!(cache.resolve().await.unwrap().version, 2);

        assert_eq!(
            *feed.seen_versions.lock().unwrap(),
            vec![None, Some(1), Some(1)]
        );
    }

    #[tokio::test]
    async fn test_transient_error_uses_cache() {
        let feed = Arc::new(ScriptedFeed::new(vec![
            Ok(TemplateFetch::Updated(template(4))),
            Err(FeedError::Timeout("template".into())),
        ]));
        let mut cache = TemplateCache::new(feed);

        cache.resolve().await.unwrap();
        assert_eq!(cache.resolve().await.unwrap().version, 4);
    }

    #[tokio::test]
    async fn test_transient_error_without_cache_fails() {
        let feed = Arc::new(ScriptedFeed::new(vec![Err(FeedError::Network(
            "refused".into(),
        ))]));
        let mut cache = TemplateCache::new(feed);

        let err = cache.resolve().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_malformed_template_is_data_error_even_with_cache() {
        let feed = Arc::new(ScriptedFeed::new(vec![
            Ok(TemplateFetch::Updated(template(1))),
            Err(FeedError::InvalidResponse("missing version".into())),
        ]));
        let mut cache = TemplateCache::new(feed);

        cache.resolve().await.unwrap();
        assert_eq!(cache.resolve().await.unwrap_err().class(), ErrorClass::Data);
    }
}
