//! Output items.
//!
//! An [`OutputItem`] is one mime-typed representation of an output, as handed to a renderer.
//! Payload accessors are lazy views over the raw bytes. Other representations of the same
//! output are fetched on demand through an [`OutputItemFetcher`] and cached on the item, so
//! the fallback walk in the renderer registry asks the host at most once per mime type.

use crate::events::OutputPayload;
use crate::lock;
use futures::future::BoxFuture;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Source of alternate representations of an output.
pub trait OutputItemFetcher: Send + Sync {
    /// Fetch the `mime` representation of output `output_id`. `None` when the host has none.
    fn fetch(&self, output_id: &str, mime: &str) -> BoxFuture<'static, Option<OutputPayload>>;
}

/// Binary payload tagged with its mime type.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub mime: String,
    pub data: Arc<[u8]>,
}

pub struct OutputItem {
    id: String,
    mime: String,
    metadata: Value,
    data: Arc<[u8]>,
    appended: Option<Arc<[u8]>>,
    all_mimes: Vec<String>,
    fetcher: Option<Arc<dyn OutputItemFetcher>>,
    alternates: Mutex<HashMap<String, Option<Arc<OutputItem>>>>,
}

impl std::fmt::Debug for OutputItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputItem")
            .field("id", &self.id)
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .field("all_mimes", &self.all_mimes)
            .finish_non_exhaustive()
    }
}

impl OutputItem {
    pub fn new(id: impl Into<String>, payload: OutputPayload) -> Self {
        let mut all_mimes = payload.all_mimes;
        if !all_mimes.iter().any(|m| *m == payload.mime) {
            all_mimes.insert(0, payload.mime.clone());
        }

        Self {
            id: id.into(),
            mime: payload.mime,
            metadata: payload.metadata,
            data: payload.value_bytes.into(),
            appended: payload.appended.map(|a| a.value_bytes.into()),
            all_mimes,
            fetcher: None,
            alternates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn OutputItemFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    #[inline]
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Raw payload bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }

    pub fn blob(&self) -> Blob {
        Blob {
            mime: self.mime.clone(),
            data: self.data.clone(),
        }
    }

    /// Text appended since the previous version of this output, when the host sent a delta.
    pub fn appended_text(&self) -> Option<Cow<'_, str>> {
        self.appended.as_deref().map(String::from_utf8_lossy)
    }

    /// Every mime type this output is available in, primary first unless the host said otherwise.
    pub fn all_mimes(&self) -> &[String] {
        &self.all_mimes
    }

    /// Fetch (once) the `mime` representation of this output.
    pub async fn alternate(&self, mime: &str) -> Option<Arc<OutputItem>> {
        if let Some(cached) = lock(&self.alternates).get(mime) {
            return cached.clone();
        }

        let fetcher = self.fetcher.clone()?;
        let fetched = fetcher.fetch(&self.id, mime).await.map(|payload| {
            Arc::new(OutputItem::new(self.id.clone(), payload).with_fetcher(fetcher.clone()))
        });

        lock(&self.alternates)
            .entry(mime.to_string())
            .or_insert(fetched)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AppendedPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl OutputItemFetcher for CountingFetcher {
        fn fetch(&self, _output_id: &str, mime: &str) -> BoxFuture<'static, Option<OutputPayload>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let payload = (mime == "text/plain").then(|| OutputPayload::text(mime, "plain"));
            Box::pin(async move { payload })
        }
    }

    #[test]
    fn accessors_decode_payload() {
        let item = OutputItem::new("o1", OutputPayload::text("application/json", r#"{"a": 1}"#));
        assert_eq!(item.text(), r#"{"a": 1}"#);
        assert_eq!(item.json().unwrap()["a"], 1);
        assert_eq!(item.blob().mime, "application/json");
        assert_eq!(item.all_mimes(), &["application/json".to_string()]);
        assert!(item.appended_text().is_none());
    }

    #[test]
    fn appended_delta_is_exposed() {
        let mut payload = OutputPayload::text("text/plain", "a\nb");
        payload.appended = Some(AppendedPayload {
            value_bytes: b"b".to_vec(),
            previous_version: 1,
        });
        let item = OutputItem::new("o1", payload);
        assert_eq!(item.appended_text().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn alternates_are_fetched_once_and_cached() {
        let fetcher = Arc::new(CountingFetcher { calls: AtomicUsize::new(0) });
        let mut payload = OutputPayload::text("image/png", "");
        payload.all_mimes = vec!["image/png".into(), "text/plain".into(), "text/html".into()];
        let item = OutputItem::new("o1", payload).with_fetcher(fetcher.clone());

        let alt = item.alternate("text/plain").await.unwrap();
        assert_eq!(alt.text(), "plain");
        assert!(item.alternate("text/plain").await.is_some());
        assert!(item.alternate("text/html").await.is_none());
        assert!(item.alternate("text/html").await.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn without_fetcher_no_alternates() {
        let item = OutputItem::new("o1", OutputPayload::text("text/plain", "x"));
        assert!(item.alternate("text/html").await.is_none());
    }
}
