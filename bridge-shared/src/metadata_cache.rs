//! BPMN metadata cache: fetches and parses process-definition XML for
//! the Poller, bounded by TTL and LRU eviction (§4.3).

use crate::error::Result;
use crate::models::{ActivityInfo, ActivityMetadata};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub xml_requests: u64,
    pub parse_operations: u64,
    pub evictions: u64,
    pub cache_bytes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry {
    activities: HashMap<String, ActivityMetadata>,
    cached_at: Instant,
    last_accessed: Instant,
    size_bytes: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    stats: CacheStats,
}

/// Fetches process-definition XML from the engine on first use (or TTL
/// expiry) for a `processDefinitionId`, parses out every service task's
/// metadata, and memoizes the result — empty results included, so a
/// process with no relevant service tasks is not re-fetched every poll.
pub struct MetadataCache<F> {
    max_entries: usize,
    ttl: Duration,
    fetch_xml: F,
    inner: Mutex<Inner>,
}

impl<F, Fut> MetadataCache<F>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    pub fn new(max_entries: usize, ttl: Duration, fetch_xml: F) -> Self {
        Self {
            max_entries,
            ttl,
            fetch_xml,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats.clone()
    }

    /// Returns the activity metadata for `activity_id` within
    /// `process_definition_id`, fetching and parsing the process XML if
    /// needed. Missing activities yield an empty [`ActivityMetadata`].
    pub async fn get_activity_metadata(
        &self,
        process_definition_id: &str,
        activity_id: &str,
    ) -> Result<ActivityMetadata> {
        if let Some(hit) = self.try_read_fresh(process_definition_id, activity_id) {
            return Ok(hit);
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.xml_requests += 1;
        }
        let xml = (self.fetch_xml)(process_definition_id.to_string()).await?;

        let activities = parse_service_tasks(&xml);
        let size_bytes = xml.len() as u64;

        {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.parse_operations += 1;
            if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(process_definition_id) {
                evict_oldest(&mut inner);
            }
            inner.entries.insert(
                process_definition_id.to_string(),
                Entry {
                    activities: activities.clone(),
                    cached_at: Instant::now(),
                    last_accessed: Instant::now(),
                    size_bytes,
                },
            );
            inner.stats.cache_bytes = inner.entries.values().map(|e| e.size_bytes).sum();
        }

        Ok(activities.get(activity_id).cloned().unwrap_or_default())
    }

    fn try_read_fresh(&self, process_definition_id: &str, activity_id: &str) -> Option<ActivityMetadata> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let ttl = self.ttl;
        if let Some(entry) = inner.entries.get_mut(process_definition_id) {
            if now.duration_since(entry.cached_at) < ttl {
                entry.last_accessed = now;
                let metadata = entry.activities.get(activity_id).cloned().unwrap_or_default();
                inner.stats.hits += 1;
                return Some(metadata);
            }
        }
        inner.stats.misses += 1;
        None
    }
}

/// Evicts the oldest 25% of entries by `last_accessed` (at least one),
/// matching the reference cache's eviction batch size.
fn evict_oldest(inner: &mut Inner) {
    let to_evict = std::cmp::max(1, inner.entries.len() / 4);
    let mut by_access: Vec<(String, Instant)> = inner
        .entries
        .iter()
        .map(|(k, v)| (k.clone(), v.last_accessed))
        .collect();
    by_access.sort_by_key(|(_, t)| *t);
    for (key, _) in by_access.into_iter().take(to_evict) {
        inner.entries.remove(&key);
        inner.stats.evictions += 1;
    }
}

/// Parses service-task nodes out of a BPMN 2.0 XML document, keyed by
/// activity id.
fn parse_service_tasks(xml: &str) -> HashMap<String, ActivityMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result = HashMap::new();
    let mut current: Option<(String, ActivityMetadata)> = None;
    let mut pending_property: Option<String> = None;
    let mut pending_param: Option<(bool, String)> = None; // (is_output, name)
    let mut text_buf = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name_buf = e.name();
                let local = local_name(name_buf.as_ref());
                match local {
                    "serviceTask" => {
                        let mut id = String::new();
                        let mut name = None;
                        let mut topic = None;
                        let mut activity_type = "serviceTask".to_string();
                        for attr in e.attributes().flatten() {
                            let key = local_name(attr.key.as_ref());
                            let value = attr.unescape_value().unwrap_or_default().to_string();
                            match key {
                                "id" => id = value,
                                "name" => name = Some(value),
                                "topic" => topic = Some(value),
                                "type" => activity_type = value,
                                _ => {}
                            }
                        }
                        if !id.is_empty() {
                            let metadata = ActivityMetadata {
                                activity_info: Some(ActivityInfo {
                                    id: id.clone(),
                                    name,
                                    activity_type,
                                    topic,
                                }),
                                ..Default::default()
                            };
                            current = Some((id, metadata));
                        }
                    }
                    "property" if current.is_some() => {
                        let mut name = None;
                        let mut value = None;
                        for attr in e.attributes().flatten() {
                            match local_name(attr.key.as_ref()) {
                                "name" => name = Some(attr.unescape_value().unwrap_or_default().to_string()),
                                "value" => value = Some(attr.unescape_value().unwrap_or_default().to_string()),
                                _ => {}
                            }
                        }
                        match (name, value) {
                            (Some(name), Some(value)) => {
                                if let Some((_, metadata)) = current.as_mut() {
                                    metadata.extension_properties.insert(name, value);
                                }
                            }
                            (name, _) => {
                                pending_property = name;
                            }
                        }
                    }
                    "field" if current.is_some() => {
                        let mut name = None;
                        let mut string_value = None;
                        for attr in e.attributes().flatten() {
                            match local_name(attr.key.as_ref()) {
                                "name" => name = Some(attr.unescape_value().unwrap_or_default().to_string()),
                                "stringValue" => {
                                    string_value = Some(attr.unescape_value().unwrap_or_default().to_string())
                                }
                                _ => {}
                            }
                        }
                        if let (Some(name), Some(value)) = (name.clone(), string_value) {
                            if let Some((_, metadata)) = current.as_mut() {
                                metadata.field_injections.insert(name, value);
                            }
                        } else {
                            pending_property = name;
                        }
                    }
                    "camunda:inputParameter" | "inputParameter" => {
                        let name = e
                            .attributes()
                            .flatten()
                            .find(|a| local_name(a.key.as_ref()) == "name")
                            .map(|a| a.unescape_value().unwrap_or_default().to_string());
                        pending_param = name.map(|n| (false, n));
                    }
                    "camunda:outputParameter" | "outputParameter" => {
                        let name = e
                            .attributes()
                            .flatten()
                            .find(|a| local_name(a.key.as_ref()) == "name")
                            .map(|a| a.unescape_value().unwrap_or_default().to_string());
                        pending_param = name.map(|n| (true, n));
                    }
                    _ => {}
                }
                text_buf.clear();
            }
            Ok(Event::Text(e)) => {
                text_buf.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => {
                let name_buf = e.name();
                let local = local_name(name_buf.as_ref());
                match local {
                    "serviceTask" => {
                        if let Some((id, metadata)) = current.take() {
                            result.insert(id, metadata);
                        }
                    }
                    "field" if pending_property.is_some() => {
                        if let (Some(name), Some((_, metadata))) = (pending_property.take(), current.as_mut()) {
                            metadata.field_injections.insert(name, text_buf.trim().to_string());
                        }
                    }
                    "camunda:inputParameter" | "inputParameter" => {
                        if let (Some((false, name)), Some((_, metadata))) = (pending_param.take(), current.as_mut()) {
                            metadata.input_parameters.insert(name, text_buf.trim().to_string());
                        }
                    }
                    "camunda:outputParameter" | "outputParameter" => {
                        if let (Some((true, name)), Some((_, metadata))) = (pending_param.take(), current.as_mut()) {
                            metadata.output_parameters.insert(name, text_buf.trim().to_string());
                        }
                    }
                    _ => {}
                }
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    result
}

fn local_name(qualified: &[u8]) -> &str {
    let s = std::str::from_utf8(qualified).unwrap_or("");
    s.rsplit(':').next().unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
    <definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
      <process id="proc1">
        <serviceTask id="task1" name="Create ticket" camunda:type="external" camunda:topic="bitrix24">
          <extensionElements>
            <camunda:properties>
              <camunda:property name="system" value="bitrix24" />
            </camunda:properties>
            <camunda:inputOutput>
              <camunda:inputParameter name="title">Build error</camunda:inputParameter>
              <camunda:outputParameter name="ticketId">${result}</camunda:outputParameter>
            </camunda:inputOutput>
          </extensionElements>
        </serviceTask>
      </process>
    </definitions>"#;

    #[tokio::test]
    async fn parses_and_caches_service_task_metadata() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let cache = MetadataCache::new(10, Duration::from_secs(3600), move |_id| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(SAMPLE_XML.to_string())
            }
        });

        let metadata = cache.get_activity_metadata("proc1", "task1").await.unwrap();
        assert!(!metadata.is_empty());
        assert_eq!(metadata.extension_properties.get("system"), Some(&"bitrix24".to_string()));

        let _ = cache.get_activity_metadata("proc1", "task1").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second lookup should be a cache hit");
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn missing_activity_yields_empty_metadata() {
        let cache = MetadataCache::new(10, Duration::from_secs(3600), |_id| async {
            Ok(SAMPLE_XML.to_string())
        });
        let metadata = cache.get_activity_metadata("proc1", "does-not-exist").await.unwrap();
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn eviction_removes_oldest_quarter_at_capacity() {
        let cache = MetadataCache::new(4, Duration::from_secs(3600), |_id| async {
            Ok(SAMPLE_XML.to_string())
        });
        for i in 0..5 {
            let _ = cache
                .get_activity_metadata(&format!("proc{i}"), "task1")
                .await
                .unwrap();
        }
        let stats = cache.stats();
        assert!(stats.evictions >= 1);
    }
}
