//! Versioned response cache with per-rule fetch policies.
//!
//! Requests are matched against an ordered rule table; the first matching rule decides
//! which named cache is used and whether the cache or the network answers first.
//! Callers cannot tell a cached response from a live one.
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const API_CACHE: &str = "tmdb-api";
pub const IMAGE_CACHE: &str = "images";
pub const STATIC_CACHE: &str = "static-assets";
pub const API_NETWORK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Script,
    Style,
    Worker,
    Image,
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
            stored_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    StaleWhileRevalidate,
    CacheFirst,
    NetworkFirst { timeout: Duration },
}

#[derive(Debug, Clone)]
pub enum RequestMatcher {
    Destinations(Vec<Destination>),
    DestinationOrOrigin(Destination, String),
    UrlPrefix(String),
}

impl RequestMatcher {
    fn matches(&self, url: &str, destination: Destination) -> bool {
        match self {
            RequestMatcher::Destinations(list) => list.contains(&destination),
            RequestMatcher::DestinationOrOrigin(dest, origin) => {
                *dest == destination || origin_of(url).as_deref() == Some(origin.as_str())
            }
            RequestMatcher::UrlPrefix(prefix) => url
                .get(..prefix.len())
                .map(|head| head.eq_ignore_ascii_case(prefix))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Expiration {
    pub max_entries: usize,
    pub max_age: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct CacheRule {
    pub cache_name: String,
    pub matcher: RequestMatcher,
    pub policy: CachePolicy,
    pub expiration: Expiration,
}

/// Rule table: static assets stale-while-revalidate, images cache-first,
/// metadata API network-first with a short timeout.
pub fn default_rules(api_base: &str, image_base: &str) -> Vec<CacheRule> {
    let image_origin = origin_of(image_base).unwrap_or_else(|| image_base.to_string());
    vec![
        CacheRule {
            cache_name: STATIC_CACHE.to_string(),
            matcher: RequestMatcher::Destinations(vec![
                Destination::Script,
                Destination::Style,
                Destination::Worker,
            ]),
            policy: CachePolicy::StaleWhileRevalidate,
            expiration: Expiration {
                max_entries: 50,
                max_age: chrono::Duration::days(7),
            },
        },
        CacheRule {
            cache_name: IMAGE_CACHE.to_string(),
            matcher: RequestMatcher::DestinationOrOrigin(Destination::Image, image_origin),
            policy: CachePolicy::CacheFirst,
            expiration: Expiration {
                max_entries: 200,
                max_age: chrono::Duration::days(30),
            },
        },
        CacheRule {
            cache_name: API_CACHE.to_string(),
            matcher: RequestMatcher::UrlPrefix(api_base.to_string()),
            policy: CachePolicy::NetworkFirst {
                timeout: API_NETWORK_TIMEOUT,
            },
            expiration: Expiration {
                max_entries: 100,
                max_age: chrono::Duration::minutes(5),
            },
        },
    ]
}

fn origin_of(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| u.origin().ascii_serialization())
}

#[derive(Debug, Default)]
struct NamedCache {
    entries: HashMap<String, CachedResponse>,
}

/// Named caches shared by every cache version running in the process.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: Mutex<HashMap<String, NamedCache>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_names(&self) -> Vec<String> {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = caches.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn delete(&self, name: &str) -> bool {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches.remove(name).is_some()
    }

    pub fn len(&self, name: &str) -> usize {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches.get(name).map(|c| c.entries.len()).unwrap_or(0)
    }

    fn get(&self, name: &str, url: &str, expiration: &Expiration) -> Option<CachedResponse> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        let cache = caches.get_mut(name)?;
        let entry = cache.entries.get(url)?;
        if Utc::now() - entry.stored_at > expiration.max_age {
            cache.entries.remove(url);
            return None;
        }
        Some(entry.clone())
    }

    fn put(&self, name: &str, url: &str, response: &CachedResponse, expiration: &Expiration) {
        if response.status != 200 {
            return;
        }
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        let cache = caches.entry(name.to_string()).or_default();
        cache.entries.insert(url.to_string(), response.clone());
        while cache.entries.len() > expiration.max_entries {
            let oldest = cache
                .entries
                .iter()
                .min_by_key(|(_, r)| r.stored_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    cache.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[derive(Debug)]
pub struct ResponseCache {
    version: String,
    rules: Vec<CacheRule>,
    storage: Arc<CacheStorage>,
}

impl ResponseCache {
    pub fn new(storage: Arc<CacheStorage>, version: &str, rules: Vec<CacheRule>) -> Self {
        Self {
            version: version.to_string(),
            rules,
            storage,
        }
    }

    pub fn in_memory(version: &str, rules: Vec<CacheRule>) -> Self {
        Self::new(Arc::new(CacheStorage::new()), version, rules)
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn storage_name(&self, cache_name: &str) -> String {
        format!("{}-{}", self.version, cache_name)
    }

    /// Deletes every stored cache that does not belong to the current version.
    pub fn activate(&self) -> Vec<String> {
        let keep: Vec<String> = self
            .rules
            .iter()
            .map(|r| self.storage_name(&r.cache_name))
            .collect();
        let mut removed = Vec::new();
        for name in self.storage.cache_names() {
            if !keep.contains(&name) && self.storage.delete(&name) {
                removed.push(name);
            }
        }
        if !removed.is_empty() {
            info!("Removed outdated caches: {:?}", removed);
        }
        removed
    }

    fn rule_for(&self, url: &str, destination: Destination) -> Option<&CacheRule> {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(url, destination))
    }

    pub async fn fetch<F, Fut>(
        &self,
        url: &str,
        destination: Destination,
        network: F,
    ) -> Result<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedResponse>> + Send + 'static,
    {
        let Some(rule) = self.rule_for(url, destination) else {
            return network().await;
        };
        let name = self.storage_name(&rule.cache_name);
        let expiration = rule.expiration;
        let cached = self.storage.get(&name, url, &expiration);

        match rule.policy {
            CachePolicy::CacheFirst => {
                if let Some(hit) = cached {
                    debug!(cache = %name, "Serving from cache");
                    return Ok(hit);
                }
                let response = network().await?;
                self.storage.put(&name, url, &response, &expiration);
                Ok(response)
            }
            CachePolicy::StaleWhileRevalidate => {
                let refresh = network();
                match cached {
                    Some(hit) => {
                        let storage = Arc::clone(&self.storage);
                        let url = url.to_string();
                        tokio::spawn(async move {
                            match refresh.await {
                                Ok(fresh) => storage.put(&name, &url, &fresh, &expiration),
                                Err(e) => {
                                    debug!(cache = %name, "Background refresh failed: {:#}", e)
                                }
                            }
                        });
                        Ok(hit)
                    }
                    None => {
                        let response = refresh.await?;
                        self.storage.put(&name, url, &response, &expiration);
                        Ok(response)
                    }
                }
            }
            CachePolicy::NetworkFirst { timeout } => {
                // The request keeps running past the timeout and still refreshes the cache.
                let request = network();
                let storage = Arc::clone(&self.storage);
                let cache_name = name.clone();
                let key = url.to_string();
                let task = tokio::spawn(async move {
                    let result = request.await;
                    if let Ok(response) = &result {
                        storage.put(&cache_name, &key, response, &expiration);
                    }
                    result
                });
                let outcome = match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(join_error)) => {
                        Ok(Err(anyhow!("network task failed: {join_error}")))
                    }
                    Err(elapsed) => Err(elapsed),
                };
                match outcome {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => match cached {
                        Some(hit) => {
                            warn!(cache = %name, "Network failed, serving cached copy: {:#}", e);
                            Ok(hit)
                        }
                        None => Err(e),
                    },
                    Err(_) => match cached {
                        Some(hit) => {
                            warn!(
                                cache = %name,
                                "Network timed out after {:?}, serving cached copy", timeout
                            );
                            Ok(hit)
                        }
                        None => Err(anyhow!("network timed out after {:?}", timeout)),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const API: &str = "https://api.themoviedb.org/3";
    const IMAGES: &str = "https://image.tmdb.org/t/p";

    fn cache() -> ResponseCache {
        ResponseCache::in_memory("test-v1", default_rules(API, IMAGES))
    }

    fn ok(body: &str) -> CachedResponse {
        CachedResponse::new(200, Some("application/json".to_string()), body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn cache_first_hits_network_once() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let url = "https://image.tmdb.org/t/p/w500/poster.jpg";
        for _ in 0..3 {
            let calls = calls.clone();
            let res = cache
                .fetch(url, Destination::Fetch, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ok("img"))
                })
                .await
                .expect("fetch");
            assert_eq!(res.body, b"img");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn network_first_falls_back_to_cache_on_timeout() {
        let rules = vec![CacheRule {
            cache_name: API_CACHE.to_string(),
            matcher: RequestMatcher::UrlPrefix(API.to_string()),
            policy: CachePolicy::NetworkFirst {
                timeout: Duration::from_millis(20),
            },
            expiration: Expiration {
                max_entries: 10,
                max_age: chrono::Duration::minutes(5),
            },
        }];
        let cache = ResponseCache::in_memory("test-v1", rules);
        let url = format!("{API}/trending/movie/week?page=1");

        let first = cache
            .fetch(&url, Destination::Fetch, || async { Ok(ok("fresh")) })
            .await
            .expect("first fetch");
        assert_eq!(first.body, b"fresh");

        let second = cache
            .fetch(&url, Destination::Fetch, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ok("late"))
            })
            .await
            .expect("served from cache");
        assert_eq!(second.body, b"fresh");
    }

    #[tokio::test]
    async fn network_first_late_response_still_refreshes_cache() {
        let expiration = Expiration {
            max_entries: 10,
            max_age: chrono::Duration::minutes(5),
        };
        let rules = vec![CacheRule {
            cache_name: API_CACHE.to_string(),
            matcher: RequestMatcher::UrlPrefix(API.to_string()),
            policy: CachePolicy::NetworkFirst {
                timeout: Duration::from_millis(20),
            },
            expiration,
        }];
        let cache = ResponseCache::in_memory("test-v1", rules);
        let url = format!("{API}/movie/3");

        cache
            .fetch(&url, Destination::Fetch, || async { Ok(ok("v1")) })
            .await
            .expect("prime");

        let served = cache
            .fetch(&url, Destination::Fetch, || async {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(ok("v2"))
            })
            .await
            .expect("served from cache");
        assert_eq!(served.body, b"v1");

        let name = cache.storage_name(API_CACHE);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let current = cache
                .storage()
                .get(&name, &url, &expiration)
                .expect("entry stays cached");
            if current.body == b"v2" {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("late response never reached the cache");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn network_first_without_cache_reports_error() {
        let cache = cache();
        let url = format!("{API}/movie/1");
        let res = cache
            .fetch(&url, Destination::Fetch, || async {
                Err::<CachedResponse, _>(anyhow!("connection refused"))
            })
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn non_success_responses_are_not_stored() {
        let cache = cache();
        let url = format!("{API}/movie/2");
        let res = cache
            .fetch(&url, Destination::Fetch, || async {
                Ok(CachedResponse::new(500, None, b"boom".to_vec()))
            })
            .await
            .expect("network response is returned");
        assert_eq!(res.status, 500);
        assert_eq!(cache.storage().len(&cache.storage_name(API_CACHE)), 0);
    }

    #[tokio::test]
    async fn stale_while_revalidate_serves_cached_then_refreshes() {
        let cache = cache();
        let url = "https://goldenscreen.local/app.js";
        cache
            .fetch(url, Destination::Script, || async { Ok(ok("v1")) })
            .await
            .expect("prime");

        let stale = cache
            .fetch(url, Destination::Script, || async { Ok(ok("v2")) })
            .await
            .expect("stale copy");
        assert_eq!(stale.body, b"v1");

        let name = cache.storage_name(STATIC_CACHE);
        let expiration = Expiration {
            max_entries: 50,
            max_age: chrono::Duration::days(7),
        };
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let current = cache
                .storage()
                .get(&name, url, &expiration)
                .expect("entry stays cached");
            if current.body != b"v1" {
                assert_eq!(current.body, b"v2");
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("background refresh never landed");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn unmatched_requests_bypass_the_cache() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .fetch("https://example.com/page", Destination::Document, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ok("page"))
                })
                .await
                .expect("fetch");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn eviction_keeps_newest_entries() {
        let storage = CacheStorage::new();
        let expiration = Expiration {
            max_entries: 2,
            max_age: chrono::Duration::minutes(5),
        };
        for (i, url) in ["a", "b", "c"].iter().enumerate() {
            let mut response = ok(url);
            response.stored_at = Utc::now() + chrono::Duration::seconds(i as i64);
            storage.put("images", url, &response, &expiration);
        }
        assert_eq!(storage.len("images"), 2);
        assert!(storage.get("images", "a", &expiration).is_none());
        assert!(storage.get("images", "c", &expiration).is_some());
    }

    #[test]
    fn expired_entries_are_treated_as_absent() {
        let storage = CacheStorage::new();
        let expiration = Expiration {
            max_entries: 10,
            max_age: chrono::Duration::minutes(5),
        };
        let mut response = ok("old");
        response.stored_at = Utc::now() - chrono::Duration::minutes(10);
        storage.put(API_CACHE, "u", &response, &expiration);
        assert!(storage.get(API_CACHE, "u", &expiration).is_none());
        assert_eq!(storage.len(API_CACHE), 0);
    }

    #[test]
    fn activation_removes_other_versions() {
        let storage = Arc::new(CacheStorage::new());
        let expiration = Expiration {
            max_entries: 10,
            max_age: chrono::Duration::minutes(5),
        };
        storage.put("old-v1-images", "u", &ok("x"), &expiration);
        storage.put("new-v2-images", "u", &ok("x"), &expiration);

        let cache = ResponseCache::new(storage.clone(), "new-v2", default_rules(API, IMAGES));
        let removed = cache.activate();
        assert_eq!(removed, vec!["old-v1-images".to_string()]);
        assert_eq!(storage.cache_names(), vec!["new-v2-images".to_string()]);
    }
}
