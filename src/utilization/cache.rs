use serde::Serialize;
use std::time::Duration;

/// Response cache keyed on `"{endpoint}:{request json}"`.
/// Stores serialized JSON strings with a configurable TTL.
pub struct UtilizationCache {
    inner: moka::sync::Cache<String, String>,
}

impl UtilizationCache {
    pub fn new(ttl_secs: u64, capacity: u64) -> Self {
        Self {
            inner: moka::sync::Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(capacity)
                .build(),
        }
    }

    /// Requests hold their filter ids in ordered sets, so equal requests
    /// always serialize to the same key.
    pub fn cache_key<T: Serialize>(endpoint: &str, request: &T) -> Result<String, serde_json::Error> {
        Ok(format!("{}:{}", endpoint, serde_json::to_string(request)?))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, value: String) {
        self.inner.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilization::dimension::GroupBy;
    use crate::utilization::types::MonthlyUtilizationRequest;

    #[test]
    fn test_cache_key_ignores_filter_id_order() {
        let mut a = MonthlyUtilizationRequest {
            group_by: Some(GroupBy::AircraftFamily),
            ..Default::default()
        };
        let mut b = a.clone();
        a.group_by_filter_ids.extend([3, 1, 2]);
        b.group_by_filter_ids.extend([2, 3, 1]);
        assert_eq!(
            UtilizationCache::cache_key("monthly", &a).unwrap(),
            UtilizationCache::cache_key("monthly", &b).unwrap()
        );
    }

    #[test]
    fn test_cache_key_separates_endpoints() {
        let req = MonthlyUtilizationRequest::default();
        assert_ne!(
            UtilizationCache::cache_key("monthly", &req).unwrap(),
            UtilizationCache::cache_key("counts", &req).unwrap()
        );
    }

    #[test]
    fn test_get_after_insert() {
        let cache = UtilizationCache::new(60, 16);
        cache.insert("k".to_string(), "{}".to_string());
        assert_eq!(cache.get("k").as_deref(), Some("{}"));
        assert!(cache.get("missing").is_none());
    }
}
