use std::sync::Mutex;

use dashmap::DashMap;
use validator::Validate;

use crate::app::{ServiceError, ServiceResult};

#[derive(Validate)]
struct EmailValidator {
    #[validate(email)]
    email: String,
}

pub fn validate_email(email: &str) -> ServiceResult<String> {
    let validator = EmailValidator {
        email: email.trim().to_string(),
    };
    if validator.validate().is_err() {
        return ServiceError::bad_request("Invalid email address");
    }
    Ok(validator.email)
}

/// A bijective map between two key spaces. Insertions fail instead of
/// displacing an existing pairing; mutations are serialized so the two
/// directions never disagree.
pub struct OneOneDashMap<K, V> {
    forward: DashMap<K, V>,
    backward: DashMap<V, K>,
    lock: Mutex<()>,
}

impl<K, V> OneOneDashMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: std::hash::Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            backward: DashMap::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn get_by_key(&self, key: &K) -> Option<V> {
        self.forward.get(key).map(|v| v.clone())
    }

    pub fn get_by_value(&self, value: &V) -> Option<K> {
        self.backward.get(value).map(|k| k.clone())
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.backward.contains_key(value)
    }

    pub fn try_insert(&self, key: K, value: V) -> bool {
        let _guard = self.lock.lock().unwrap();
        if self.forward.contains_key(&key) || self.backward.contains_key(&value) {
            return false;
        }
        self.forward.insert(key.clone(), value.clone());
        self.backward.insert(value, key);
        true
    }

    pub fn remove_by_key(&self, key: &K) -> Option<V> {
        let _guard = self.lock.lock().unwrap();
        if let Some((_, value)) = self.forward.remove(key) {
            self.backward.remove(&value);
            return Some(value);
        }
        None
    }

    pub fn get_keys(&self) -> Vec<K> {
        self.forward
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_insert_rejects_either_side() {
        let map = OneOneDashMap::new();
        assert!(map.try_insert(1, "a"));
        assert!(!map.try_insert(1, "b"));
        assert!(!map.try_insert(2, "a"));
        assert!(map.try_insert(2, "b"));
        assert_eq!(map.get_by_key(&1), Some("a"));
        assert_eq!(map.get_by_value(&"b"), Some(2));
    }

    #[test]
    fn test_remove_by_key_clears_both_directions() {
        let map = OneOneDashMap::new();
        map.try_insert(1, "a");
        assert_eq!(map.remove_by_key(&1), Some("a"));
        assert!(!map.contains_value(&"a"));
        assert!(map.try_insert(2, "a"));
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" alice@example.com ").unwrap(),
            "alice@example.com"
        );
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());
    }
}
