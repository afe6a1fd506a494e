//! Key/value storage test functions

use std::time::Duration;

use agora_storage_traits::kv::KeyValueStorage;
use agora_storage_traits::kv::types::CachedEntry;

/// Test basic set, get, overwrite and remove
pub fn test_set_get_remove<S>(storage: S)
where
    S: KeyValueStorage,
{
    assert_eq!(storage.kv_get("feed:following").unwrap(), None);

    storage.kv_set("feed:following", "v1").unwrap();
    assert_eq!(
        storage.kv_get("feed:following").unwrap(),
        Some("v1".to_string())
    );

    storage.kv_set("feed:following", "v2").unwrap();
    assert_eq!(
        storage.kv_get("feed:following").unwrap(),
        Some("v2".to_string())
    );

    storage.kv_remove("feed:following").unwrap();
    assert_eq!(storage.kv_get("feed:following").unwrap(), None);

    // Removing a missing key is not an error
    storage.kv_remove("feed:following").unwrap();
}

/// Test clear drops every key
pub fn test_clear<S>(storage: S)
where
    S: KeyValueStorage,
{
    storage.kv_set("a", "1").unwrap();
    storage.kv_set("b", "2").unwrap();
    storage.kv_clear().unwrap();
    assert_eq!(storage.kv_get("a").unwrap(), None);
    assert_eq!(storage.kv_get("b").unwrap(), None);
}

/// Test batch reads keep request order and report missing keys
pub fn test_multi_get_preserves_order<S>(storage: S)
where
    S: KeyValueStorage,
{
    storage
        .kv_multi_set(&[("chat_list:alice", "[]"), ("profile:alice", "{}")])
        .unwrap();

    let values = storage
        .kv_multi_get(&["profile:alice", "missing", "chat_list:alice"])
        .unwrap();
    assert_eq!(
        values,
        vec![Some("{}".to_string()), None, Some("[]".to_string())]
    );

    assert!(storage.kv_multi_get(&[]).unwrap().is_empty());
}

/// Test a rejected batch write leaves the store untouched
pub fn test_multi_set_all_or_nothing<S>(storage: S)
where
    S: KeyValueStorage,
{
    storage.kv_set("keep", "old").unwrap();
    let result = storage.kv_multi_set(&[("keep", "new"), ("", "invalid key")]);
    assert!(result.is_err());
    assert_eq!(storage.kv_get("keep").unwrap(), Some("old".to_string()));
}

/// Test a TTL record written as one value reads back with its expiry intact
pub fn test_cached_entry_record<S>(storage: S)
where
    S: KeyValueStorage,
{
    let entry = CachedEntry::new(vec!["p1", "p2"], 1_000, Some(Duration::from_secs(300)));
    let json = serde_json::to_string(&entry).unwrap();
    storage.kv_set("feed:for_you", &json).unwrap();

    let raw = storage.kv_get("feed:for_you").unwrap().unwrap();
    let back: CachedEntry<Vec<String>> = serde_json::from_str(&raw).unwrap();
    assert_eq!(back.expires_at, Some(301_000));
    assert!(back.is_valid(300_999));
    assert!(!back.is_valid(301_000));
}

/// Test unicode keys and values survive storage
pub fn test_unicode_values<S>(storage: S)
where
    S: KeyValueStorage,
{
    storage.kv_set("profile:żółw", "héllo 👋").unwrap();
    assert_eq!(
        storage.kv_get("profile:żółw").unwrap(),
        Some("héllo 👋".to_string())
    );
}
