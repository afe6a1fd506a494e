//! Structured object storage test functions

use agora_storage_traits::StorageError;
use agora_storage_traits::objects::types::{Collection, StoredObject};
use agora_storage_traits::objects::{OBJECT_STORE_VERSION, ObjectStorage};

use super::{create_test_post, create_test_profile, create_test_story};

/// Test init is idempotent and keeps stored objects
pub fn test_init_idempotent<S>(storage: S)
where
    S: ObjectStorage,
{
    assert_eq!(storage.objects_init().unwrap(), OBJECT_STORE_VERSION);
    let post = StoredObject::new(create_test_post("p1", "hello"), 10);
    storage.objects_put(Collection::Posts, "p1", &post).unwrap();

    assert_eq!(storage.objects_init().unwrap(), OBJECT_STORE_VERSION);
    assert_eq!(
        storage.objects_get(Collection::Posts, "p1").unwrap(),
        Some(post)
    );
}

/// Test put stamps are returned unchanged and the last write wins
pub fn test_put_get_last_write_wins<S>(storage: S)
where
    S: ObjectStorage,
{
    storage.objects_init().unwrap();
    let first = StoredObject::new(create_test_post("p1", "first"), 100);
    let second = StoredObject::new(create_test_post("p1", "second"), 200);

    storage.objects_put(Collection::Posts, "p1", &first).unwrap();
    storage.objects_put(Collection::Posts, "p1", &second).unwrap();

    let found = storage.objects_get(Collection::Posts, "p1").unwrap().unwrap();
    assert_eq!(found, second);
    assert_eq!(found.timestamp, 200);
}

/// Test a put without an explicit init opens the store lazily
pub fn test_put_without_init<S>(storage: S)
where
    S: ObjectStorage,
{
    let story = StoredObject::new(create_test_story("s1"), 5);
    storage
        .objects_put(Collection::Stories, "s1", &story)
        .unwrap();
    assert_eq!(
        storage.objects_get(Collection::Stories, "s1").unwrap(),
        Some(story)
    );
}

/// Test collections are isolated from each other
pub fn test_collections_isolated<S>(storage: S)
where
    S: ObjectStorage,
{
    storage.objects_init().unwrap();
    let post = StoredObject::new(create_test_post("x", "post"), 1);
    let profile = StoredObject::new(create_test_profile("x"), 1);
    storage.objects_put(Collection::Posts, "x", &post).unwrap();
    storage
        .objects_put(Collection::Profiles, "x", &profile)
        .unwrap();

    assert_eq!(
        storage.objects_get(Collection::Posts, "x").unwrap(),
        Some(post)
    );
    assert_eq!(
        storage.objects_get(Collection::Profiles, "x").unwrap(),
        Some(profile)
    );
    assert_eq!(storage.objects_get(Collection::Reels, "x").unwrap(), None);
}

/// Test writing a value into the wrong collection is rejected
pub fn test_collection_mismatch<S>(storage: S)
where
    S: ObjectStorage,
{
    storage.objects_init().unwrap();
    let profile = StoredObject::new(create_test_profile("u1"), 1);
    let err = storage
        .objects_put(Collection::Posts, "u1", &profile)
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::CollectionMismatch {
            expected: "posts".to_string(),
            actual: "profiles".to_string(),
        }
    );
    assert!(storage.objects_get_all(Collection::Posts).unwrap().is_empty());
}

/// Test get_all returns every object ordered by key, regardless of age
pub fn test_get_all_ordered<S>(storage: S)
where
    S: ObjectStorage,
{
    storage.objects_init().unwrap();
    for (key, ts) in [("p3", 3), ("p1", 1), ("p2", 2)] {
        let obj = StoredObject::new(create_test_post(key, key), ts);
        storage.objects_put(Collection::Posts, key, &obj).unwrap();
    }

    let all = storage.objects_get_all(Collection::Posts).unwrap();
    let ids: Vec<&str> = all.iter().map(|o| o.value.id()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);
}

/// Test clear and clear_all
pub fn test_clear_and_clear_all<S>(storage: S)
where
    S: ObjectStorage,
{
    storage.objects_init().unwrap();
    let post = StoredObject::new(create_test_post("p1", "a"), 1);
    let profile = StoredObject::new(create_test_profile("u1"), 1);
    storage.objects_put(Collection::Posts, "p1", &post).unwrap();
    storage
        .objects_put(Collection::Profiles, "u1", &profile)
        .unwrap();

    storage.objects_clear(Collection::Posts).unwrap();
    assert!(storage.objects_get_all(Collection::Posts).unwrap().is_empty());
    assert_eq!(storage.objects_get_all(Collection::Profiles).unwrap().len(), 1);

    storage.objects_clear_all().unwrap();
    for collection in Collection::ALL {
        assert!(storage.objects_get_all(collection).unwrap().is_empty());
    }

    // The store stays usable after a full clear
    storage.objects_put(Collection::Posts, "p1", &post).unwrap();
    assert!(storage.objects_get(Collection::Posts, "p1").unwrap().is_some());
}
