//! Rate limit storage test functions

use agora_storage_traits::rate_limit::RateLimitStorage;
use agora_storage_traits::rate_limit::types::RateLimitRecord;

/// Test save, get, update and remove of a counter
pub fn test_save_get_remove<S>(storage: S)
where
    S: RateLimitStorage,
{
    assert_eq!(storage.rate_limit_get("id-1", "otp").unwrap(), None);

    let mut record = RateLimitRecord::first_attempt("id-1", "otp", 1_000);
    storage.rate_limit_save(&record).unwrap();
    assert_eq!(
        storage.rate_limit_get("id-1", "otp").unwrap(),
        Some(record.clone())
    );

    record.attempt_count = 4;
    record.blocked_until = Some(301_000);
    storage.rate_limit_save(&record).unwrap();
    assert_eq!(
        storage.rate_limit_get("id-1", "otp").unwrap(),
        Some(record)
    );

    storage.rate_limit_remove("id-1", "otp").unwrap();
    assert_eq!(storage.rate_limit_get("id-1", "otp").unwrap(), None);
    storage.rate_limit_remove("id-1", "otp").unwrap();
}

/// Test counters are keyed by both identifier and action
pub fn test_keyed_by_identifier_and_action<S>(storage: S)
where
    S: RateLimitStorage,
{
    let otp = RateLimitRecord::first_attempt("id-1", "otp", 1);
    let mut login = RateLimitRecord::first_attempt("id-1", "login", 2);
    login.attempt_count = 2;
    let other = RateLimitRecord::first_attempt("id-2", "otp", 3);

    storage.rate_limit_save(&otp).unwrap();
    storage.rate_limit_save(&login).unwrap();
    storage.rate_limit_save(&other).unwrap();

    assert_eq!(storage.rate_limit_get("id-1", "otp").unwrap(), Some(otp));
    assert_eq!(storage.rate_limit_get("id-1", "login").unwrap(), Some(login));
    assert_eq!(storage.rate_limit_get("id-2", "otp").unwrap(), Some(other));
}
