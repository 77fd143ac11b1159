//! Credential store integration tests

use aura_companion::auth::{AuthError, CredentialStore};

fn store() -> (tempfile::TempDir, CredentialStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(&dir.path().join("aura"));
    (dir, store)
}

#[test]
fn test_signup_then_login() {
    let (_dir, store) = store();

    assert_eq!(
        store.signup("nova@aura.dev", "hunter2", "Nova").unwrap(),
        "Nova"
    );
    assert!(store.path().exists());
    assert_eq!(store.login("nova@aura.dev", "hunter2").unwrap(), "Nova");
}

#[test]
fn test_accounts_persist_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    CredentialStore::new(dir.path())
        .signup("kai@aura.dev", "pw", "Kai")
        .unwrap();

    let reopened = CredentialStore::new(dir.path());
    assert_eq!(reopened.users().unwrap().len(), 1);
    assert_eq!(reopened.login("kai@aura.dev", "pw").unwrap(), "Kai");
}

#[test]
fn test_empty_store_has_no_users() {
    let (_dir, store) = store();
    assert!(store.users().unwrap().is_empty());
    assert_eq!(
        store.login("nova@aura.dev", "pw"),
        Err(AuthError::UnknownEmail)
    );
}

#[test]
fn test_signup_rejections_in_order() {
    let (_dir, store) = store();

    assert_eq!(
        store.signup("", "pw", "Nova"),
        Err(AuthError::MissingFields)
    );
    assert_eq!(
        store.signup("nova@aura.dev", "pw", "  "),
        Err(AuthError::MissingFields)
    );
    // Missing fields win over a malformed address
    assert_eq!(
        store.signup("not-an-email", "", "Nova"),
        Err(AuthError::MissingFields)
    );
    assert_eq!(
        store.signup("not-an-email", "pw", "Nova"),
        Err(AuthError::InvalidEmail)
    );

    store.signup("nova@aura.dev", "pw", "Nova").unwrap();

    // Duplicate e-mail is reported before a duplicate callsign
    assert_eq!(
        store.signup("nova@aura.dev", "pw", "NOVA"),
        Err(AuthError::EmailTaken)
    );
    assert_eq!(
        store.signup("other@aura.dev", "pw", "nOvA"),
        Err(AuthError::CallsignTaken)
    );
    assert_eq!(store.users().unwrap().len(), 1);
}

#[test]
fn test_login_rejections() {
    let (_dir, store) = store();
    store.signup("nova@aura.dev", "secret", "Nova").unwrap();

    assert_eq!(
        store.login("", "secret"),
        Err(AuthError::MissingCredentials)
    );
    assert_eq!(
        store.login("nova@aura.dev", ""),
        Err(AuthError::MissingCredentials)
    );
    assert_eq!(
        store.login("ghost@aura.dev", "secret"),
        Err(AuthError::UnknownEmail)
    );
    assert_eq!(
        store.login("nova@aura.dev", "Secret"),
        Err(AuthError::WrongPassword)
    );
    // E-mail match is exact
    assert_eq!(
        store.login("NOVA@aura.dev", "secret"),
        Err(AuthError::UnknownEmail)
    );
}

#[test]
fn test_corrupt_store_is_storage_error() {
    let (_dir, store) = store();
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), "{not json").unwrap();

    assert!(matches!(store.users(), Err(AuthError::Storage(_))));
    assert!(matches!(
        store.signup("nova@aura.dev", "pw", "Nova"),
        Err(AuthError::Storage(_))
    ));
    // The corrupt file is left untouched
    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{not json");
}
