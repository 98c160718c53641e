mod support;

use chrono::{Duration, Utc};
use keyward_crypto::{CryptoService, SymmetricKeyMaterial};
use keyward_model::{OrganizationKey, ProviderKey};
use keyward_storage::{StateStorage, StorageExt};
use keyward_vault::{
    AuthStatus, KeyRing, LockReason, SystemEvent, Vault, VaultConfig, VaultError, VaultTimeout,
    VaultTimeoutAction,
};
use std::sync::Arc;
use support::{FailingRemoveStorage, FakeAsymmetricCrypto, Harness, USER, login};

#[tokio::test]
async fn fresh_storage_starts_logged_out() {
    let h = Harness::new().await;
    assert_eq!(h.vault.auth_status(), AuthStatus::LoggedOut);
    assert!(matches!(
        h.vault.lock.user_key(),
        Err(VaultError::Locked(AuthStatus::LoggedOut))
    ));
}

#[tokio::test]
async fn login_lock_unlock_logout_cycle() {
    support::init_tracing();
    let h = Harness::new().await;

    h.vault.lock.log_in(USER, h.key_ring()).await.unwrap();
    assert_eq!(h.vault.auth_status(), AuthStatus::Unlocked);
    assert_eq!(h.vault.lock.user_key().unwrap(), h.user_key);

    h.vault.lock.lock(LockReason::User).await.unwrap();
    assert_eq!(h.vault.auth_status(), AuthStatus::Locked);
    assert!(matches!(
        h.vault.lock.key_ring(),
        Err(VaultError::Locked(AuthStatus::Locked))
    ));
    // Locking twice is harmless.
    h.vault.lock.lock(LockReason::User).await.unwrap();

    h.vault.lock.unlock(h.key_ring()).unwrap();
    assert_eq!(h.vault.auth_status(), AuthStatus::Unlocked);

    h.vault.lock.log_out().await.unwrap();
    assert_eq!(h.vault.auth_status(), AuthStatus::LoggedOut);
    assert!(h.vault.lock.active_user().is_none());
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let h = Harness::new().await;
    assert!(matches!(
        h.vault.lock.unlock(h.key_ring()),
        Err(VaultError::InvalidTransition { status: AuthStatus::LoggedOut, .. })
    ));
    assert!(matches!(
        h.vault.lock.lock(LockReason::User).await,
        Err(VaultError::InvalidTransition { .. })
    ));

    h.vault.lock.log_in(USER, h.key_ring()).await.unwrap();
    assert!(matches!(
        h.vault.lock.log_in("someone-else", h.key_ring()).await,
        Err(VaultError::InvalidTransition { status: AuthStatus::Unlocked, .. })
    ));
}

#[tokio::test]
async fn restart_restores_locked() {
    let h = Harness::logged_in().await;
    let storage = h.storage.clone();
    drop(h);

    let restarted = Harness::with_storage(storage).await;
    assert_eq!(restarted.vault.auth_status(), AuthStatus::Locked);
    assert_eq!(restarted.vault.lock.active_user().as_deref(), Some(USER));
    assert!(restarted.vault.lock.user_key().is_err());
}

#[tokio::test]
async fn decrypt_paths_are_refused_while_locked() {
    let h = Harness::logged_in().await;
    let saved = h.vault.ciphers.save(&login("Bank", "https://bank.com")).await.unwrap();
    h.vault.lock.lock(LockReason::User).await.unwrap();

    assert!(matches!(
        h.vault.ciphers.get_all_decrypted().await,
        Err(VaultError::Locked(AuthStatus::Locked))
    ));
    assert!(matches!(
        h.vault.ciphers.get_decrypted(&saved.id).await,
        Err(VaultError::Locked(_))
    ));
    assert!(matches!(
        h.vault.ciphers.get_next_for_url("https://bank.com").await,
        Err(VaultError::Locked(_))
    ));
    assert!(matches!(
        h.vault.ciphers.get_last_used_for_url("https://bank.com").await,
        Err(VaultError::Locked(_))
    ));
    assert!(matches!(
        h.vault.ciphers.encrypt(&login("x", "x.com")).await,
        Err(VaultError::Locked(_))
    ));
    assert!(matches!(
        h.vault.folders.get_all_decrypted().await,
        Err(VaultError::Locked(_))
    ));
    assert!(matches!(
        h.vault.sends.get_all_decrypted().await,
        Err(VaultError::Locked(_))
    ));

    // Encrypted data is still there, and reachable again after unlock.
    assert!(h.vault.ciphers.get(&saved.id).await.unwrap().is_some());
    h.vault.lock.unlock(h.key_ring()).unwrap();
    assert_eq!(h.vault.ciphers.get_all_decrypted().await.unwrap().len(), 1);
}

#[tokio::test]
async fn lock_clears_decrypted_caches() {
    let h = Harness::logged_in().await;
    h.vault.ciphers.save(&login("Bank", "https://bank.com")).await.unwrap();
    let first = h.vault.ciphers.get_next_for_url("https://bank.com").await.unwrap();
    assert_eq!(first.unwrap().name, "Bank");

    h.vault.lock.lock(LockReason::User).await.unwrap();

    // Unlock with a different key: anything still cached would leak through.
    h.vault.lock.unlock(KeyRing::new(SymmetricKeyMaterial::generate())).unwrap();
    let after = h.vault.ciphers.get_all_decrypted().await.unwrap();
    assert_eq!(after.len(), 1);
    assert!(after[0].decryption_failed);
    assert!(h.vault.ciphers.get_next_for_url("https://bank.com").await.unwrap().is_none());
}

#[tokio::test]
async fn logout_evicts_persisted_entities() {
    let h = Harness::logged_in().await;
    let saved = h.vault.ciphers.save(&login("Bank", "https://bank.com")).await.unwrap();
    h.vault.ciphers.update_last_used_date(&saved.id, Utc::now()).await.unwrap();
    assert!(h.storage.has(&format!("ciphers_{USER}")).await.unwrap());

    h.vault.lock.log_out().await.unwrap();

    assert!(!h.storage.has(&format!("ciphers_{USER}")).await.unwrap());
    assert!(!h.storage.has(&format!("localData_{USER}")).await.unwrap());
    assert!(!h.storage.has("activeAccount").await.unwrap());
    assert!(matches!(
        h.vault.ciphers.get(&saved.id).await,
        Err(VaultError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn logout_clears_caches_even_when_storage_fails() {
    let storage = Arc::new(FailingRemoveStorage::new("activeAccount"));
    let vault = Vault::open(
        VaultConfig::default(),
        Arc::new(FakeAsymmetricCrypto::default()),
        storage.clone(),
    )
    .await
    .unwrap();
    let key = SymmetricKeyMaterial::generate();

    vault.lock.log_in(USER, KeyRing::new(key.clone())).await.unwrap();
    vault.ciphers.save(&login("Bank", "https://bank.com")).await.unwrap();
    let warm = vault.ciphers.get_next_for_url("https://bank.com").await.unwrap();
    assert_eq!(warm.unwrap().name, "Bank");

    let result = vault.lock.log_out().await;
    assert!(matches!(result, Err(VaultError::Storage(_))));
    assert_eq!(vault.auth_status(), AuthStatus::LoggedOut);
    assert!(!storage.has(&format!("ciphers_{USER}")).await.unwrap());

    // Same key again: a surviving cache would hand back the old views.
    vault.lock.log_in(USER, KeyRing::new(key)).await.unwrap();
    assert!(vault.ciphers.get_all_decrypted().await.unwrap().is_empty());
    assert!(vault.ciphers.get_next_for_url("https://bank.com").await.unwrap().is_none());
}

#[tokio::test]
async fn minute_timeout_applies_configured_action() {
    let h = Harness::logged_in().await;
    h.vault
        .lock
        .set_timeout_settings(VaultTimeout::Minutes(5), VaultTimeoutAction::Lock, None)
        .await
        .unwrap();

    let start = Utc::now();
    h.vault.lock.record_activity(start);
    assert_eq!(
        h.vault.lock.check_timeout(start + Duration::minutes(4)).await.unwrap(),
        None
    );
    assert_eq!(
        h.vault.lock.check_timeout(start + Duration::minutes(5)).await.unwrap(),
        Some(VaultTimeoutAction::Lock)
    );
    assert_eq!(h.vault.auth_status(), AuthStatus::Locked);

    // Nothing more to do once locked.
    assert_eq!(
        h.vault.lock.check_timeout(start + Duration::minutes(60)).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn timeout_with_log_out_action_logs_out() {
    let h = Harness::logged_in().await;
    h.vault
        .lock
        .set_timeout_settings(VaultTimeout::Minutes(1), VaultTimeoutAction::LogOut, None)
        .await
        .unwrap();
    let start = Utc::now();
    h.vault.lock.record_activity(start);

    let action = h.vault.lock.check_timeout(start + Duration::minutes(2)).await.unwrap();
    assert_eq!(action, Some(VaultTimeoutAction::LogOut));
    assert_eq!(h.vault.auth_status(), AuthStatus::LoggedOut);
}

#[tokio::test]
async fn activity_postpones_timeout() {
    let h = Harness::logged_in().await;
    h.vault
        .lock
        .set_timeout_settings(VaultTimeout::Minutes(5), VaultTimeoutAction::Lock, None)
        .await
        .unwrap();
    let start = Utc::now();
    h.vault.lock.record_activity(start);
    h.vault.lock.record_activity(start + Duration::minutes(4));

    assert_eq!(
        h.vault.lock.check_timeout(start + Duration::minutes(6)).await.unwrap(),
        None
    );
    assert_eq!(h.vault.auth_status(), AuthStatus::Unlocked);
}

#[tokio::test]
async fn system_events_fire_only_their_sentinel() {
    let h = Harness::logged_in().await;
    h.vault
        .lock
        .set_timeout_settings(VaultTimeout::OnSleep, VaultTimeoutAction::Lock, None)
        .await
        .unwrap();

    assert_eq!(h.vault.lock.handle_system_event(SystemEvent::Idle).await.unwrap(), None);
    assert_eq!(
        h.vault.lock.handle_system_event(SystemEvent::ScreenLocked).await.unwrap(),
        None
    );
    assert_eq!(h.vault.auth_status(), AuthStatus::Unlocked);

    assert_eq!(
        h.vault.lock.handle_system_event(SystemEvent::Sleep).await.unwrap(),
        Some(VaultTimeoutAction::Lock)
    );
    assert_eq!(h.vault.auth_status(), AuthStatus::Locked);
}

#[tokio::test]
async fn sentinel_timeouts_ignore_minute_checks() {
    let h = Harness::logged_in().await;
    h.vault
        .lock
        .set_timeout_settings(VaultTimeout::OnIdle, VaultTimeoutAction::Lock, None)
        .await
        .unwrap();
    let action = h
        .vault
        .lock
        .check_timeout(Utc::now() + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(action, None);
    assert_eq!(
        h.vault.lock.handle_system_event(SystemEvent::Idle).await.unwrap(),
        Some(VaultTimeoutAction::Lock)
    );
}

#[tokio::test]
async fn organization_key_rotation_rekeys_and_clears_caches() {
    let h = Harness::new().await;
    let crypto = h.crypto.clone();
    let private_key = SymmetricKeyMaterial::generate();
    let org_key = SymmetricKeyMaterial::generate();
    let provider_key = SymmetricKeyMaterial::generate();
    let provider_org_key = SymmetricKeyMaterial::generate();

    h.vault
        .lock
        .log_in(
            USER,
            h.key_ring().with_private_key(private_key.as_bytes().to_vec()),
        )
        .await
        .unwrap();

    let mut org_item = login("Shared", "https://team.example.com");
    org_item.organization_id = Some("org-1".into());

    // No organization keys yet.
    assert!(matches!(
        h.vault.ciphers.encrypt(&org_item).await,
        Err(VaultError::MissingOrganizationKey(org)) if org == "org-1"
    ));

    let org_keys = vec![
        OrganizationKey::Organization {
            organization_id: "org-1".into(),
            key: crypto.encrypt(org_key.as_bytes(), &private_key).await.unwrap(),
        },
        OrganizationKey::Provider {
            organization_id: "org-2".into(),
            provider_id: "prov-1".into(),
            key: crypto
                .encrypt(provider_org_key.as_bytes(), &provider_key)
                .await
                .unwrap(),
        },
        OrganizationKey::Organization {
            organization_id: "org-broken".into(),
            key: crypto
                .encrypt(b"garbage", &SymmetricKeyMaterial::generate())
                .await
                .unwrap(),
        },
    ];
    let provider_keys = vec![ProviderKey {
        provider_id: "prov-1".into(),
        key: crypto.encrypt(provider_key.as_bytes(), &private_key).await.unwrap(),
    }];

    h.vault.ciphers.save(&login("Personal", "https://team.example.com")).await.unwrap();
    assert_eq!(h.vault.ciphers.get_all_decrypted().await.unwrap().len(), 1);

    h.vault
        .lock
        .set_organization_keys(crypto.as_ref(), &org_keys, &provider_keys)
        .await
        .unwrap();

    assert_eq!(h.vault.lock.key_for(Some("org-1")).unwrap(), org_key);
    assert_eq!(h.vault.lock.key_for(Some("org-2")).unwrap(), provider_org_key);
    assert!(h.vault.lock.key_for(Some("org-broken")).is_err());

    // The org item now encrypts under the org key and shows up after the
    // rotation cleared the decrypted cache.
    let shared = h.vault.ciphers.save(&org_item).await.unwrap();
    assert_eq!(
        crypto.decrypt_str(&shared.name, &org_key).await.unwrap(),
        "Shared"
    );
    let names: Vec<String> = h
        .vault
        .ciphers
        .get_all_decrypted()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Shared".to_string()));
}

#[tokio::test]
async fn org_items_without_a_key_become_placeholders() {
    let h = Harness::logged_in().await;
    let org_key = SymmetricKeyMaterial::generate();
    let mut item = login("Team", "https://team.example.com");
    item.organization_id = Some("org-9".into());
    let mut cipher = keyward_model::Encryptable::encrypt(&item, h.crypto.as_ref(), &org_key)
        .await
        .unwrap();
    cipher.revision_date = Utc::now();
    h.vault.ciphers.upsert(cipher).await.unwrap();
    h.vault.ciphers.save(&login("Mine", "https://mine.example.com")).await.unwrap();

    let views = h.vault.ciphers.get_all_decrypted().await.unwrap();
    assert_eq!(views.len(), 2);
    let failed: Vec<_> = views.iter().filter(|v| v.decryption_failed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, keyward_model::UNDECRYPTABLE_NAME);
}

#[tokio::test]
async fn listeners_are_weak() {
    let h = Harness::logged_in().await;
    let storage: Arc<dyn StateStorage> = h.storage.clone();
    let extra = keyward_vault::SendService::new(h.crypto.clone(), storage, h.vault.lock.clone());
    drop(extra);
    // A dropped listener must not break lock transitions.
    h.vault.lock.lock(LockReason::User).await.unwrap();
    assert_eq!(h.vault.auth_status(), AuthStatus::Locked);
}

#[tokio::test]
async fn timeout_settings_persist_per_user() {
    let h = Harness::logged_in().await;
    h.vault
        .lock
        .set_timeout_settings(VaultTimeout::OnRestart, VaultTimeoutAction::LogOut, None)
        .await
        .unwrap();

    let stored: Option<keyward_vault::TimeoutSettings> =
        h.storage.get(&format!("vaultTimeout_{USER}")).await.unwrap();
    assert_eq!(stored.unwrap().timeout, VaultTimeout::OnRestart);

    let storage = h.storage.clone();
    drop(h);
    let restarted = Harness::with_storage(storage).await;
    let settings = restarted.vault.lock.timeout_settings();
    assert_eq!(settings.timeout, VaultTimeout::OnRestart);
    assert_eq!(settings.action, VaultTimeoutAction::LogOut);
}
