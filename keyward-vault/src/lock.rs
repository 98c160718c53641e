//! Authentication and lock state of the active account.
//!
//! ```text
//!   LoggedOut --log_in--> Unlocked --lock--> Locked --unlock--> Unlocked
//!       ^                     |                 |
//!       +------log_out--------+-----log_out-----+
//! ```
//!
//! Key material lives only in the [`KeyRing`] held while `Unlocked`. Every
//! transition away from `Unlocked` drops the ring and awaits the registered
//! [`LockListener`]s before returning, so caches of decrypted views are gone
//! by the time `lock` or `log_out` resolves.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::timeout::{MaximumTimeoutPolicy, TimeoutSettings, VaultTimeout, VaultTimeoutAction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_crypto::{CryptoService, SymmetricKeyMaterial};
use keyward_model::{OrganizationKey, ProviderKey};
use keyward_storage::{StateStorage, StorageExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const ACTIVE_ACCOUNT_KEY: &str = "activeAccount";

fn timeout_settings_key(user_id: &str) -> String {
    format!("vaultTimeout_{user_id}")
}

// ============================================================================
// Status types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    LoggedOut,
    Locked,
    Unlocked,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoggedOut => "logged out",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        })
    }
}

/// Why the vault was locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// Explicit user action.
    User,
    /// Minute timeout elapsed without activity.
    Timeout,
    System(SystemEvent),
}

/// OS notifications that can trigger the configured timeout action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    Idle,
    Sleep,
    ScreenLocked,
}

impl SystemEvent {
    /// The timeout setting this event fires.
    fn timeout(self) -> VaultTimeout {
        match self {
            Self::Idle => VaultTimeout::OnIdle,
            Self::Sleep => VaultTimeout::OnSleep,
            Self::ScreenLocked => VaultTimeout::OnLocked,
        }
    }
}

// ============================================================================
// KeyRing
// ============================================================================

/// Decrypted keys of the unlocked account. Every key zeroizes on drop.
#[derive(Clone)]
pub struct KeyRing {
    user_key: SymmetricKeyMaterial,
    private_key: Option<Zeroizing<Vec<u8>>>,
    org_keys: HashMap<String, SymmetricKeyMaterial>,
    provider_keys: HashMap<String, SymmetricKeyMaterial>,
}

impl KeyRing {
    pub fn new(user_key: SymmetricKeyMaterial) -> Self {
        Self {
            user_key,
            private_key: None,
            org_keys: HashMap::new(),
            provider_keys: HashMap::new(),
        }
    }

    /// Adds the decrypted RSA private key (PKCS#8 DER).
    pub fn with_private_key(mut self, private_key: Vec<u8>) -> Self {
        self.private_key = Some(Zeroizing::new(private_key));
        self
    }

    pub fn with_organization_key(
        mut self,
        organization_id: impl Into<String>,
        key: SymmetricKeyMaterial,
    ) -> Self {
        self.org_keys.insert(organization_id.into(), key);
        self
    }

    pub fn user_key(&self) -> &SymmetricKeyMaterial {
        &self.user_key
    }

    pub fn private_key(&self) -> Option<&[u8]> {
        self.private_key.as_ref().map(|k| k.as_slice())
    }

    pub fn organization_key(&self, organization_id: &str) -> Option<&SymmetricKeyMaterial> {
        self.org_keys.get(organization_id)
    }

    pub fn provider_key(&self, provider_id: &str) -> Option<&SymmetricKeyMaterial> {
        self.provider_keys.get(provider_id)
    }

    /// The organization's key, or the user key for personal items.
    pub fn key_for(&self, organization_id: Option<&str>) -> Option<&SymmetricKeyMaterial> {
        match organization_id {
            Some(org) => self.org_keys.get(org),
            None => Some(&self.user_key),
        }
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("user_key", &"[REDACTED]")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("org_keys", &self.org_keys.len())
            .field("provider_keys", &self.provider_keys.len())
            .finish()
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Holders of decrypted state that must be purged on lock transitions.
#[async_trait]
pub trait LockListener: Send + Sync {
    /// Drop every decrypted view and derived key.
    async fn on_lock(&self);

    /// Also evict the user's persisted data.
    async fn on_logout(&self, _user_id: &str) {
        self.on_lock().await;
    }

    /// Organization or provider keys were replaced.
    async fn on_keys_changed(&self) {
        self.on_lock().await;
    }
}

// ============================================================================
// VaultLock
// ============================================================================

struct LockState {
    status: AuthStatus,
    user_id: Option<String>,
    keys: Option<KeyRing>,
    settings: Option<TimeoutSettings>,
    last_activity: Option<DateTime<Utc>>,
}

/// Process-wide lock state machine for the active account.
pub struct VaultLock {
    storage: Arc<dyn StateStorage>,
    config: VaultConfig,
    state: RwLock<LockState>,
    listeners: RwLock<Vec<Weak<dyn LockListener>>>,
}

impl VaultLock {
    /// Restores state from storage. An account that was authenticated before
    /// the process started comes back `Locked`: keys are never persisted, so
    /// a restart always requires an unlock.
    pub async fn load(storage: Arc<dyn StateStorage>, config: VaultConfig) -> VaultResult<Self> {
        let user_id: Option<String> = storage.get(ACTIVE_ACCOUNT_KEY).await?;
        let (status, settings) = match &user_id {
            Some(user) => {
                let settings: Option<TimeoutSettings> =
                    storage.get(&timeout_settings_key(user)).await?;
                info!("[VAULT] Restored account {} as locked", user);
                (AuthStatus::Locked, settings)
            }
            None => (AuthStatus::LoggedOut, None),
        };

        Ok(Self {
            storage,
            config,
            state: RwLock::new(LockState {
                status,
                user_id,
                keys: None,
                settings,
                last_activity: None,
            }),
            listeners: RwLock::new(Vec::new()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Synchronous status from in-memory state.
    pub fn auth_status(&self) -> AuthStatus {
        self.read().status
    }

    pub fn active_user(&self) -> Option<String> {
        self.read().user_id.clone()
    }

    /// The active user id, locked or not.
    pub fn require_authenticated(&self) -> VaultResult<String> {
        self.read().user_id.clone().ok_or(VaultError::NotAuthenticated)
    }

    /// The active user id, only while unlocked.
    pub fn require_unlocked(&self) -> VaultResult<String> {
        let state = self.read();
        match (&state.status, &state.user_id) {
            (AuthStatus::Unlocked, Some(user)) => Ok(user.clone()),
            (status, _) => Err(VaultError::Locked(*status)),
        }
    }

    /// A transient copy of the key ring for one operation.
    pub fn key_ring(&self) -> VaultResult<KeyRing> {
        let state = self.read();
        match (&state.status, &state.keys) {
            (AuthStatus::Unlocked, Some(keys)) => Ok(keys.clone()),
            (status, _) => Err(VaultError::Locked(*status)),
        }
    }

    pub fn user_key(&self) -> VaultResult<SymmetricKeyMaterial> {
        Ok(self.key_ring()?.user_key().clone())
    }

    pub fn key_for(&self, organization_id: Option<&str>) -> VaultResult<SymmetricKeyMaterial> {
        let keys = self.key_ring()?;
        keys.key_for(organization_id).cloned().ok_or_else(|| {
            VaultError::MissingOrganizationKey(organization_id.unwrap_or_default().to_string())
        })
    }

    /// Registers a listener. Only a weak reference is kept.
    pub fn add_listener<L: LockListener + 'static>(&self, listener: &Arc<L>) {
        let weak = Arc::downgrade(listener) as Weak<dyn LockListener>;
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(weak);
    }

    fn live_listeners(&self) -> Vec<Arc<dyn LockListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub async fn log_in(&self, user_id: &str, keys: KeyRing) -> VaultResult<()> {
        let status = self.auth_status();
        if status != AuthStatus::LoggedOut {
            return Err(VaultError::InvalidTransition {
                action: "log in",
                status,
            });
        }

        let settings: Option<TimeoutSettings> =
            self.storage.get(&timeout_settings_key(user_id)).await?;
        self.storage
            .save(ACTIVE_ACCOUNT_KEY, &user_id.to_string())
            .await?;

        let mut state = self.write();
        if state.status != AuthStatus::LoggedOut {
            return Err(VaultError::InvalidTransition {
                action: "log in",
                status: state.status,
            });
        }
        state.status = AuthStatus::Unlocked;
        state.user_id = Some(user_id.to_string());
        state.keys = Some(keys);
        state.settings = settings;
        state.last_activity = Some(Utc::now());
        info!("[VAULT] Logged in {}", user_id);
        Ok(())
    }

    /// Unlocks the active account with a freshly decrypted key ring.
    pub fn unlock(&self, keys: KeyRing) -> VaultResult<()> {
        let mut state = self.write();
        if state.status == AuthStatus::LoggedOut {
            return Err(VaultError::InvalidTransition {
                action: "unlock",
                status: AuthStatus::LoggedOut,
            });
        }
        state.status = AuthStatus::Unlocked;
        state.keys = Some(keys);
        state.last_activity = Some(Utc::now());
        info!("[VAULT] Unlocked {}", state.user_id.as_deref().unwrap_or_default());
        Ok(())
    }

    /// Drops all key material and purges listeners. Locking an already
    /// locked vault is a no-op.
    pub async fn lock(&self, reason: LockReason) -> VaultResult<()> {
        {
            let mut state = self.write();
            match state.status {
                AuthStatus::LoggedOut => {
                    return Err(VaultError::InvalidTransition {
                        action: "lock",
                        status: AuthStatus::LoggedOut,
                    });
                }
                AuthStatus::Locked => return Ok(()),
                AuthStatus::Unlocked => {}
            }
            state.status = AuthStatus::Locked;
            state.keys = None;
            state.last_activity = None;
            info!("[VAULT] Locked ({:?})", reason);
        }

        for listener in self.live_listeners() {
            listener.on_lock().await;
        }
        Ok(())
    }

    /// Forgets the active account and evicts its persisted data through the
    /// listeners. Logging out while logged out is a no-op.
    pub async fn log_out(&self) -> VaultResult<()> {
        let user_id = {
            let mut state = self.write();
            let Some(user_id) = state.user_id.take() else {
                return Ok(());
            };
            state.status = AuthStatus::LoggedOut;
            state.keys = None;
            state.settings = None;
            state.last_activity = None;
            user_id
        };

        // Listeners run even when storage fails; the error surfaces after.
        let removed = self.storage.remove(ACTIVE_ACCOUNT_KEY).await;
        for listener in self.live_listeners() {
            listener.on_logout(&user_id).await;
        }
        if let Err(e) = &removed {
            warn!("[VAULT] Failed to clear the active account of {}: {}", user_id, e);
        }
        info!("[VAULT] Logged out {}", user_id);
        Ok(removed?)
    }

    /// Re-keys the ring with a new set of organization and provider keys.
    ///
    /// Keys that fail to decrypt are skipped. Listeners are told to drop
    /// views decrypted under the old keys.
    pub async fn set_organization_keys(
        &self,
        crypto: &dyn CryptoService,
        org_keys: &[OrganizationKey],
        provider_keys: &[ProviderKey],
    ) -> VaultResult<()> {
        let user_id = self.require_unlocked()?;
        let ring = self.key_ring()?;
        let private_key = ring.private_key();

        let mut providers = HashMap::new();
        for record in provider_keys {
            let Some(private_key) = private_key else {
                warn!("[VAULT] No private key; skipping provider {}", record.provider_id);
                continue;
            };
            match record.decrypt(crypto, private_key).await {
                Ok(key) => {
                    providers.insert(record.provider_id.clone(), key);
                }
                Err(e) => warn!("[VAULT] Skipping provider key {}: {}", record.provider_id, e),
            }
        }

        let mut orgs = HashMap::new();
        for record in org_keys {
            match record.decrypt(crypto, private_key, &providers).await {
                Ok(key) => {
                    orgs.insert(record.organization_id().to_string(), key);
                }
                Err(e) => warn!(
                    "[VAULT] Skipping organization key {}: {}",
                    record.organization_id(),
                    e
                ),
            }
        }
        drop(ring);

        {
            let mut guard = self.write();
            let state = &mut *guard;
            let same_user = state.user_id.as_deref() == Some(user_id.as_str());
            match (&state.status, state.keys.as_mut()) {
                (AuthStatus::Unlocked, Some(keys)) if same_user => {
                    keys.org_keys = orgs;
                    keys.provider_keys = providers;
                    debug!(
                        "[VAULT] Key ring now holds {} organization keys",
                        keys.org_keys.len()
                    );
                }
                (status, _) => return Err(VaultError::Locked(*status)),
            }
        }

        for listener in self.live_listeners() {
            listener.on_keys_changed().await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Activity and timeouts
    // ------------------------------------------------------------------------

    pub fn record_activity(&self, now: DateTime<Utc>) {
        let mut state = self.write();
        if state.status == AuthStatus::Unlocked {
            state.last_activity = Some(now);
        }
    }

    /// Applies the timeout action if a minute timeout elapsed since the last
    /// recorded activity. Returns the action taken.
    pub async fn check_timeout(&self, now: DateTime<Utc>) -> VaultResult<Option<VaultTimeoutAction>> {
        let settings = self.timeout_settings();
        let expired = {
            let state = self.read();
            match (state.status, settings.timeout, state.last_activity) {
                (AuthStatus::Unlocked, VaultTimeout::Minutes(minutes), Some(last)) => {
                    now - last >= chrono::Duration::minutes(i64::from(minutes))
                }
                _ => false,
            }
        };
        if !expired {
            return Ok(None);
        }
        let action = settings.effective_action();
        self.apply(action, LockReason::Timeout).await?;
        Ok(Some(action))
    }

    /// Applies the timeout action when `event` matches the configured
    /// sentinel timeout. Returns the action taken.
    pub async fn handle_system_event(
        &self,
        event: SystemEvent,
    ) -> VaultResult<Option<VaultTimeoutAction>> {
        let settings = self.timeout_settings();
        if self.auth_status() != AuthStatus::Unlocked || settings.timeout != event.timeout() {
            return Ok(None);
        }
        let action = settings.effective_action();
        self.apply(action, LockReason::System(event)).await?;
        Ok(Some(action))
    }

    async fn apply(&self, action: VaultTimeoutAction, reason: LockReason) -> VaultResult<()> {
        match action {
            VaultTimeoutAction::Lock => self.lock(reason).await,
            VaultTimeoutAction::LogOut => self.log_out().await,
        }
    }

    /// Current settings of the active account, or the configured defaults.
    pub fn timeout_settings(&self) -> TimeoutSettings {
        self.read().settings.unwrap_or(TimeoutSettings {
            timeout: self.config.default_timeout,
            action: self.config.default_timeout_action,
            policy: None,
        })
    }

    /// Validates and persists the user's timeout choice. A policy already in
    /// force keeps applying when `policy` is `None`.
    pub async fn set_timeout_settings(
        &self,
        timeout: VaultTimeout,
        action: VaultTimeoutAction,
        policy: Option<MaximumTimeoutPolicy>,
    ) -> VaultResult<TimeoutSettings> {
        let user_id = self.require_authenticated()?;
        let policy = policy.or(self.timeout_settings().policy);
        timeout.validate()?;
        if let Some(policy) = &policy {
            policy.validate(timeout)?;
        }

        let settings = TimeoutSettings {
            timeout,
            action,
            policy,
        };
        self.persist_settings(&user_id, settings).await?;
        Ok(settings)
    }

    /// Installs an administrator policy, clamping the current choice into it.
    pub async fn apply_timeout_policy(
        &self,
        policy: MaximumTimeoutPolicy,
    ) -> VaultResult<TimeoutSettings> {
        let user_id = self.require_authenticated()?;
        let current = self.timeout_settings();
        let settings = TimeoutSettings {
            timeout: policy.clamp(current.timeout),
            action: current.action,
            policy: Some(policy),
        };
        if settings.timeout != current.timeout {
            info!(
                "[VAULT] Timeout {} clamped to {} by policy",
                current.timeout, settings.timeout
            );
        }
        self.persist_settings(&user_id, settings).await?;
        Ok(settings)
    }

    async fn persist_settings(&self, user_id: &str, settings: TimeoutSettings) -> VaultResult<()> {
        self.storage
            .save(&timeout_settings_key(user_id), &settings)
            .await?;
        let mut state = self.write();
        if state.user_id.as_deref() == Some(user_id) {
            state.settings = Some(settings);
        }
        Ok(())
    }
}
