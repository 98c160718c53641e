//! Vault timeout values and the administrator maximum-timeout policy.
//!
//! Wire values: positive minute counts, `-1` on restart, `-2` on OS lock,
//! `-3` on sleep, `-4` on idle, `null` for never.

use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Option<i32>", into = "Option<i32>")]
pub enum VaultTimeout {
    /// Lock after this many minutes without activity. Always positive.
    Minutes(u32),
    OnIdle,
    OnSleep,
    OnLocked,
    OnRestart,
    Never,
}

impl VaultTimeout {
    const ON_RESTART: i32 = -1;
    const ON_LOCKED: i32 = -2;
    const ON_SLEEP: i32 = -3;
    const ON_IDLE: i32 = -4;

    pub fn from_wire(value: Option<i32>) -> VaultResult<Self> {
        match value {
            None => Ok(Self::Never),
            Some(Self::ON_RESTART) => Ok(Self::OnRestart),
            Some(Self::ON_LOCKED) => Ok(Self::OnLocked),
            Some(Self::ON_SLEEP) => Ok(Self::OnSleep),
            Some(Self::ON_IDLE) => Ok(Self::OnIdle),
            Some(n) if n > 0 => Ok(Self::Minutes(n as u32)),
            Some(n) => Err(VaultError::InvalidTimeout(format!(
                "{n} is neither a positive minute count nor a known sentinel"
            ))),
        }
    }

    pub fn to_wire(self) -> Option<i32> {
        match self {
            Self::Minutes(n) => Some(i32::try_from(n).unwrap_or(i32::MAX)),
            Self::OnIdle => Some(Self::ON_IDLE),
            Self::OnSleep => Some(Self::ON_SLEEP),
            Self::OnLocked => Some(Self::ON_LOCKED),
            Self::OnRestart => Some(Self::ON_RESTART),
            Self::Never => None,
        }
    }

    /// Rejects `Minutes(0)`, the only unrepresentable value.
    pub fn validate(self) -> VaultResult<()> {
        match self {
            Self::Minutes(0) => Err(VaultError::InvalidTimeout(
                "minute timeout must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl TryFrom<Option<i32>> for VaultTimeout {
    type Error = VaultError;

    fn try_from(value: Option<i32>) -> Result<Self, Self::Error> {
        Self::from_wire(value)
    }
}

impl From<VaultTimeout> for Option<i32> {
    fn from(value: VaultTimeout) -> Self {
        value.to_wire()
    }
}

impl fmt::Display for VaultTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes(n) => write!(f, "{n} minutes"),
            Self::OnIdle => f.write_str("on idle"),
            Self::OnSleep => f.write_str("on sleep"),
            Self::OnLocked => f.write_str("on system lock"),
            Self::OnRestart => f.write_str("on restart"),
            Self::Never => f.write_str("never"),
        }
    }
}

/// What happens when the timeout fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultTimeoutAction {
    #[default]
    Lock,
    LogOut,
}

/// Administrator-imposed ceiling on the vault timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaximumTimeoutPolicy {
    pub minutes: u32,
    /// Forces this action regardless of the user's choice.
    #[serde(default)]
    pub action: Option<VaultTimeoutAction>,
}

impl MaximumTimeoutPolicy {
    pub fn new(minutes: u32) -> Self {
        Self {
            minutes,
            action: None,
        }
    }

    /// Checks a user-chosen timeout against the policy.
    ///
    /// Event sentinels (idle, sleep, OS lock) always fire before any
    /// minute ceiling and are allowed.
    pub fn validate(&self, timeout: VaultTimeout) -> VaultResult<()> {
        timeout.validate()?;
        match timeout {
            VaultTimeout::Minutes(n) if n > self.minutes => Err(VaultError::PolicyViolation(
                format!("{n} minutes exceeds the maximum of {}", self.minutes),
            )),
            VaultTimeout::Never | VaultTimeout::OnRestart => Err(VaultError::PolicyViolation(
                format!("{timeout} is not allowed with a maximum of {} minutes", self.minutes),
            )),
            _ => Ok(()),
        }
    }

    /// Maps an out-of-policy timeout to the policy maximum.
    pub fn clamp(&self, timeout: VaultTimeout) -> VaultTimeout {
        match timeout {
            VaultTimeout::Minutes(n) if n > self.minutes => VaultTimeout::Minutes(self.minutes),
            VaultTimeout::Minutes(0) | VaultTimeout::Never | VaultTimeout::OnRestart => {
                VaultTimeout::Minutes(self.minutes)
            }
            other => other,
        }
    }
}

/// Per-account timeout settings as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSettings {
    pub timeout: VaultTimeout,
    pub action: VaultTimeoutAction,
    #[serde(default)]
    pub policy: Option<MaximumTimeoutPolicy>,
}

impl TimeoutSettings {
    /// The policy's forced action, else the user's.
    pub fn effective_action(&self) -> VaultTimeoutAction {
        self.policy
            .and_then(|p| p.action)
            .unwrap_or(self.action)
    }
}
