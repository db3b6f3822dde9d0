//! Lock state machine gating private-key operations.
//!
//! ```text
//!   Locked --unlock(ok)--> Unlocked --lock--> Locked
//!   WatchingOnly (terminal)
//! ```
//!
//! The unlocked state owns the private-tier crypto key, so locking drops
//! (and zeroizes) it. A watching-only manager has no private tier to unseal.

use crate::error::ManagerError;
use crate::kdf::SecretKey;

/// Current access level of an open manager.
#[derive(Debug)]
pub enum LockState {
    /// Only public key material exists.
    WatchingOnly,
    /// Private key material exists but is sealed.
    Locked,
    /// The private-tier crypto key is held in memory.
    Unlocked(SecretKey),
}

impl LockState {
    /// The private-tier crypto key, or the reason it is unavailable.
    pub fn require_unlocked(&self) -> Result<&SecretKey, ManagerError> {
        match self {
            LockState::Unlocked(key) => Ok(key),
            LockState::Locked => Err(ManagerError::Locked),
            LockState::WatchingOnly => Err(ManagerError::WatchingOnlyViolation),
        }
    }

    /// Fail with [`ManagerError::WatchingOnlyViolation`] if no private tier
    /// exists.
    pub fn require_private_tier(&self) -> Result<(), ManagerError> {
        match self {
            LockState::WatchingOnly => Err(ManagerError::WatchingOnlyViolation),
            _ => Ok(()),
        }
    }

    /// Move to `Unlocked`, replacing any key already held.
    pub fn unlock(&mut self, key: SecretKey) -> Result<(), ManagerError> {
        self.require_private_tier()?;
        *self = LockState::Unlocked(key);
        Ok(())
    }

    /// Drop the private-tier key. A no-op unless unlocked.
    pub fn lock(&mut self) {
        if let LockState::Unlocked(_) = self {
            *self = LockState::Locked;
        }
    }

    /// Discard the private tier for good.
    pub fn make_watching_only(&mut self) {
        *self = LockState::WatchingOnly;
    }

    /// True in every state except `Unlocked`.
    pub fn is_locked(&self) -> bool {
        !matches!(self, LockState::Unlocked(_))
    }

    pub fn is_watching_only(&self) -> bool {
        matches!(self, LockState::WatchingOnly)
    }
}
