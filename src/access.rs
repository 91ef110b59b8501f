//! Authentication state machine gating vault visibility.
//!
//! Sessions are in-memory only: every process starts Locked and ends Locked.
//! Biometric authentication is tried first with PIN entry as the fallback;
//! biometric availability is queried from the platform on every attempt, not
//! cached, since it can change between attempts (sensor disabled, lockout).

use crate::crypto::pin;
use crate::error::{Error, Result};

/// Session state. Not persisted anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    /// Initial state; vault content hidden.
    Locked,
    /// A challenge is in flight.
    Authenticating,
    /// Vault visible until an explicit lock or process end.
    Unlocked,
}

/// Platform biometric capability (Touch ID, fingerprint reader, ...).
pub trait BiometricAuthenticator {
    /// Whether biometric hardware is currently usable.
    fn is_available(&self) -> bool;

    /// Run one biometric challenge. `Ok(false)` is a recoverable user
    /// failure (wrong finger, cancel); `Err` is a platform error.
    fn authenticate(&mut self, reason: &str) -> Result<bool>;
}

/// Stub for platforms without biometric hardware; always unavailable.
pub struct NoopBiometrics;

impl BiometricAuthenticator for NoopBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    fn authenticate(&mut self, _reason: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Session-scoped access controller for the vault.
pub struct AccessController {
    state: AccessState,
    security_enabled: bool,
    pin_hash: Option<String>,
    biometrics: Box<dyn BiometricAuthenticator>,
}

impl AccessController {
    pub fn new(
        security_enabled: bool,
        pin_hash: Option<String>,
        biometrics: Box<dyn BiometricAuthenticator>,
    ) -> Self {
        Self {
            state: AccessState::Locked,
            security_enabled,
            pin_hash,
            biometrics,
        }
    }

    pub fn state(&self) -> AccessState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == AccessState::Unlocked
    }

    /// Whether the policy forces PIN setup before the vault can unlock.
    pub fn requires_pin_setup(&self) -> bool {
        self.security_enabled && self.pin_hash.is_none()
    }

    /// Request access to the vault.
    ///
    /// With security off and no PIN configured, the vault opens without a
    /// challenge. With security on and no PIN, setup is forced before
    /// Unlocked is reachable. Otherwise a challenge starts.
    pub fn request_access(&mut self) -> Result<AccessState> {
        match self.state {
            AccessState::Unlocked => Ok(AccessState::Unlocked),
            AccessState::Locked | AccessState::Authenticating => {
                if self.requires_pin_setup() {
                    return Err(Error::PinSetupRequired);
                }
                if !self.security_enabled && self.pin_hash.is_none() {
                    self.state = AccessState::Unlocked;
                    return Ok(AccessState::Unlocked);
                }
                self.state = AccessState::Authenticating;
                Ok(AccessState::Authenticating)
            }
        }
    }

    /// Whether a biometric challenge can be attempted right now. Queried
    /// from the platform each time.
    pub fn biometrics_available(&self) -> bool {
        self.biometrics.is_available()
    }

    /// Run one biometric challenge. Success unlocks the session; failure
    /// returns it to Locked, with PIN entry still available as a fallback
    /// (request access again, then submit the PIN).
    pub fn attempt_biometric(&mut self, reason: &str) -> Result<bool> {
        if self.state != AccessState::Authenticating {
            return Err(Error::VaultLocked);
        }
        if !self.biometrics.is_available() {
            self.state = AccessState::Locked;
            return Ok(false);
        }
        match self.biometrics.authenticate(reason) {
            Ok(true) => {
                self.state = AccessState::Unlocked;
                Ok(true)
            }
            Ok(false) => {
                self.state = AccessState::Locked;
                Ok(false)
            }
            Err(e) => {
                self.state = AccessState::Locked;
                Err(e)
            }
        }
    }

    /// Verify a PIN against the configured hash. A match unlocks the
    /// session; a mismatch returns it to Locked. Never treated as success
    /// silently.
    pub fn submit_pin(&mut self, pin_attempt: &str) -> Result<bool> {
        if self.state != AccessState::Authenticating {
            return Err(Error::VaultLocked);
        }
        let Some(hash) = &self.pin_hash else {
            self.state = AccessState::Locked;
            return Err(Error::PinSetupRequired);
        };
        if pin::verify_pin(pin_attempt, hash) {
            self.state = AccessState::Unlocked;
            Ok(true)
        } else {
            self.state = AccessState::Locked;
            Ok(false)
        }
    }

    /// Explicitly lock the session.
    pub fn lock(&mut self) {
        self.state = AccessState::Locked;
    }
}
