//! Password slice
//!
//! The only slice that verifies before writing: a new secret is accepted
//! only together with the current one. The secret is held in a
//! [`SecretString`] and never published.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use super::events::{EventBus, StateEvent};
use crate::storage::{self, keys, KeyValueStore, Loaded};
use crate::types::PasswordChangeOutcome;

/// Secret a fresh install starts with
pub const DEFAULT_PASSWORD: &str = "Password123!";

/// Password service
pub struct SecurityService {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    cached: Mutex<Option<SecretString>>,
}

impl SecurityService {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            cached: Mutex::new(None),
        }
    }

    /// Check a candidate against the current secret
    ///
    /// Nothing verifies while the stored secret cannot be read.
    pub async fn verify(&self, candidate: &str) -> bool {
        let mut cached = self.cached.lock().await;
        self.matches(&mut cached, candidate).await.unwrap_or(false)
    }

    /// Whether the install still uses [`DEFAULT_PASSWORD`]
    pub async fn has_default_password(&self) -> bool {
        self.verify(DEFAULT_PASSWORD).await
    }

    /// Replace the secret if `old` matches the current one
    ///
    /// A mismatch, or a stored secret that cannot be read, is reported in
    /// the outcome and leaves the stored secret untouched. On success
    /// `passwordChanged` is published.
    pub async fn verify_and_update(&self, old: &str, new: &str) -> PasswordChangeOutcome {
        if new.is_empty() {
            return PasswordChangeOutcome::refused("New password cannot be empty");
        }

        {
            let mut cached = self.cached.lock().await;
            match self.matches(&mut cached, old).await {
                Some(true) => {}
                Some(false) => {
                    tracing::debug!("Password change refused: current password mismatch");
                    return PasswordChangeOutcome::refused("Current password is incorrect");
                }
                None => {
                    tracing::warn!("Password change refused: stored secret unreadable");
                    return PasswordChangeOutcome::refused("Password unavailable, try again");
                }
            }

            storage::persist(self.store.as_ref(), keys::PASSWORD, new).await;
            *cached = Some(SecretString::from(new.to_string()));
        }

        self.bus.publish(StateEvent::PasswordChanged);
        PasswordChangeOutcome::ok("Password updated")
    }

    /// Drop the stored secret; the default applies again
    pub async fn reset(&self) {
        {
            let mut cached = self.cached.lock().await;
            storage::erase(self.store.as_ref(), keys::PASSWORD).await;
            *cached = Some(SecretString::from(DEFAULT_PASSWORD.to_string()));
        }

        self.bus.publish(StateEvent::PasswordChanged);
    }

    /// `None` while the stored secret cannot be read
    async fn matches(&self, cached: &mut Option<SecretString>, candidate: &str) -> Option<bool> {
        if let Some(secret) = cached.as_ref() {
            return Some(secret.expose_secret() == candidate);
        }

        let secret = match storage::load(self.store.as_ref(), keys::PASSWORD).await {
            Loaded::Present(secret) => secret,
            Loaded::Absent => {
                storage::persist(self.store.as_ref(), keys::PASSWORD, DEFAULT_PASSWORD).await;
                DEFAULT_PASSWORD.to_string()
            }
            Loaded::Faulted => return None,
        };

        let matched = secret == candidate;
        *cached = Some(SecretString::from(secret));
        Some(matched)
    }
}
