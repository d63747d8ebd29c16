//! Short human-enterable party codes.
//!
//! Uniqueness is checked against the store before use, with a fixed retry
//! bound. There is no storage constraint behind it, so the result is only
//! probabilistically unique across processes; within one process
//! [`JoinCodeAllocator::reserve`] serializes allocation and insertion.

use rand::Rng;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

use crate::error::PartyError;
use crate::storage::Store;

pub const DEFAULT_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DEFAULT_CODE_LENGTH: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCodeSettings {
    pub alphabet: String,
    pub length: usize,
    pub max_attempts: usize,
}

impl Default for JoinCodeSettings {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.to_string(),
            length: DEFAULT_CODE_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

pub struct JoinCodeAllocator {
    store: Arc<dyn Store>,
    alphabet: Vec<char>,
    length: usize,
    max_attempts: usize,
    allocation: Mutex<()>,
}

impl JoinCodeAllocator {
    /// The alphabet is upper-cased, since lookups upper-case what users
    /// type. An empty alphabet falls back to [`DEFAULT_ALPHABET`]; length and
    /// attempts are at least 1.
    pub fn new(store: Arc<dyn Store>, settings: JoinCodeSettings) -> Self {
        let mut alphabet: Vec<char> = settings
            .alphabet
            .chars()
            .flat_map(char::to_uppercase)
            .collect();
        alphabet.sort_unstable();
        alphabet.dedup();
        if alphabet.is_empty() {
            alphabet = DEFAULT_ALPHABET.chars().collect();
        }

        Self {
            store,
            alphabet,
            length: settings.length.max(1),
            max_attempts: settings.max_attempts.max(1),
            allocation: Mutex::new(()),
        }
    }

    /// Draws random codes until one is not used by any party.
    ///
    /// Fails with [`PartyError::JoinCodeExhausted`] once every attempt
    /// collided.
    pub async fn generate_join_code(&self) -> Result<String, PartyError> {
        for attempt in 1..=self.max_attempts {
            let code = self.random_code();

            if self.store.find_party_by_join_code(&code).await?.is_none() {
                debug!("🎟️ Código {} asignado en el intento {}", code, attempt);
                return Ok(code);
            }

            debug!("🎟️ Código {} ya en uso (intento {})", code, attempt);
        }

        error!(
            "❌ No se pudo asignar un código tras {} intentos",
            self.max_attempts
        );
        Err(PartyError::JoinCodeExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Generates a code and keeps allocation locked until the returned guard
    /// is dropped, so the caller can persist the party first.
    pub async fn reserve(&self) -> Result<(String, MutexGuard<'_, ()>), PartyError> {
        let guard = self.allocation.lock().await;
        let code = self.generate_join_code().await?;
        Ok((code, guard))
    }

    fn random_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}
