//! Crypto capabilities consumed by the message receivers.
//!
//! The cryptographic primitives live outside the engine. Implementations
//! return raw [`CryptoError`]s, which the receivers convert into
//! [`MlsFailure`](msgsync_core::MlsFailure) and
//! [`ProteusFailure`](msgsync_core::ProteusFailure).

use msgsync_core::boundary::{CryptoError, CryptoResult, MlsErrorKind};
use msgsync_core::ProteusErrorCode;
use msgsync_protocol::{ClientId, UserId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Group joined through a welcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedGroup {
    /// MLS group id.
    pub group_id: String,
    /// Epoch after joining.
    pub epoch: u64,
}

/// Result of decrypting an MLS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlsDecrypted {
    /// Application message, `None` for handshake messages.
    pub plaintext: Option<String>,
    /// Group epoch after the message was applied.
    pub epoch: u64,
}

/// MLS operations.
pub trait MlsClient: Send + Sync {
    /// Joins the group described by `welcome`.
    fn process_welcome(&self, welcome: &str) -> CryptoResult<JoinedGroup>;

    /// Decrypts a message of `group_id`, applying commits.
    fn decrypt_message(&self, group_id: &str, content: &str) -> CryptoResult<MlsDecrypted>;
}

/// Proteus operations.
pub trait ProteusClient: Send + Sync {
    /// Decrypts a message from one device of `sender`.
    fn decrypt(&self, sender: &UserId, client: &ClientId, content: &str) -> CryptoResult<String>;
}

/// Both crypto capabilities of an account.
#[derive(Clone)]
pub struct CryptoClients {
    /// MLS.
    pub mls: Arc<dyn MlsClient>,
    /// Proteus.
    pub proteus: Arc<dyn ProteusClient>,
}

impl CryptoClients {
    /// Uses `mock` for both protocols.
    pub fn mock(mock: Arc<MockCrypto>) -> Self {
        Self {
            mls: mock.clone(),
            proteus: mock,
        }
    }
}

impl std::fmt::Debug for CryptoClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoClients").finish_non_exhaustive()
    }
}

/// A pass-through crypto layer for tests and tools.
///
/// Ciphertext is the plaintext. A welcome's content is the group id it
/// joins. MLS messages starting with `commit:` advance the epoch and carry
/// no plaintext. Failures can be queued per operation.
#[derive(Debug, Default)]
pub struct MockCrypto {
    groups: Mutex<HashMap<String, u64>>,
    welcome_failures: Mutex<VecDeque<CryptoError>>,
    mls_failures: Mutex<VecDeque<CryptoError>>,
    proteus_failures: Mutex<VecDeque<CryptoError>>,
}

impl MockCrypto {
    /// Creates a mock without groups.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a group at `epoch`.
    pub fn add_group(&self, group_id: impl Into<String>, epoch: u64) {
        self.groups.lock().insert(group_id.into(), epoch);
    }

    /// Returns the epoch of a known group.
    #[must_use]
    pub fn epoch(&self, group_id: &str) -> Option<u64> {
        self.groups.lock().get(group_id).copied()
    }

    /// Makes the next welcome fail with `kind`.
    pub fn fail_next_welcome(&self, kind: MlsErrorKind) {
        self.welcome_failures
            .lock()
            .push_back(CryptoError::mls(kind, "scripted welcome failure"));
    }

    /// Makes the next MLS decryption fail with `kind`.
    pub fn fail_next_mls(&self, kind: MlsErrorKind) {
        self.mls_failures
            .lock()
            .push_back(CryptoError::mls(kind, "scripted decryption failure"));
    }

    /// Makes the next Proteus decryption fail with `code`.
    pub fn fail_next_proteus(&self, code: ProteusErrorCode) {
        self.proteus_failures
            .lock()
            .push_back(CryptoError::proteus(code, "scripted decryption failure"));
    }
}

impl MlsClient for MockCrypto {
    fn process_welcome(&self, welcome: &str) -> CryptoResult<JoinedGroup> {
        if let Some(error) = self.welcome_failures.lock().pop_front() {
            return Err(error);
        }
        let mut groups = self.groups.lock();
        if groups.contains_key(welcome) {
            return Err(CryptoError::mls(
                MlsErrorKind::ConversationAlreadyExists,
                "group already joined",
            ));
        }
        groups.insert(welcome.to_string(), 1);
        Ok(JoinedGroup {
            group_id: welcome.to_string(),
            epoch: 1,
        })
    }

    fn decrypt_message(&self, group_id: &str, content: &str) -> CryptoResult<MlsDecrypted> {
        if let Some(error) = self.mls_failures.lock().pop_front() {
            return Err(error);
        }
        let mut groups = self.groups.lock();
        let epoch = groups.get_mut(group_id).ok_or_else(|| {
            CryptoError::mls(MlsErrorKind::ConversationNotFound, "unknown group")
        })?;
        if content.starts_with("commit:") {
            *epoch += 1;
            return Ok(MlsDecrypted {
                plaintext: None,
                epoch: *epoch,
            });
        }
        Ok(MlsDecrypted {
            plaintext: Some(content.to_string()),
            epoch: *epoch,
        })
    }
}

impl ProteusClient for MockCrypto {
    fn decrypt(&self, _sender: &UserId, _client: &ClientId, content: &str) -> CryptoResult<String> {
        if let Some(error) = self.proteus_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_then_commit_advances_epoch() {
        let crypto = MockCrypto::new();
        let joined = crypto.process_welcome("group-1").unwrap();
        assert_eq!(joined.epoch, 1);

        let commit = crypto.decrypt_message("group-1", "commit:add").unwrap();
        assert_eq!(commit, MlsDecrypted { plaintext: None, epoch: 2 });

        let text = crypto.decrypt_message("group-1", "hello").unwrap();
        assert_eq!(text.plaintext.as_deref(), Some("hello"));
        assert_eq!(crypto.epoch("group-1"), Some(2));
    }

    #[test]
    fn second_welcome_for_same_group_fails() {
        let crypto = MockCrypto::new();
        crypto.process_welcome("group-1").unwrap();
        let err = crypto.process_welcome("group-1").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::Mls {
                kind: MlsErrorKind::ConversationAlreadyExists,
                ..
            }
        ));
    }

    #[test]
    fn scripted_failures_are_consumed_in_order() {
        let crypto = MockCrypto::new();
        crypto.add_group("g", 3);
        crypto.fail_next_mls(MlsErrorKind::WrongEpoch);
        assert!(crypto.decrypt_message("g", "hi").is_err());
        assert!(crypto.decrypt_message("g", "hi").is_ok());

        crypto.fail_next_proteus(ProteusErrorCode::InvalidMessage);
        let sender = UserId::new("bob", "foo.com");
        let client = ClientId::new("c1");
        assert!(crypto.decrypt(&sender, &client, "x").is_err());
        assert_eq!(crypto.decrypt(&sender, &client, "x").unwrap(), "x");
    }
}
