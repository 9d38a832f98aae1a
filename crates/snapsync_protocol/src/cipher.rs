//! Snapshot encryption using AES-256-GCM.
//!
//! The cipher key is derived from the group secret with HKDF-SHA256, so
//! every holder of the [`GroupKey`] can read every writer's snapshots.
//!
//! Ciphertext layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! The namespace topic is passed as associated data, so content copied into
//! an event for another namespace fails to decrypt.

use crate::entry::Snapshot;
use crate::error::{ProtocolError, ProtocolResult};
use crate::keys::GroupKey;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const HKDF_SALT: &[u8] = b"snapsync";
const HKDF_INFO: &[u8] = b"snapsync-snapshot-key-v1";

/// Encrypts and decrypts snapshots for one replica group.
pub struct SnapshotCipher {
    cipher: Aes256Gcm,
}

impl SnapshotCipher {
    /// Derives the cipher for `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn new(group: &GroupKey) -> ProtocolResult<Self> {
        let secret = Zeroizing::new(group.secret_bytes());
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret.as_slice());

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(HKDF_INFO, key.as_mut_slice())
            .map_err(|_| ProtocolError::InvalidKey("HKDF expand failed".into()))?;

        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_slice()));
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` bound to `aad`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> ProtocolResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| ProtocolError::Codec("encryption error".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts data produced by [`SnapshotCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decryption`] if the data is truncated, was
    /// tampered with, or was encrypted under another key or `aad`.
    pub fn decrypt(&self, data: &[u8], aad: &[u8]) -> ProtocolResult<Vec<u8>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ProtocolError::Decryption("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| ProtocolError::Decryption("authentication failed".into()))
    }

    /// Serializes and encrypts a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn seal_snapshot(&self, snapshot: &Snapshot, namespace_topic: &str) -> ProtocolResult<Vec<u8>> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(snapshot).map_err(|e| ProtocolError::Codec(e.to_string()))?,
        );
        self.encrypt(&plaintext, namespace_topic.as_bytes())
    }

    /// Decrypts and parses a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decryption`] or
    /// [`ProtocolError::MalformedSnapshot`].
    pub fn open_snapshot(&self, data: &[u8], namespace_topic: &str) -> ProtocolResult<Snapshot> {
        let plaintext = Zeroizing::new(self.decrypt(data, namespace_topic.as_bytes())?);
        serde_json::from_slice(&plaintext).map_err(|e| ProtocolError::MalformedSnapshot(e.to_string()))
    }
}

impl std::fmt::Debug for SnapshotCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use serde_json::json;

    #[test]
    fn encrypt_decrypt() {
        let cipher = SnapshotCipher::new(&GroupKey::generate()).unwrap();
        let sealed = cipher.encrypt(b"Hello, group!", b"ns").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 13 + TAG_SIZE);
        assert_eq!(cipher.decrypt(&sealed, b"ns").unwrap(), b"Hello, group!");
    }

    #[test]
    fn same_group_key_same_cipher() {
        let group = GroupKey::generate();
        let copy = GroupKey::from_hex(&group.to_hex()).unwrap();

        let sealed = SnapshotCipher::new(&group).unwrap().encrypt(b"x", b"").unwrap();
        let opened = SnapshotCipher::new(&copy).unwrap().decrypt(&sealed, b"").unwrap();
        assert_eq!(opened, b"x");
    }

    #[test]
    fn foreign_key_fails() {
        let a = SnapshotCipher::new(&GroupKey::generate()).unwrap();
        let b = SnapshotCipher::new(&GroupKey::generate()).unwrap();

        let sealed = a.encrypt(b"secret", b"ns").unwrap();
        assert!(matches!(b.decrypt(&sealed, b"ns"), Err(ProtocolError::Decryption(_))));
    }

    #[test]
    fn wrong_aad_fails() {
        let cipher = SnapshotCipher::new(&GroupKey::generate()).unwrap();
        let sealed = cipher.encrypt(b"secret", b"notes").unwrap();
        assert!(cipher.decrypt(&sealed, b"todos").is_err());
    }

    #[test]
    fn tampered_and_truncated_fail() {
        let cipher = SnapshotCipher::new(&GroupKey::generate()).unwrap();
        let mut sealed = cipher.encrypt(b"secret data", b"").unwrap();
        sealed[NONCE_SIZE + 1] ^= 0xFF;
        assert!(cipher.decrypt(&sealed, b"").is_err());
        assert!(cipher.decrypt(&[0u8; 10], b"").is_err());
    }

    #[test]
    fn snapshot_seal_open() {
        let cipher = SnapshotCipher::new(&GroupKey::generate()).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert("color".into(), Entry::new(json!({"color": "blue"}), 1000));
        snapshot.insert("gone".into(), Entry::tombstone(1200));

        let sealed = cipher.seal_snapshot(&snapshot, "topic").unwrap();
        let opened = cipher.open_snapshot(&sealed, "topic").unwrap();
        assert_eq!(opened, snapshot);
    }

    #[test]
    fn non_snapshot_plaintext_is_malformed() {
        let cipher = SnapshotCipher::new(&GroupKey::generate()).unwrap();
        let sealed = cipher.encrypt(b"[1, 2, 3]", b"topic").unwrap();
        assert!(matches!(
            cipher.open_snapshot(&sealed, "topic"),
            Err(ProtocolError::MalformedSnapshot(_))
        ));
    }
}
