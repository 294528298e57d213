use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use tracing::{debug, warn};

use crate::{Error, Message};

/// Signing capability injected into chain adapters.
///
/// Key material stays with the implementor; the relayer only ever sees
/// signatures and the public key they verify against.
#[cfg_attr(test, mockall::automock)]
pub trait MessageSigner: Send + Sync {
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, Error>;

    fn public_key(&self) -> Vec<u8>;
}

/// Signs the Blake2b-512 digest of a message envelope.
pub fn sign_message(signer: &dyn MessageSigner, message: &Message) -> Result<Vec<u8>, Error> {
    let digest = message.digest()?;
    debug!(id = %message.id(), "signing message digest");
    signer.sign(&digest)
}

pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_secret(secret_key: &[u8]) -> Result<Self, Error> {
        let secret: [u8; 32] = secret_key.try_into().map_err(|_| {
            Error::Signing(format!(
                "Invalid secret key length: expected 32 bytes, got {}",
                secret_key.len()
            ))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(secret_hex.trim().trim_start_matches("0x"))
            .map_err(|e| Error::Signing(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret(&bytes)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn verify(&self, bytes: &[u8], signature: &[u8]) -> bool {
        let signature = match Signature::from_slice(signature) {
            Ok(signature) => signature,
            Err(e) => {
                warn!("Invalid signature format: {}", e);
                return false;
            }
        };
        self.key.verifying_key().verify(bytes, &signature).is_ok()
    }
}

impl MessageSigner for Ed25519Signer {
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(self.key.sign(bytes).to_bytes().to_vec())
    }

    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }
}
