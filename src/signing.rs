use rand::RngCore;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::error::{Error, Result};
use crate::keys::{SigningKey, decode_wif, encode_wif};
use crate::network::Network;

/// Cryptographic capability used by the wallet engine.
///
/// Implementations own the curve arithmetic; the engine only hands them
/// key material and 32-byte digests.
pub trait SigningProvider: Send + Sync {
    /// Parse serialized private-key material for `network`.
    fn load_key(&self, raw: &str, network: Network) -> Result<SigningKey> {
        let key = decode_wif(raw, network)?;
        // Rejects out-of-range scalars before the key is ever used.
        self.public_key(&key)?;
        Ok(key)
    }

    /// SEC1 public key: 33 bytes for a compressed key, 65 otherwise.
    fn public_key(&self, key: &SigningKey) -> Result<Vec<u8>>;

    /// DER-encoded signature over `digest`.
    fn sign_digest(&self, key: &SigningKey, digest: &[u8; 32]) -> Result<Vec<u8>>;

    fn verify_digest(&self, public_key: &[u8], digest: &[u8; 32], signature_der: &[u8]) -> bool;
}

/// secp256k1 ECDSA with RFC6979 nonces, so signing is deterministic.
pub struct Secp256k1Provider {
    secp: Secp256k1<All>,
}

impl Default for Secp256k1Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Secp256k1Provider {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Fresh WIF key material for `network`.
    pub fn generate_wif(network: Network) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if SecretKey::from_slice(&bytes).is_ok() {
                return encode_wif(&SigningKey::from_bytes(bytes, true), network);
            }
        }
    }

    fn secret_key(key: &SigningKey) -> Result<SecretKey> {
        SecretKey::from_slice(key.expose_secret())
            .map_err(|_| Error::InvalidKeyMaterial("secret scalar out of range".into()))
    }
}

impl SigningProvider for Secp256k1Provider {
    fn public_key(&self, key: &SigningKey) -> Result<Vec<u8>> {
        let sk = Self::secret_key(key)?;
        let pk = PublicKey::from_secret_key(&self.secp, &sk);
        Ok(if key.is_compressed() {
            pk.serialize().to_vec()
        } else {
            pk.serialize_uncompressed().to_vec()
        })
    }

    fn sign_digest(&self, key: &SigningKey, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let sk = Self::secret_key(key).map_err(|e| Error::Signing(e.to_string()))?;
        let msg = Message::from_digest(*digest);
        let sig = self.secp.sign_ecdsa(&msg, &sk);
        Ok(sig.serialize_der().to_vec())
    }

    fn verify_digest(&self, public_key: &[u8], digest: &[u8; 32], signature_der: &[u8]) -> bool {
        let Ok(pk) = PublicKey::from_slice(public_key) else {
            return false;
        };
        let Ok(sig) = Signature::from_der(signature_der) else {
            return false;
        };
        let msg = Message::from_digest(*digest);
        self.secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
    }
}
