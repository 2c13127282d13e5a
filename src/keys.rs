//! Key material, addresses and the wallet identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::hash::hash160;
use crate::network::Network;
use crate::script::Script;
use crate::signing::SigningProvider;

/// Raw secret scalar. Zeroed on drop; never printed.
#[derive(Clone)]
pub struct SigningKey {
    secret: Zeroizing<[u8; 32]>,
    compressed: bool,
}

impl SigningKey {
    pub fn from_bytes(secret: [u8; 32], compressed: bool) -> Self {
        Self {
            secret: Zeroizing::new(secret),
            compressed,
        }
    }

    pub fn expose_secret(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Decode a WIF private key for `network`.
///
/// Error messages describe the defect only, never the input.
pub fn decode_wif(wif: &str, network: Network) -> Result<SigningKey> {
    let decoded = Zeroizing::new(
        bs58::decode(wif.trim())
            .with_check(None)
            .into_vec()
            .map_err(|_| Error::InvalidKeyMaterial("not a base58check string".into()))?,
    );

    let Some(&prefix) = decoded.first() else {
        return Err(Error::InvalidKeyMaterial("empty payload".into()));
    };
    if prefix != network.wif_prefix() {
        return Err(Error::InvalidKeyMaterial(format!(
            "prefix 0x{prefix:02x} is not a {} key",
            network.as_str()
        )));
    }

    let compressed = match decoded.len() {
        34 if decoded[33] == 0x01 => true,
        33 => false,
        n => {
            return Err(Error::InvalidKeyMaterial(format!(
                "unexpected payload length {n}"
            )));
        }
    };

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&decoded[1..33]);
    Ok(SigningKey::from_bytes(secret, compressed))
}

pub fn encode_wif(key: &SigningKey, network: Network) -> String {
    let mut payload = Zeroizing::new(Vec::with_capacity(34));
    payload.push(network.wif_prefix());
    payload.extend_from_slice(key.expose_secret());
    if key.is_compressed() {
        payload.push(0x01);
    }
    bs58::encode(payload.as_slice()).with_check().into_string()
}

/// A P2PKH address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    encoded: String,
    network: Network,
    pubkey_hash: [u8; 20],
}

impl Address {
    pub fn from_public_key(public_key: &[u8], network: Network) -> Self {
        let pubkey_hash = hash160(public_key);
        let mut payload = Vec::with_capacity(21);
        payload.push(network.p2pkh_version());
        payload.extend_from_slice(&pubkey_hash);
        Self {
            encoded: bs58::encode(payload).with_check().into_string(),
            network,
            pubkey_hash,
        }
    }

    /// Parse `s` and require its version byte to belong to `network`.
    pub fn parse_for(s: &str, network: Network) -> Result<Self> {
        let address: Address = s.parse()?;
        if address.network != network {
            return Err(Error::Script(format!(
                "{} address used on {}",
                address.network.as_str(),
                network.as_str()
            )));
        }
        Ok(address)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }

    pub fn locking_script(&self) -> Script {
        Script::p2pkh(&self.pubkey_hash)
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| Error::Script(format!("invalid address: {e}")))?;
        if decoded.len() != 21 {
            return Err(Error::Script(format!(
                "invalid address length: {}",
                decoded.len()
            )));
        }
        let network = Network::from_p2pkh_version(decoded[0]).ok_or_else(|| {
            Error::Script(format!("unknown address version 0x{:02x}", decoded[0]))
        })?;
        let mut pubkey_hash = [0u8; 20];
        pubkey_hash.copy_from_slice(&decoded[1..]);
        Ok(Self {
            encoded: s.to_string(),
            network,
            pubkey_hash,
        })
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.encoded
    }
}

/// The session's signing identity.
#[derive(Debug)]
pub struct Identity {
    key: SigningKey,
    public_key: Vec<u8>,
    address: Address,
}

impl Identity {
    /// Parse `raw` key material and derive the public key and address.
    pub fn from_key_material(
        provider: &dyn SigningProvider,
        raw: &str,
        network: Network,
    ) -> Result<Self> {
        let key = provider.load_key(raw, network)?;
        let public_key = provider.public_key(&key)?;
        let address = Address::from_public_key(&public_key, network);
        Ok(Self {
            key,
            public_key,
            address,
        })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// SEC1 encoding matching the key's compression flag.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn locking_script(&self) -> Script {
        self.address.locking_script()
    }
}
