//! Signing and broadcast of built transactions.

use crate::error::{Error, Result};
use crate::keys::Identity;
use crate::oracle::{LedgerOracle, SubmissionResult};
use crate::sighash::{self, SIGHASH_ALL_FORKID};
use crate::signing::SigningProvider;
use crate::tx::{InputSignature, SignedTransaction, UnsignedTransaction};

/// Sign every signable input of `tx` with the identity key.
///
/// Each signature is DER over the input's sighash digest followed by the
/// `SIGHASH_ALL | FORKID` byte. Nonces are deterministic, so the same
/// transaction and key always produce the same bytes.
pub fn sign_transaction(
    provider: &dyn SigningProvider,
    tx: &UnsignedTransaction,
    identity: &Identity,
) -> Result<SignedTransaction> {
    if tx.signable_inputs() == 0 {
        return Err(Error::Signing("transaction has no signable inputs".into()));
    }

    let mut signatures = Vec::with_capacity(tx.inputs.len());
    for (index, input) in tx.inputs.iter().enumerate() {
        let Some(spent) = &input.spends else {
            signatures.push(None);
            continue;
        };
        let digest = sighash::digest(tx, index, &spent.script, spent.value)
            .map_err(|e| Error::Signing(format!("input {index}: {e}")))?;
        let mut signature = provider.sign_digest(identity.signing_key(), &digest)?;
        if !provider.verify_digest(identity.public_key(), &digest, &signature) {
            return Err(Error::Signing(format!(
                "input {index}: signature does not verify"
            )));
        }
        signature.push(SIGHASH_ALL_FORKID as u8);
        signatures.push(Some(InputSignature { signature }));
    }

    Ok(SignedTransaction {
        unsigned: tx.clone(),
        signatures,
        public_key: identity.public_key().to_vec(),
    })
}

/// Hand the serialized transaction to the oracle. Errors and results are
/// returned unchanged.
pub async fn broadcast(
    oracle: &dyn LedgerOracle,
    signed: &SignedTransaction,
) -> Result<SubmissionResult> {
    let raw = signed.to_bytes();
    log::debug!("broadcasting {} ({} bytes)", signed.txid(), raw.len());
    oracle.submit_raw(&raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Arg;
    use crate::hash::hash160;
    use crate::keys::{SigningKey, encode_wif};
    use crate::network::Network;
    use crate::signing::Secp256k1Provider;
    use crate::testing::{MockOracle, demo_contract, demo_utxo, test_wif};
    use crate::tx::deploy::{DeployParams, build_deploy_tx};
    use crate::tx::invoke::{InvokeParams, build_invoke_tx};
    use crate::tx::{DEFAULT_SEQUENCE, OutPoint, TxInput, Unlock};

    fn identity(provider: &Secp256k1Provider) -> Identity {
        Identity::from_key_material(provider, &test_wif(Network::Mainnet), Network::Mainnet)
            .unwrap()
    }

    fn deploy_tx(identity: &Identity) -> UnsignedTransaction {
        build_deploy_tx(
            &demo_contract(),
            &DeployParams {
                balance: 1000,
                fee: 50,
                funding_script: identity.locking_script(),
                funding: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn deterministic_bytes() {
        let provider = Secp256k1Provider::new();
        let id = identity(&provider);
        let tx = deploy_tx(&id);
        let a = sign_transaction(&provider, &tx, &id).unwrap();
        let b = sign_transaction(&provider, &tx, &id).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_eq!(a.txid(), b.txid());
    }

    #[test]
    fn signature_verifies_against_preimage_digest() {
        let provider = Secp256k1Provider::new();
        let id = identity(&provider);
        let tx = deploy_tx(&id);
        let signed = sign_transaction(&provider, &tx, &id).unwrap();

        let sig = signed.signatures[0].as_ref().unwrap();
        let (der, flag) = sig.signature.split_at(sig.signature.len() - 1);
        assert_eq!(flag, &[0x41]);
        let digest = sighash::digest(&tx, 0, &id.locking_script(), 1000).unwrap();
        assert!(provider.verify_digest(id.public_key(), &digest, der));
    }

    #[test]
    fn uncompressed_identity_pushes_full_public_key() {
        let provider = Secp256k1Provider::new();
        let wif = encode_wif(&SigningKey::from_bytes([0x11; 32], false), Network::Mainnet);
        let id = Identity::from_key_material(&provider, &wif, Network::Mainnet).unwrap();
        assert_eq!(id.public_key().len(), 65);
        assert_eq!(&hash160(id.public_key()), id.address().pubkey_hash());

        let tx = deploy_tx(&id);
        let signed = sign_transaction(&provider, &tx, &id).unwrap();
        assert_eq!(signed.public_key, id.public_key());
        let raw = signed.to_bytes();
        assert!(
            raw.windows(66)
                .any(|w| w[0] == 65 && &w[1..] == id.public_key())
        );

        let sig = signed.signatures[0].as_ref().unwrap();
        let der = &sig.signature[..sig.signature.len() - 1];
        let digest = sighash::digest(&tx, 0, &id.locking_script(), 1000).unwrap();
        assert!(provider.verify_digest(id.public_key(), &digest, der));
    }

    #[test]
    fn key_never_serialized() {
        let provider = Secp256k1Provider::new();
        let id = identity(&provider);
        let signed = sign_transaction(&provider, &deploy_tx(&id), &id).unwrap();
        let raw = signed.to_bytes();
        let secret = id.signing_key().expose_secret();
        assert!(!raw.windows(32).any(|w| w == secret));
    }

    #[test]
    fn nothing_to_sign() {
        let provider = Secp256k1Provider::new();
        let id = identity(&provider);
        let mut tx = UnsignedTransaction::new(0);
        tx.inputs.push(TxInput {
            prevout: OutPoint::placeholder(),
            sequence: DEFAULT_SEQUENCE,
            unlock: Unlock::P2pkh,
            spends: None,
        });
        let err = sign_transaction(&provider, &tx, &id).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn fills_contract_signature_slot() {
        let provider = Secp256k1Provider::new();
        let id = identity(&provider);
        let tx = build_invoke_tx(
            &demo_contract(),
            &InvokeParams {
                method: "settle".into(),
                args: vec![],
                utxo: demo_utxo(500),
                fee: 10,
            },
        )
        .unwrap();
        let signed = sign_transaction(&provider, &tx, &id).unwrap();
        // A filled slot is longer than the OP_0 placeholder.
        assert!(signed.to_bytes().len() > tx.to_bytes().len());

        let add = build_invoke_tx(
            &demo_contract(),
            &InvokeParams {
                method: "add".into(),
                args: vec![Arg::Int(1)],
                utxo: demo_utxo(500),
                fee: 10,
            },
        )
        .unwrap();
        let signed = sign_transaction(&provider, &add, &id).unwrap();
        // No slot: the scriptSig is unchanged by signing.
        assert_eq!(signed.to_bytes(), add.to_bytes());
    }

    #[tokio::test]
    async fn broadcast_passes_bytes_through() {
        let provider = Secp256k1Provider::new();
        let id = identity(&provider);
        let signed = sign_transaction(&provider, &deploy_tx(&id), &id).unwrap();
        let oracle = MockOracle::new();
        let result = broadcast(&oracle, &signed).await.unwrap();
        assert_eq!(
            result,
            SubmissionResult::Accepted {
                txid: signed.txid()
            }
        );
        assert_eq!(oracle.submitted(), vec![signed.to_bytes()]);
    }
}
