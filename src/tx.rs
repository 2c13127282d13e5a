//! Transaction model, wire serialization and the per-mode builders.

pub mod deploy;
pub mod invoke;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::sha256d;
use crate::script::{Script, UnlockingScript, push_data};

pub const TX_VERSION: u32 = 1;
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Reference to a previous transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Internal (little-endian) byte order.
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        Self { txid, vout }
    }

    /// All-zero outpoint used when the funding source is not referenced.
    pub fn placeholder() -> Self {
        Self::new([0u8; 32], 0)
    }

    /// Parse a txid in display (reversed) hex.
    pub fn from_display_txid(txid: &str, vout: u32) -> Result<Self> {
        let mut bytes = hex::decode(txid).map_err(|e| Error::Script(format!("bad txid: {e}")))?;
        if bytes.len() != 32 {
            return Err(Error::Script(format!("bad txid length: {}", bytes.len())));
        }
        bytes.reverse();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self::new(out, vout))
    }

    pub fn display_txid(&self) -> String {
        let mut reversed = self.txid;
        reversed.reverse();
        hex::encode(reversed)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.display_txid(), self.vout)
    }
}

/// An unspent output supplied by the caller when invoking a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub txid: String,
    #[serde(alias = "vout")]
    pub output_index: u32,
    #[serde(alias = "value")]
    pub satoshis: u64,
    #[serde(default)]
    pub script: Script,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> Result<OutPoint> {
        OutPoint::from_display_txid(&self.txid, self.output_index)
    }
}

/// The output an input spends, as needed for the sighash preimage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentOutput {
    pub script: Script,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unlock {
    /// `<sig> <pubkey>`, written by the signer.
    P2pkh,
    /// Contract unlocking script; signature slots are filled by the signer.
    Script(UnlockingScript),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prevout: OutPoint,
    pub sequence: u32,
    pub unlock: Unlock,
    /// Present on inputs the wallet identity signs.
    pub spends: Option<SpentOutput>,
}

impl TxInput {
    pub fn is_signable(&self) -> bool {
        self.spends.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOutput {
    pub value: u64,
    pub script: Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    /// Caller-declared fee, deducted from the input value.
    pub fee: u64,
}

impl UnsignedTransaction {
    pub fn new(fee: u64) -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            fee,
        }
    }

    pub fn input_value(&self) -> u64 {
        self.inputs
            .iter()
            .filter_map(|i| i.spends.as_ref())
            .map(|s| s.value)
            .sum()
    }

    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// `Σoutputs ≤ Σinputs − fee`
    pub fn fee_covered(&self) -> bool {
        self.input_value()
            .checked_sub(self.fee)
            .is_some_and(|spendable| self.output_value() <= spendable)
    }

    pub fn signable_inputs(&self) -> usize {
        self.inputs.iter().filter(|i| i.is_signable()).count()
    }

    /// Wire form with unfilled signatures.
    pub fn to_bytes(&self) -> Vec<u8> {
        let script_sigs: Vec<Script> = self
            .inputs
            .iter()
            .map(|input| match &input.unlock {
                Unlock::P2pkh => Script::new(),
                Unlock::Script(unlocking) => unlocking.render(None),
            })
            .collect();
        serialize(self, &script_sigs)
    }
}

/// Signature material for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSignature {
    /// DER signature followed by the sighash type byte.
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub unsigned: UnsignedTransaction,
    /// One entry per input; `None` for inputs that were not signed.
    pub signatures: Vec<Option<InputSignature>>,
    pub public_key: Vec<u8>,
}

impl SignedTransaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        let script_sigs: Vec<Script> = self
            .unsigned
            .inputs
            .iter()
            .zip(&self.signatures)
            .map(|(input, sig)| {
                let sig = sig.as_ref().map(|s| s.signature.as_slice());
                match (&input.unlock, sig) {
                    (Unlock::P2pkh, Some(sig)) => {
                        let mut bytes = push_data(sig);
                        bytes.extend(push_data(&self.public_key));
                        Script::from_bytes(bytes)
                    }
                    (Unlock::P2pkh, None) => Script::new(),
                    (Unlock::Script(unlocking), sig) => unlocking.render(sig),
                }
            })
            .collect();
        serialize(&self.unsigned, &script_sigs)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Double-SHA256 of the wire form, in display order.
    pub fn txid(&self) -> String {
        let mut hash = sha256d(&self.to_bytes());
        hash.reverse();
        hex::encode(hash)
    }
}

pub(crate) fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

pub(crate) fn serialize_outputs(buf: &mut Vec<u8>, outputs: &[TxOutput]) {
    for out in outputs {
        buf.extend_from_slice(&out.value.to_le_bytes());
        write_varint(buf, out.script.len() as u64);
        buf.extend_from_slice(out.script.as_bytes());
    }
}

fn serialize(tx: &UnsignedTransaction, script_sigs: &[Script]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());

    write_varint(&mut buf, tx.inputs.len() as u64);
    for (input, script_sig) in tx.inputs.iter().zip(script_sigs) {
        buf.extend_from_slice(&input.prevout.txid);
        buf.extend_from_slice(&input.prevout.vout.to_le_bytes());
        write_varint(&mut buf, script_sig.len() as u64);
        buf.extend_from_slice(script_sig.as_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }

    write_varint(&mut buf, tx.outputs.len() as u64);
    serialize_outputs(&mut buf, &tx.outputs);

    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_in_one_out() -> UnsignedTransaction {
        let mut tx = UnsignedTransaction::new(50);
        tx.inputs.push(TxInput {
            prevout: OutPoint::placeholder(),
            sequence: DEFAULT_SEQUENCE,
            unlock: Unlock::P2pkh,
            spends: Some(SpentOutput {
                script: Script::p2pkh(&[0x22; 20]),
                value: 1000,
            }),
        });
        tx.outputs.push(TxOutput {
            value: 950,
            script: Script::from_bytes(vec![0x51]),
        });
        tx
    }

    #[test]
    fn outpoint_display_order() {
        let hex_id = "00000000000000000000000000000000000000000000000000000000000000ff";
        let op = OutPoint::from_display_txid(hex_id, 3).unwrap();
        assert_eq!(op.txid[0], 0xff);
        assert_eq!(op.display_txid(), hex_id);
        assert_eq!(op.to_string(), format!("{hex_id}:3"));
        assert!(OutPoint::from_display_txid("abcd", 0).is_err());
    }

    #[test]
    fn unsigned_wire_layout() {
        let bytes = one_in_one_out().to_bytes();
        // version + 1 input (36 + 1 + 4) + 1 output (8 + 1 + 1) + locktime
        assert_eq!(bytes.len(), 4 + 1 + 41 + 1 + 10 + 4);
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn fee_invariant() {
        let mut tx = one_in_one_out();
        assert!(tx.fee_covered());
        tx.outputs[0].value = 951;
        assert!(!tx.fee_covered());
        tx.fee = 2000;
        tx.outputs[0].value = 0;
        assert!(!tx.fee_covered());
    }

    #[test]
    fn signed_p2pkh_script_sig() {
        let unsigned = one_in_one_out();
        let signed = SignedTransaction {
            signatures: vec![Some(InputSignature {
                signature: vec![0x30, 0x01, 0x41],
            })],
            public_key: vec![0x02; 33],
            unsigned: unsigned.clone(),
        };
        let unsigned_len = unsigned.to_bytes().len();
        // push(3-byte sig) + push(33-byte key)
        assert_eq!(signed.to_bytes().len(), unsigned_len + 4 + 34);
        assert_eq!(signed.txid().len(), 64);
    }

    #[test]
    fn varint_boundaries() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0xfc);
        assert_eq!(buf, vec![0xfc]);
        buf.clear();
        write_varint(&mut buf, 0xfd);
        assert_eq!(buf, vec![0xfd, 0xfd, 0x00]);
        buf.clear();
        write_varint(&mut buf, 0x1_0000);
        assert_eq!(buf, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn unspent_output_json() {
        let utxo: UnspentOutput = serde_json::from_str(
            r#"{"txid":"00000000000000000000000000000000000000000000000000000000000000aa","vout":1,"satoshis":500,"script":"51"}"#,
        )
        .unwrap();
        assert_eq!(utxo.output_index, 1);
        assert_eq!(utxo.script.as_bytes(), &[0x51]);
        assert_eq!(utxo.outpoint().unwrap().vout, 1);
    }
}
