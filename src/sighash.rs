//! BIP143-style signature preimage with the BSV FORKID flag.

use crate::error::{Error, Result};
use crate::hash::sha256d;
use crate::script::Script;
use crate::tx::{UnsignedTransaction, serialize_outputs, write_varint};

/// `SIGHASH_ALL | SIGHASH_FORKID`
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Build the preimage signed for `input_index`.
///
/// `version ‖ hashPrevouts ‖ hashSequence ‖ outpoint ‖ scriptCode ‖ value ‖
/// nSequence ‖ hashOutputs ‖ nLockTime ‖ sighashType`
pub fn preimage(
    tx: &UnsignedTransaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
) -> Result<Vec<u8>> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        Error::PreimageComputation(format!(
            "input {input_index} out of range ({} inputs)",
            tx.inputs.len()
        ))
    })?;
    if script_code.is_empty() {
        return Err(Error::PreimageComputation(
            "missing prior locking script".into(),
        ));
    }

    let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
    let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
    for i in &tx.inputs {
        prevouts.extend_from_slice(&i.prevout.txid);
        prevouts.extend_from_slice(&i.prevout.vout.to_le_bytes());
        sequences.extend_from_slice(&i.sequence.to_le_bytes());
    }
    let mut outputs = Vec::new();
    serialize_outputs(&mut outputs, &tx.outputs);

    let mut buf = Vec::with_capacity(156 + script_code.len());
    buf.extend_from_slice(&tx.version.to_le_bytes());
    buf.extend_from_slice(&sha256d(&prevouts));
    buf.extend_from_slice(&sha256d(&sequences));
    buf.extend_from_slice(&input.prevout.txid);
    buf.extend_from_slice(&input.prevout.vout.to_le_bytes());
    write_varint(&mut buf, script_code.len() as u64);
    buf.extend_from_slice(script_code.as_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    buf.extend_from_slice(&sha256d(&outputs));
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());
    Ok(buf)
}

/// Digest actually signed for `input_index`.
pub fn digest(
    tx: &UnsignedTransaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
) -> Result<[u8; 32]> {
    preimage(tx, input_index, script_code, value).map(|p| sha256d(&p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{DEFAULT_SEQUENCE, OutPoint, TxInput, TxOutput, Unlock};

    fn tx() -> UnsignedTransaction {
        let mut tx = UnsignedTransaction::new(10);
        tx.inputs.push(TxInput {
            prevout: OutPoint::new([0x01; 32], 2),
            sequence: DEFAULT_SEQUENCE,
            unlock: Unlock::P2pkh,
            spends: None,
        });
        tx.outputs.push(TxOutput {
            value: 490,
            script: Script::from_bytes(vec![0x51]),
        });
        tx
    }

    #[test]
    fn layout_and_trailer() {
        let script = Script::from_bytes(vec![0x51, 0x52]);
        let p = preimage(&tx(), 0, &script, 500).unwrap();
        // 4 + 32 + 32 + 36 + (1 + 2) + 8 + 4 + 32 + 4 + 4
        assert_eq!(p.len(), 159);
        assert_eq!(&p[p.len() - 4..], &[0x41, 0, 0, 0]);
        assert_eq!(&p[68..100], &[0x01; 32]);
        assert_eq!(&p[107..115], &500u64.to_le_bytes());
    }

    #[test]
    fn changes_with_outputs() {
        let script = Script::from_bytes(vec![0x51]);
        let mut other = tx();
        other.outputs[0].value = 489;
        assert_ne!(
            digest(&tx(), 0, &script, 500).unwrap(),
            digest(&other, 0, &script, 500).unwrap()
        );
    }

    #[test]
    fn missing_context_fails() {
        let err = preimage(&tx(), 0, &Script::new(), 500).unwrap_err();
        assert!(matches!(err, Error::PreimageComputation(_)));
        let err = preimage(&tx(), 1, &Script::from_bytes(vec![0x51]), 500).unwrap_err();
        assert!(matches!(err, Error::PreimageComputation(_)));
    }
}
