//! Raw script bytes and the push encodings used by locking and unlocking scripts.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// A serialized script.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| Error::Script(format!("invalid script hex: {e}")))
    }

    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.push(OP_DUP);
        bytes.push(OP_HASH160);
        bytes.push(20);
        bytes.extend_from_slice(pubkey_hash);
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode a data push with the smallest opcode able to carry it.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut out = Vec::with_capacity(len + 5);
    if len < OP_PUSHDATA1 as usize {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Minimal script-number encoding (little-endian sign-magnitude).
pub fn script_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // The top bit carries the sign; add a byte if the magnitude already uses it.
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Push an integer, using the small-integer opcodes where possible.
pub fn push_int(n: i64) -> Vec<u8> {
    match n {
        0 => vec![OP_0],
        -1 => vec![OP_1NEGATE],
        1..=16 => vec![OP_1 + (n as u8) - 1],
        _ => push_data(&script_num(n)),
    }
}

pub fn push_bool(b: bool) -> Vec<u8> {
    if b { vec![OP_1] } else { vec![OP_0] }
}

/// One element of an unlocking script under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Already-encoded script bytes.
    Raw(Vec<u8>),
    /// Filled with a push of the input signature at signing time.
    Signature,
}

/// Unlocking script whose signature slots are filled when the transaction is signed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockingScript {
    chunks: Vec<Chunk>,
}

impl UnlockingScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw(&mut self, bytes: Vec<u8>) {
        self.chunks.push(Chunk::Raw(bytes));
    }

    pub fn push_signature_slot(&mut self) {
        self.chunks.push(Chunk::Signature);
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn signature_slots(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c, Chunk::Signature))
            .count()
    }

    /// Render to bytes. Unfilled signature slots become `OP_0`.
    pub fn render(&self, signature: Option<&[u8]>) -> Script {
        let mut bytes = Vec::new();
        for chunk in &self.chunks {
            match (chunk, signature) {
                (Chunk::Raw(raw), _) => bytes.extend_from_slice(raw),
                (Chunk::Signature, Some(sig)) => bytes.extend(push_data(sig)),
                (Chunk::Signature, None) => bytes.push(OP_0),
            }
        }
        Script(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_use_opcodes() {
        assert_eq!(push_int(0), vec![OP_0]);
        assert_eq!(push_int(-1), vec![OP_1NEGATE]);
        assert_eq!(push_int(1), vec![0x51]);
        assert_eq!(push_int(16), vec![0x60]);
        assert_eq!(push_int(17), vec![0x01, 0x11]);
    }

    #[test]
    fn script_num_sign_handling() {
        assert_eq!(script_num(127), vec![0x7f]);
        assert_eq!(script_num(128), vec![0x80, 0x00]);
        assert_eq!(script_num(-1), vec![0x81]);
        assert_eq!(script_num(-128), vec![0x80, 0x80]);
        assert_eq!(script_num(255), vec![0xff, 0x00]);
        assert_eq!(script_num(256), vec![0x00, 0x01]);
        assert_eq!(script_num(i64::MIN).len(), 9);
    }

    #[test]
    fn push_data_length_prefixes() {
        assert_eq!(push_data(&[0xaa; 3])[0], 3);
        let long = push_data(&[0u8; 0x4c]);
        assert_eq!(&long[..2], &[OP_PUSHDATA1, 0x4c]);
        let longer = push_data(&[0u8; 0x100]);
        assert_eq!(&longer[..3], &[OP_PUSHDATA2, 0x00, 0x01]);
        assert_eq!(longer.len(), 0x100 + 3);
    }

    #[test]
    fn p2pkh_layout() {
        let script = Script::p2pkh(&[0x11; 20]);
        assert_eq!(script.len(), 25);
        assert_eq!(script.as_bytes()[0], OP_DUP);
        assert_eq!(script.as_bytes()[24], OP_CHECKSIG);
    }

    #[test]
    fn unlocking_script_fills_signature_slot() {
        let mut unlocking = UnlockingScript::new();
        unlocking.push_raw(push_int(5));
        unlocking.push_signature_slot();
        assert_eq!(unlocking.signature_slots(), 1);

        assert_eq!(unlocking.render(None).as_bytes(), &[0x55, OP_0]);
        assert_eq!(
            unlocking.render(Some(&[0xde, 0xad])).as_bytes(),
            &[0x55, 0x02, 0xde, 0xad]
        );
    }

    #[test]
    fn script_hex_serde() {
        let script = Script::from_hex("76a9").unwrap();
        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(json, "\"76a9\"");
        let back: Script = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);
        assert!(Script::from_hex("zz").is_err());
    }
}
