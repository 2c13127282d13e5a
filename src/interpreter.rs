//! Contract-description interpretation.
//!
//! [`ScryptInterpreter`] reads compiled sCrypt artifacts: an `abi` array
//! describing the constructor and public functions, and a `hex` script
//! template in which constructor parameters appear as `<name>` placeholders.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::contract::Arg;
use crate::error::{Error, Result};
use crate::script::{Script, UnlockingScript, push_data, push_int};

/// Parameter type as far as the engine needs to know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Bool,
    /// Any byte-string type (`bytes`, `PubKey`, `Ripemd160`, ...).
    Bytes,
    /// Filled with the wallet identity's signature at signing time.
    Sig,
    /// Filled with the spending input's preimage at build time.
    SigHashPreimage,
}

impl ParamType {
    pub fn parse(type_name: &str) -> Option<Self> {
        match type_name {
            "int" | "bigint" | "PrivKey" => Some(Self::Int),
            "bool" | "boolean" => Some(Self::Bool),
            "bytes" | "ByteString" | "PubKey" | "PubKeyHash" | "Ripemd160" | "Sha1"
            | "Sha256" | "SigHashType" | "OpCodeType" | "Addr" => Some(Self::Bytes),
            "Sig" => Some(Self::Sig),
            "SigHashPreimage" => Some(Self::SigHashPreimage),
            _ => None,
        }
    }

    /// Whether the caller supplies this parameter (as opposed to the engine).
    pub fn is_user_supplied(self) -> bool {
        !matches!(self, Self::Sig | Self::SigHashPreimage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodAbi {
    pub name: String,
    pub index: u32,
    pub params: Vec<Param>,
}

/// A parsed contract description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractDescription {
    pub name: String,
    pub constructor: Vec<Param>,
    pub methods: Vec<MethodAbi>,
    pub template: String,
}

/// Turns an opaque contract description into scripts.
pub trait ContractInterpreter: Send + Sync {
    fn parse(&self, description: &serde_json::Value) -> Result<ContractDescription>;

    /// Locking script for constructor `args`, already arity/type checked.
    fn locking_script(&self, description: &ContractDescription, args: &[Arg]) -> Result<Script>;

    /// Unlocking script for a call to `method`, already arity/type checked.
    fn unlocking_script(
        &self,
        description: &ContractDescription,
        method: &MethodAbi,
        args: &[Arg],
        preimage: Option<&[u8]>,
    ) -> Result<UnlockingScript>;
}

#[derive(Deserialize)]
struct Artifact {
    contract: String,
    abi: Vec<AbiEntry>,
    hex: String,
}

#[derive(Deserialize)]
struct AbiEntry {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    index: Option<u32>,
    #[serde(default)]
    params: Vec<AbiParam>,
}

#[derive(Deserialize)]
struct AbiParam {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

/// Interpreter for sCrypt compiler artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScryptInterpreter;

impl ScryptInterpreter {
    fn convert_params(params: Vec<AbiParam>, owner: &str) -> Result<Vec<Param>> {
        params
            .into_iter()
            .map(|p| {
                let ty = ParamType::parse(&p.ty).ok_or_else(|| {
                    Error::ContractLoad(format!("{owner}: unsupported parameter type {}", p.ty))
                })?;
                Ok(Param { name: p.name, ty })
            })
            .collect()
    }
}

/// Split a template into literal hex and placeholder names.
enum Segment<'a> {
    Hex(&'a str),
    Placeholder(&'a str),
}

fn segments(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('<') {
        if start > 0 {
            out.push(Segment::Hex(&rest[..start]));
        }
        let end = rest[start..]
            .find('>')
            .ok_or_else(|| Error::ContractLoad("unterminated placeholder in template".into()))?;
        out.push(Segment::Placeholder(&rest[start + 1..start + end]));
        rest = &rest[start + end + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Hex(rest));
    }
    Ok(out)
}

impl ContractInterpreter for ScryptInterpreter {
    fn parse(&self, description: &serde_json::Value) -> Result<ContractDescription> {
        let artifact = Artifact::deserialize(description)
            .map_err(|e| Error::ContractLoad(format!("malformed description: {e}")))?;

        let mut constructor = None;
        let mut methods = Vec::new();
        let mut seen = HashSet::new();
        for entry in artifact.abi {
            match entry.kind.as_str() {
                "constructor" => {
                    if constructor.is_some() {
                        return Err(Error::ContractLoad("multiple constructors".into()));
                    }
                    let params = Self::convert_params(entry.params, "constructor")?;
                    if params.iter().any(|p| !p.ty.is_user_supplied()) {
                        return Err(Error::ContractLoad(
                            "constructor parameters must be caller supplied".into(),
                        ));
                    }
                    constructor = Some(params);
                }
                "function" => {
                    let name = entry
                        .name
                        .ok_or_else(|| Error::ContractLoad("function without a name".into()))?;
                    if !seen.insert(name.clone()) {
                        return Err(Error::ContractLoad(format!("duplicate function {name}")));
                    }
                    let params = Self::convert_params(entry.params, &name)?;
                    let index = entry.index.unwrap_or(methods.len() as u32);
                    methods.push(MethodAbi {
                        name,
                        index,
                        params,
                    });
                }
                other => {
                    return Err(Error::ContractLoad(format!("unknown abi entry type {other}")));
                }
            }
        }
        let constructor = constructor.unwrap_or_default();

        for segment in segments(&artifact.hex)? {
            match segment {
                Segment::Hex(h) => {
                    hex::decode(h)
                        .map_err(|e| Error::ContractLoad(format!("template is not hex: {e}")))?;
                }
                Segment::Placeholder(name) => {
                    if !constructor.iter().any(|p| p.name == name) {
                        return Err(Error::ContractLoad(format!(
                            "template references unknown parameter {name}"
                        )));
                    }
                }
            }
        }

        Ok(ContractDescription {
            name: artifact.contract,
            constructor,
            methods,
            template: artifact.hex,
        })
    }

    fn locking_script(&self, description: &ContractDescription, args: &[Arg]) -> Result<Script> {
        let mut bytes = Vec::new();
        for segment in segments(&description.template)? {
            match segment {
                Segment::Hex(h) => bytes.extend(
                    hex::decode(h).map_err(|e| Error::ContractLoad(format!("template: {e}")))?,
                ),
                Segment::Placeholder(name) => {
                    let position = description
                        .constructor
                        .iter()
                        .position(|p| p.name == name)
                        .ok_or_else(|| {
                            Error::ContractLoad(format!("unknown template parameter {name}"))
                        })?;
                    let arg = args.get(position).ok_or_else(|| {
                        Error::ContractLoad(format!("missing argument for {name}"))
                    })?;
                    bytes.extend(arg.to_push());
                }
            }
        }
        Ok(Script::from_bytes(bytes))
    }

    fn unlocking_script(
        &self,
        description: &ContractDescription,
        method: &MethodAbi,
        args: &[Arg],
        preimage: Option<&[u8]>,
    ) -> Result<UnlockingScript> {
        let mut script = UnlockingScript::new();
        let mut user_args = args.iter();
        for param in &method.params {
            match param.ty {
                ParamType::SigHashPreimage => {
                    let preimage = preimage.ok_or_else(|| {
                        Error::PreimageComputation(format!(
                            "{} requires a preimage for {}",
                            method.name, param.name
                        ))
                    })?;
                    script.push_raw(push_data(preimage));
                }
                ParamType::Sig => script.push_signature_slot(),
                _ => {
                    let arg = user_args.next().ok_or_else(|| Error::InvalidMethodArgs {
                        method: method.name.clone(),
                        reason: format!("missing argument {}", param.name),
                    })?;
                    script.push_raw(arg.to_push());
                }
            }
        }
        if description.methods.len() > 1 {
            script.push_raw(push_int(i64::from(method.index)));
        }
        Ok(script)
    }
}
