use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interpreter::{ContractDescription, ContractInterpreter, MethodAbi, Param, ParamType};
use crate::script::{Script, UnlockingScript, push_bool, push_data, push_int};

/// A constructor or method argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Int(i64),
    Bool(bool),
    #[serde(with = "hex_bytes")]
    Bytes(Vec<u8>),
}

impl Arg {
    pub fn to_push(&self) -> Vec<u8> {
        match self {
            Arg::Int(n) => push_int(*n),
            Arg::Bool(b) => push_bool(*b),
            Arg::Bytes(data) => push_data(data),
        }
    }

    pub fn matches(&self, ty: ParamType) -> bool {
        matches!(
            (self, ty),
            (Arg::Int(_), ParamType::Int)
                | (Arg::Bool(_), ParamType::Bool)
                | (Arg::Bytes(_), ParamType::Bytes)
        )
    }

    fn type_name(&self) -> &'static str {
        match self {
            Arg::Int(_) => "int",
            Arg::Bool(_) => "bool",
            Arg::Bytes(_) => "bytes",
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Check `args` against the caller-supplied subset of `params`.
fn check_args(params: &[Param], args: &[Arg]) -> std::result::Result<(), String> {
    let expected: Vec<&Param> = params.iter().filter(|p| p.ty.is_user_supplied()).collect();
    if expected.len() != args.len() {
        return Err(format!(
            "expected {} arguments, got {}",
            expected.len(),
            args.len()
        ));
    }
    for (param, arg) in expected.iter().zip(args) {
        if !arg.matches(param.ty) {
            return Err(format!(
                "argument {} expects {:?}, got {}",
                param.name,
                param.ty,
                arg.type_name()
            ));
        }
    }
    Ok(())
}

/// A public function of a bound contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMethod {
    abi: MethodAbi,
}

impl ContractMethod {
    pub fn name(&self) -> &str {
        &self.abi.name
    }

    pub fn index(&self) -> u32 {
        self.abi.index
    }

    pub fn params(&self) -> &[Param] {
        &self.abi.params
    }

    /// Number of arguments the caller must supply.
    pub fn arity(&self) -> usize {
        self.abi
            .params
            .iter()
            .filter(|p| p.ty.is_user_supplied())
            .count()
    }

    pub fn takes_preimage(&self) -> bool {
        self.abi
            .params
            .iter()
            .any(|p| p.ty == ParamType::SigHashPreimage)
    }

    pub fn check_args(&self, args: &[Arg]) -> Result<()> {
        check_args(&self.abi.params, args).map_err(|reason| Error::InvalidMethodArgs {
            method: self.abi.name.clone(),
            reason,
        })
    }
}

/// A contract description bound to constructor arguments.
pub struct ContractInstance {
    interpreter: Arc<dyn ContractInterpreter>,
    description: Arc<ContractDescription>,
    constructor_args: Vec<Arg>,
    locking_predicate: Script,
    methods: BTreeMap<String, ContractMethod>,
}

impl ContractInstance {
    /// Parse `description`, check `args` against its constructor, and derive
    /// the locking predicate.
    pub fn bind(
        interpreter: Arc<dyn ContractInterpreter>,
        description: &serde_json::Value,
        args: Vec<Arg>,
    ) -> Result<Self> {
        let description = interpreter.parse(description)?;
        check_args(&description.constructor, &args).map_err(|reason| {
            Error::ContractLoad(format!("{} constructor: {reason}", description.name))
        })?;

        let locking_predicate = interpreter.locking_script(&description, &args)?;
        let methods = description
            .methods
            .iter()
            .map(|abi| (abi.name.clone(), ContractMethod { abi: abi.clone() }))
            .collect();

        Ok(Self {
            interpreter,
            description: Arc::new(description),
            constructor_args: args,
            locking_predicate,
            methods,
        })
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn description(&self) -> &ContractDescription {
        &self.description
    }

    pub fn constructor_args(&self) -> &[Arg] {
        &self.constructor_args
    }

    pub fn locking_predicate(&self) -> &Script {
        &self.locking_predicate
    }

    pub fn methods(&self) -> impl Iterator<Item = &ContractMethod> {
        self.methods.values()
    }

    pub fn method(&self, name: &str) -> Result<&ContractMethod> {
        self.methods
            .get(name)
            .ok_or_else(|| Error::UnknownMethod(name.to_string()))
    }

    /// Evaluate `name(args)` into an unlocking script.
    pub fn unlocking_script(
        &self,
        name: &str,
        args: &[Arg],
        preimage: Option<&[u8]>,
    ) -> Result<UnlockingScript> {
        let method = self.method(name)?;
        method.check_args(args)?;
        self.interpreter
            .unlocking_script(&self.description, &method.abi, args, preimage)
    }
}

impl fmt::Debug for ContractInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractInstance")
            .field("name", &self.description.name)
            .field("constructor_args", &self.constructor_args)
            .field("locking_predicate", &self.locking_predicate)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
