//! ABI data model: type descriptors, parameters and function entries

use std::fmt;

use serde::{Deserialize, Serialize};

use super::selector;

/// 4-byte function selector
pub type Selector = [u8; 4];

/// Format a selector as `0x`-prefixed lowercase hex
pub fn selector_hex(selector: Selector) -> String {
    format!("0x{}", hex::encode(selector))
}

/// A resolved ABI type.
///
/// Built once by the parser from the JSON `type`/`components` pair; every later
/// stage matches on this instead of re-reading type strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Address,
    Bool,
    /// Unsigned integer, width in bits (8..=256, step 8)
    Uint(u16),
    /// Signed integer, width in bits (8..=256, step 8)
    Int(u16),
    /// `bytesN`, 1..=32
    FixedBytes(u8),
    /// Dynamic `bytes`
    Bytes,
    String,
    /// `T[n]` when the length is set, `T[]` otherwise
    Array(Box<TypeDescriptor>, Option<usize>),
    Tuple(Vec<TupleField>),
}

/// A named tuple component. Names may repeat or be empty; order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleField {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl TypeDescriptor {
    /// Canonical spelling used in signatures (`uint256`, `(address,bytes)[]`, ...)
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Whether this type is encoded out-of-line (offset in the head, data in the tail)
    pub fn is_dynamic(&self) -> bool {
        match self {
            TypeDescriptor::Bytes | TypeDescriptor::String => true,
            TypeDescriptor::Array(_, None) => true,
            TypeDescriptor::Array(element, Some(_)) => element.is_dynamic(),
            TypeDescriptor::Tuple(fields) => fields.iter().any(|field| field.ty.is_dynamic()),
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Address => f.write_str("address"),
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::Uint(bits) => write!(f, "uint{}", bits),
            TypeDescriptor::Int(bits) => write!(f, "int{}", bits),
            TypeDescriptor::FixedBytes(size) => write!(f, "bytes{}", size),
            TypeDescriptor::Bytes => f.write_str("bytes"),
            TypeDescriptor::String => f.write_str("string"),
            TypeDescriptor::Array(element, Some(len)) => write!(f, "{}[{}]", element, len),
            TypeDescriptor::Array(element, None) => write!(f, "{}[]", element),
            TypeDescriptor::Tuple(fields) => {
                f.write_str("(")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", field.ty)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A function, event or error parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name (may be empty)
    pub name: String,
    pub ty: TypeDescriptor,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Kind of an ABI entry. Only `Function` participates in call-data dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Function,
    Constructor,
    Fallback,
    Receive,
    Event,
    Error,
}

impl EntryKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "function" => Some(EntryKind::Function),
            "constructor" => Some(EntryKind::Constructor),
            "fallback" => Some(EntryKind::Fallback),
            "receive" => Some(EntryKind::Receive),
            "event" => Some(EntryKind::Event),
            "error" => Some(EntryKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Function => "function",
            EntryKind::Constructor => "constructor",
            EntryKind::Fallback => "fallback",
            EntryKind::Receive => "receive",
            EntryKind::Event => "event",
            EntryKind::Error => "error",
        }
    }
}

/// One entry of an ABI definition with its derived signature and selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub kind: EntryKind,
    /// Entry name (empty for constructor, fallback and receive)
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    /// `stateMutability` as declared, if present
    pub state_mutability: Option<String>,
    signature: String,
    #[serde(serialize_with = "serialize_selector")]
    selector: Selector,
}

fn serialize_selector<S: serde::Serializer>(selector: &Selector, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&selector_hex(*selector))
}

impl FunctionEntry {
    pub fn new(
        kind: EntryKind,
        name: impl Into<String>,
        inputs: Vec<Param>,
        outputs: Vec<Param>,
    ) -> Self {
        let name = name.into();
        let signature = selector::signature(&name, &inputs);
        let selector = selector::selector_of(&signature);
        Self {
            kind,
            name,
            inputs,
            outputs,
            state_mutability: None,
            signature,
            selector,
        }
    }

    /// Shorthand for a `function` entry
    pub fn function(name: impl Into<String>, inputs: Vec<Param>, outputs: Vec<Param>) -> Self {
        Self::new(EntryKind::Function, name, inputs, outputs)
    }

    pub fn with_state_mutability(mut self, mutability: impl Into<String>) -> Self {
        self.state_mutability = Some(mutability.into());
        self
    }

    /// Canonical signature, e.g. `transfer(address,uint256)`
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// First 4 bytes of keccak256 of the canonical signature
    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn selector_hex(&self) -> String {
        selector_hex(self.selector)
    }

    pub fn is_function(&self) -> bool {
        self.kind == EntryKind::Function
    }
}

/// Ordered set of ABI entries, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbiDefinition {
    entries: Vec<FunctionEntry>,
}

impl AbiDefinition {
    pub fn new(entries: Vec<FunctionEntry>) -> Self {
        Self { entries }
    }

    /// All entries, including events, errors and constructors
    pub fn entries(&self) -> &[FunctionEntry] {
        &self.entries
    }

    /// Callable functions in declaration order
    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.iter().filter(|entry| entry.is_function())
    }

    pub fn constructor(&self) -> Option<&FunctionEntry> {
        self.entries
            .iter()
            .find(|entry| entry.kind == EntryKind::Constructor)
    }

    /// Find a function by canonical signature, or by bare name when unambiguous
    pub fn function(&self, name_or_signature: &str) -> Option<&FunctionEntry> {
        if name_or_signature.contains('(') {
            return self
                .functions()
                .find(|entry| entry.signature() == name_or_signature);
        }
        let mut matches = self
            .functions()
            .filter(|entry| entry.name == name_or_signature);
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions().any(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
