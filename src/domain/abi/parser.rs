//! ABI JSON parser - validates raw interface JSON into an `AbiDefinition`
//!
//! The whole document is rejected on the first invalid entry or type; a partial
//! ABI is never returned.

use serde::Deserialize;

use super::error::AbiError;
use super::types::{AbiDefinition, EntryKind, FunctionEntry, Param, TupleField, TypeDescriptor};

/// Raw ABI entry as it appears in JSON
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    inputs: Option<Vec<RawParam>>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    #[serde(rename = "stateMutability")]
    state_mutability: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    ty: Option<String>,
    components: Option<Vec<RawParam>>,
}

/// Stateless ABI JSON parser
pub struct AbiParser;

impl AbiParser {
    /// Parse ABI JSON text. Accepts a bare array, or an artifact object with an `abi` array.
    pub fn parse(json: &str) -> Result<AbiDefinition, AbiError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|err| AbiError::malformed(err.to_string()))?;
        Self::parse_value(value)
    }

    pub fn parse_value(value: serde_json::Value) -> Result<AbiDefinition, AbiError> {
        let value = match value {
            serde_json::Value::Object(mut object)
                if object.get("abi").is_some_and(|abi| abi.is_array()) =>
            {
                object.remove("abi").unwrap_or_default()
            }
            other => other,
        };
        let serde_json::Value::Array(items) = value else {
            return Err(AbiError::malformed("expected a JSON array of ABI entries"));
        };

        let mut entries = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let raw: RawEntry = serde_json::from_value(item)
                .map_err(|err| AbiError::malformed(format!("entry {}: {}", idx, err)))?;
            entries.push(Self::parse_entry(idx, raw)?);
        }

        Ok(AbiDefinition::new(entries))
    }

    fn parse_entry(idx: usize, raw: RawEntry) -> Result<FunctionEntry, AbiError> {
        let kind_str = raw
            .kind
            .ok_or_else(|| AbiError::malformed(format!("entry {}: missing 'type'", idx)))?;
        let kind = EntryKind::parse(&kind_str).ok_or_else(|| {
            AbiError::malformed(format!("entry {}: unknown entry type '{}'", idx, kind_str))
        })?;

        let name = match (kind, raw.name) {
            (_, Some(name)) => name,
            (EntryKind::Function, None) => {
                return Err(AbiError::malformed(format!(
                    "entry {}: function is missing 'name'",
                    idx
                )))
            }
            (_, None) => String::new(),
        };

        let raw_inputs = match (kind, raw.inputs) {
            (_, Some(inputs)) => inputs,
            (EntryKind::Function, None) => {
                return Err(AbiError::malformed(format!(
                    "entry {}: function '{}' is missing 'inputs'",
                    idx, name
                )))
            }
            (_, None) => Vec::new(),
        };

        let inputs = Self::parse_params(&raw_inputs)?;
        let outputs = Self::parse_params(&raw.outputs)?;

        let mut entry = FunctionEntry::new(kind, name, inputs, outputs);
        if let Some(mutability) = raw.state_mutability {
            entry = entry.with_state_mutability(mutability);
        }
        Ok(entry)
    }

    fn parse_params(raw: &[RawParam]) -> Result<Vec<Param>, AbiError> {
        raw.iter()
            .map(|param| {
                let ty = param
                    .ty
                    .as_deref()
                    .ok_or_else(|| {
                        AbiError::malformed(format!(
                            "parameter '{}' is missing 'type'",
                            param.name
                        ))
                    })?;
                Ok(Param::new(
                    param.name.clone(),
                    parse_type(ty, param.components.as_deref())?,
                ))
            })
            .collect()
    }
}

/// Deepest nesting of array dimensions and tuple levels a type may have
pub const MAX_TYPE_DEPTH: usize = 32;

/// Parse one ABI type string, resolving `tuple` against its components.
///
/// `uint`/`int` are canonicalized to their 256-bit forms.
fn parse_type(ty: &str, components: Option<&[RawParam]>) -> Result<TypeDescriptor, AbiError> {
    parse_nested(ty, components, 0)
}

/// `depth` is the nesting already spent by enclosing tuples and arrays
fn parse_nested(
    ty: &str,
    components: Option<&[RawParam]>,
    depth: usize,
) -> Result<TypeDescriptor, AbiError> {
    let ty = ty.trim();

    // Array suffixes, innermost first: "uint8[2][]" -> [Some(2), None]
    let mut base = ty;
    let mut dims = Vec::new();
    while let Some(stripped) = base.strip_suffix(']') {
        let open = stripped
            .rfind('[')
            .ok_or_else(|| AbiError::unsupported(ty, "unbalanced array brackets"))?;
        let len = &stripped[open + 1..];
        let dim = if len.is_empty() {
            None
        } else {
            let n: usize = len
                .parse()
                .map_err(|_| AbiError::unsupported(ty, format!("invalid array length '{}'", len)))?;
            if n == 0 {
                return Err(AbiError::unsupported(ty, "fixed array length must be positive"));
            }
            Some(n)
        };
        dims.push(dim);
        if depth + dims.len() > MAX_TYPE_DEPTH {
            return Err(AbiError::unsupported(ty, "nesting too deep"));
        }
        base = &stripped[..open];
    }
    dims.reverse();

    let mut descriptor = parse_base(ty, base, components, depth + dims.len())?;
    for dim in dims {
        descriptor = TypeDescriptor::Array(Box::new(descriptor), dim);
    }
    Ok(descriptor)
}

fn parse_base(
    full: &str,
    base: &str,
    components: Option<&[RawParam]>,
    depth: usize,
) -> Result<TypeDescriptor, AbiError> {
    let descriptor = match base {
        "address" => TypeDescriptor::Address,
        "bool" => TypeDescriptor::Bool,
        "string" => TypeDescriptor::String,
        "bytes" => TypeDescriptor::Bytes,
        "uint" => TypeDescriptor::Uint(256),
        "int" => TypeDescriptor::Int(256),
        "tuple" => {
            let components = components
                .ok_or_else(|| AbiError::unsupported(full, "tuple without components"))?;
            if components.is_empty() {
                return Err(AbiError::unsupported(full, "tuple must have at least one component"));
            }
            if depth >= MAX_TYPE_DEPTH {
                return Err(AbiError::unsupported(full, "nesting too deep"));
            }
            let fields = components
                .iter()
                .map(|component| {
                    let ty = component.ty.as_deref().ok_or_else(|| {
                        AbiError::malformed(format!(
                            "tuple component '{}' is missing 'type'",
                            component.name
                        ))
                    })?;
                    Ok(TupleField {
                        name: component.name.clone(),
                        ty: parse_nested(ty, component.components.as_deref(), depth + 1)?,
                    })
                })
                .collect::<Result<Vec<_>, AbiError>>()?;
            TypeDescriptor::Tuple(fields)
        }
        _ => {
            if let Some(bits) = base.strip_prefix("uint") {
                TypeDescriptor::Uint(parse_bits(full, bits)?)
            } else if let Some(bits) = base.strip_prefix("int") {
                TypeDescriptor::Int(parse_bits(full, bits)?)
            } else if let Some(size) = base.strip_prefix("bytes") {
                let size: u8 = size
                    .parse()
                    .map_err(|_| {
                        AbiError::unsupported(full, format!("invalid bytes size '{}'", size))
                    })?;
                if !(1..=32).contains(&size) {
                    return Err(AbiError::unsupported(full, "bytesN size must be within 1..=32"));
                }
                TypeDescriptor::FixedBytes(size)
            } else {
                return Err(AbiError::unsupported(full, format!("unknown base type '{}'", base)));
            }
        }
    };
    Ok(descriptor)
}

fn parse_bits(full: &str, bits: &str) -> Result<u16, AbiError> {
    let value: u16 = bits
        .parse()
        .map_err(|_| AbiError::unsupported(full, format!("invalid bit width '{}'", bits)))?;
    if value == 0 || value > 256 || value % 8 != 0 {
        return Err(AbiError::unsupported(
            full,
            "bit width must be a multiple of 8 within 8..=256",
        ));
    }
    Ok(value)
}
