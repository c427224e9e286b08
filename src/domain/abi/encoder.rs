//! ABI encoder - the inverse of the decoder.
//!
//! Turns `DecodedValue`s back into head/tail encoded bytes. Used to build call
//! data for tests and to check that decoding loses nothing.

use super::error::AbiError;
use super::layout::{Layout, WORD};
use super::types::{FunctionEntry, Param, TypeDescriptor};
use super::value::DecodedValue;

/// Encode a function call: `selector ++ encode(args)`
pub fn encode_call(function: &FunctionEntry, args: &[DecodedValue]) -> Result<Vec<u8>, AbiError> {
    let mut out = function.selector().to_vec();
    out.extend(encode_params(&function.inputs, args)?);
    Ok(out)
}

/// Encode values for a parameter list
pub fn encode_params(params: &[Param], values: &[DecodedValue]) -> Result<Vec<u8>, AbiError> {
    if params.len() != values.len() {
        return Err(AbiError::ArgumentMismatch {
            reason: format!(
                "argument count mismatch: ABI has {}, got {}",
                params.len(),
                values.len()
            ),
        });
    }
    let types: Vec<&TypeDescriptor> = params.iter().map(|param| &param.ty).collect();
    encode_sequence(&types, values)
}

fn encode_sequence(
    types: &[&TypeDescriptor],
    values: &[DecodedValue],
) -> Result<Vec<u8>, AbiError> {
    let layouts: Vec<Layout> = types.iter().map(|ty| Layout::of(ty)).collect();
    let head_len: usize = layouts.iter().map(|layout| layout.head_size).sum();

    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for ((ty, layout), value) in types.iter().zip(&layouts).zip(values) {
        let encoded = encode_value(ty, value)?;
        if layout.dynamic {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encoded);
        } else {
            head.extend(encoded);
        }
    }
    head.extend(tail);
    Ok(head)
}

fn encode_value(ty: &TypeDescriptor, value: &DecodedValue) -> Result<Vec<u8>, AbiError> {
    let mismatch = || AbiError::ArgumentMismatch {
        reason: format!("cannot encode {} as {}", value.kind(), ty),
    };

    match (ty, value) {
        (TypeDescriptor::Address, DecodedValue::Address(addr)) => {
            let mut word = vec![0u8; 12];
            word.extend_from_slice(addr.as_slice());
            Ok(word)
        }
        (TypeDescriptor::Bool, DecodedValue::Bool(flag)) => Ok(usize_word(*flag as usize).to_vec()),
        (TypeDescriptor::Uint(_), DecodedValue::Uint(v, _)) => Ok(v.to_be_bytes::<32>().to_vec()),
        (TypeDescriptor::Int(_), DecodedValue::Int(v, _)) => {
            Ok(v.into_raw().to_be_bytes::<32>().to_vec())
        }
        (TypeDescriptor::FixedBytes(size), DecodedValue::Bytes(bytes)) => {
            if bytes.len() != *size as usize {
                return Err(mismatch());
            }
            Ok(pad_right(bytes))
        }
        (TypeDescriptor::Bytes, DecodedValue::Bytes(bytes)) => Ok(length_prefixed(bytes)),
        (TypeDescriptor::String, DecodedValue::Str { value, .. }) => {
            Ok(length_prefixed(value.as_bytes()))
        }
        (TypeDescriptor::Array(element, len), DecodedValue::List(items)) => {
            if let Some(n) = len {
                if items.len() != *n {
                    return Err(mismatch());
                }
            }
            let types = vec![element.as_ref(); items.len()];
            let body = encode_sequence(&types, items)?;
            match len {
                Some(_) => Ok(body),
                None => {
                    let mut out = usize_word(items.len()).to_vec();
                    out.extend(body);
                    Ok(out)
                }
            }
        }
        (TypeDescriptor::Tuple(fields), DecodedValue::Struct(values)) => {
            if fields.len() != values.len() {
                return Err(mismatch());
            }
            let types: Vec<&TypeDescriptor> = fields.iter().map(|field| &field.ty).collect();
            let values: Vec<DecodedValue> = values.iter().map(|(_, v)| v.clone()).collect();
            encode_sequence(&types, &values)
        }
        _ => Err(mismatch()),
    }
}

fn usize_word(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn pad_right(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    out.resize(padded, 0);
    out
}

fn length_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = usize_word(bytes.len()).to_vec();
    out.extend(pad_right(bytes));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::abi::decoder::decode_params;
    use alloy_primitives::{Address, U256};

    #[test]
    fn test_encode_transfer_matches_known_calldata() {
        let transfer = FunctionEntry::function(
            "transfer",
            vec![
                Param::new("to", TypeDescriptor::Address),
                Param::new("amount", TypeDescriptor::Uint(256)),
            ],
            vec![],
        );
        let to = Address::from_slice(&[0x11; 20]);
        let data = encode_call(
            &transfer,
            &[
                DecodedValue::Address(to),
                DecodedValue::Uint(U256::from(1000u64), 256),
            ],
        )
        .unwrap();

        assert_eq!(
            hex::encode(&data),
            format!(
                "a9059cbb{:0>64}{:0>64}",
                "11".repeat(20),
                "3e8"
            )
        );
    }

    #[test]
    fn test_nested_dynamic_round_trip() {
        let params = vec![Param::new(
            "blobs",
            TypeDescriptor::Array(
                Box::new(TypeDescriptor::Array(Box::new(TypeDescriptor::Bytes), None)),
                Some(2),
            ),
        )];
        let values = vec![DecodedValue::List(vec![
            DecodedValue::List(vec![DecodedValue::Bytes(vec![1, 2, 3])]),
            DecodedValue::List(vec![
                DecodedValue::Bytes(vec![]),
                DecodedValue::Bytes(vec![0xaa; 40]),
            ]),
        ])];

        let encoded = encode_params(&params, &values).unwrap();
        assert_eq!(encoded.len() % WORD, 0);
        assert_eq!(decode_params(&params, &encoded).unwrap(), values);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let params = vec![Param::new("b", TypeDescriptor::FixedBytes(4))];
        let err = encode_params(&params, &[DecodedValue::Bytes(vec![1, 2])]).unwrap_err();
        assert!(matches!(err, AbiError::ArgumentMismatch { .. }));
    }
}
