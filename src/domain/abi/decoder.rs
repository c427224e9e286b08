//! Call-data decoder implementing the ABI head/tail layout
//!
//! Static values sit inline in the head. Dynamic values leave a 32-byte offset
//! in the head, measured from the start of the enclosing sequence (the payload
//! after the selector, a tuple's first byte, or an array's first element).

use alloy_primitives::{Address, I256, U256};

use super::error::{decode_hex, AbiError};
use super::layout::{Layout, LayoutKind, WORD};
use super::parser::AbiParser;
use super::registry::AbiRegistry;
use super::types::{AbiDefinition, FunctionEntry, Param, Selector, TypeDescriptor};
use super::value::DecodedValue;

/// Result of decoding a function call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    /// The matched function
    pub function: FunctionEntry,
    pub selector: Selector,
    /// Decoded arguments, one per input
    pub args: Vec<DecodedValue>,
}

/// Decoder bound to one ABI definition.
///
/// Pure and synchronous: share it across threads freely.
#[derive(Debug, Clone)]
pub struct AbiDecoder {
    abi: AbiDefinition,
    registry: AbiRegistry,
    /// Input layouts, indexed like `abi.entries()`
    input_layouts: Vec<Vec<Layout>>,
}

impl AbiDecoder {
    /// Create a new decoder for the given definition
    pub fn new(abi: AbiDefinition) -> Self {
        let registry = AbiRegistry::build(&abi);
        let input_layouts = abi
            .entries()
            .iter()
            .map(|entry| Layout::of_all(entry.inputs.iter().map(|param| &param.ty)))
            .collect();
        Self {
            abi,
            registry,
            input_layouts,
        }
    }

    /// Parse ABI JSON and build a decoder for it
    pub fn from_json(abi_json: &str) -> Result<Self, AbiError> {
        Ok(Self::new(AbiParser::parse(abi_json)?))
    }

    /// Get the underlying definition
    pub fn abi(&self) -> &AbiDefinition {
        &self.abi
    }

    /// Get the selector table
    pub fn registry(&self) -> &AbiRegistry {
        &self.registry
    }

    /// Decode `0x`-prefixed hex call data
    pub fn decode_hex(&self, calldata: &str) -> Result<DecodedCall, AbiError> {
        self.decode(&decode_hex(calldata)?)
    }

    /// Decode call data (selector followed by the ABI-encoded arguments)
    pub fn decode(&self, calldata: &[u8]) -> Result<DecodedCall, AbiError> {
        if calldata.len() < 4 {
            return Err(AbiError::TruncatedPayload {
                ty: "selector".into(),
                offset: 0,
                needed: 4,
                available: calldata.len(),
            });
        }

        let mut selector = [0u8; 4];
        selector.copy_from_slice(&calldata[..4]);
        let idx = self.registry.lookup(selector)?;

        let payload = &calldata[4..];
        let mut budget = Budget::for_payload(payload);
        let args = decode_sequence(payload, 0, self.input_layouts[idx].iter(), &mut budget)?;

        Ok(DecodedCall {
            function: self.abi.entries()[idx].clone(),
            selector,
            args,
        })
    }

    /// Decode return data of a function, found by signature or unambiguous name
    pub fn decode_output(
        &self,
        name_or_signature: &str,
        data: &[u8],
    ) -> Result<Vec<DecodedValue>, AbiError> {
        let function = self.abi.function(name_or_signature).ok_or_else(|| {
            AbiError::ArgumentMismatch {
                reason: format!("no unique function '{}' in the ABI", name_or_signature),
            }
        })?;
        decode_params(&function.outputs, data)
    }

    /// Decode constructor arguments (no selector prefix)
    pub fn decode_constructor(&self, data: &[u8]) -> Result<Vec<DecodedValue>, AbiError> {
        match self.abi.constructor() {
            Some(constructor) => decode_params(&constructor.inputs, data),
            None if data.is_empty() => Ok(Vec::new()),
            None => Err(AbiError::ArgumentMismatch {
                reason: "ABI declares no constructor but arguments were supplied".into(),
            }),
        }
    }
}

/// Decode an ABI-encoded parameter list (no selector)
pub fn decode_params(params: &[Param], data: &[u8]) -> Result<Vec<DecodedValue>, AbiError> {
    let layouts = Layout::of_all(params.iter().map(|param| &param.ty));
    decode_sequence(data, 0, layouts.iter(), &mut Budget::for_payload(data))
}

/// Decode a single value whose encoding starts at offset 0 of `data`, as if it
/// were the only element of a parameter list.
pub fn decode_single(ty: &TypeDescriptor, data: &[u8]) -> Result<DecodedValue, AbiError> {
    let layout = Layout::of(ty);
    let mut budget = Budget::for_payload(data);
    let mut values = decode_sequence(data, 0, std::iter::once(&layout), &mut budget)?;
    values.pop().ok_or_else(|| AbiError::ArgumentMismatch {
        reason: "empty decode result".into(),
    })
}

/// How many times the payload size decoded values may add up to
const EXPANSION_FACTOR: usize = 4;

/// Bytes the decoded values of one payload may still account for.
///
/// Every leaf is charged at least one word and `bytes`/`string` their length.
/// A canonical encoding never spends more than its own size; offsets that
/// alias one tail many times run out.
struct Budget {
    remaining: usize,
}

impl Budget {
    fn for_payload(data: &[u8]) -> Self {
        Self {
            remaining: data.len().saturating_mul(EXPANSION_FACTOR),
        }
    }

    fn charge(&mut self, amount: usize, layout: &Layout, offset: usize) -> Result<(), AbiError> {
        self.remaining = self
            .remaining
            .checked_sub(amount)
            .ok_or_else(|| AbiError::ExcessiveExpansion {
                ty: layout.type_name.clone(),
                offset,
            })?;
        Ok(())
    }
}

/// Decode a head/tail encoded sequence whose head starts at `base`
fn decode_sequence<'a>(
    data: &[u8],
    base: usize,
    layouts: impl Iterator<Item = &'a Layout>,
    budget: &mut Budget,
) -> Result<Vec<DecodedValue>, AbiError> {
    let mut values = Vec::new();
    let mut head = base;

    for layout in layouts {
        let value = if layout.dynamic {
            let offset = read_usize(data, head, layout)?;
            let position = base.checked_add(offset).ok_or_else(|| AbiError::InvalidOffset {
                ty: layout.type_name.clone(),
                offset: head,
            })?;
            decode_value(data, position, layout, budget)?
        } else {
            decode_value(data, head, layout, budget)?
        };
        values.push(value);
        head = head.saturating_add(layout.head_size);
    }

    Ok(values)
}

/// Decode `count` elements of one layout laid out as a sequence starting at `base`
fn decode_repeated(
    data: &[u8],
    base: usize,
    element: &Layout,
    count: usize,
    container: &Layout,
    budget: &mut Budget,
) -> Result<Vec<DecodedValue>, AbiError> {
    // Check the whole head up front so a hostile length cannot drive a huge loop
    let needed = count.checked_mul(element.head_size).unwrap_or(usize::MAX);
    let available = data.len().saturating_sub(base);
    if needed > available {
        return Err(AbiError::TruncatedPayload {
            ty: container.type_name.clone(),
            offset: base,
            needed,
            available,
        });
    }
    decode_sequence(data, base, std::iter::repeat(element).take(count), budget)
}

/// Decode one value whose encoding starts at `position`
fn decode_value(
    data: &[u8],
    position: usize,
    layout: &Layout,
    budget: &mut Budget,
) -> Result<DecodedValue, AbiError> {
    match &layout.kind {
        LayoutKind::Address
        | LayoutKind::Bool
        | LayoutKind::Uint(_)
        | LayoutKind::Int(_)
        | LayoutKind::FixedBytes(_) => {
            let value = decode_word(data, position, layout)?;
            budget.charge(WORD, layout, position)?;
            Ok(value)
        }
        LayoutKind::Bytes => {
            let bytes = take_length_prefixed(data, position, layout)?;
            budget.charge(bytes.len().max(WORD), layout, position)?;
            Ok(DecodedValue::Bytes(bytes.to_vec()))
        }
        LayoutKind::String => {
            let bytes = take_length_prefixed(data, position, layout)?;
            budget.charge(bytes.len().max(WORD), layout, position)?;
            Ok(DecodedValue::from_utf8_bytes(bytes))
        }
        LayoutKind::Array { element, len } => {
            let (start, count) = match len {
                Some(n) => (position, *n),
                None => {
                    let count = read_usize(data, position, layout)?;
                    budget.charge(WORD, layout, position)?;
                    let start = position.checked_add(WORD).ok_or_else(|| AbiError::InvalidOffset {
                        ty: layout.type_name.clone(),
                        offset: position,
                    })?;
                    (start, count)
                }
            };
            Ok(DecodedValue::List(decode_repeated(
                data, start, element, count, layout, budget,
            )?))
        }
        LayoutKind::Tuple(fields) => {
            let values = decode_sequence(
                data,
                position,
                fields.iter().map(|(_, field)| field),
                budget,
            )?;
            Ok(DecodedValue::Struct(
                fields
                    .iter()
                    .map(|(name, _)| name.clone())
                    .zip(values)
                    .collect(),
            ))
        }
    }
}

/// Decode a one-word static value at `position`
fn decode_word(data: &[u8], position: usize, layout: &Layout) -> Result<DecodedValue, AbiError> {
    match &layout.kind {
        LayoutKind::Address => {
            let word = peek_word(data, position, layout)?;
            Ok(DecodedValue::Address(Address::from_slice(&word[12..])))
        }
        LayoutKind::Bool => {
            let word = peek_word(data, position, layout)?;
            match U256::from_be_slice(word) {
                value if value == U256::ZERO => Ok(DecodedValue::Bool(false)),
                value if value == U256::from(1u8) => Ok(DecodedValue::Bool(true)),
                _ => Err(out_of_range(layout, position)),
            }
        }
        LayoutKind::Uint(bits) => {
            let word = peek_word(data, position, layout)?;
            let value = U256::from_be_slice(word);
            if *bits < 256 && value.bit_len() > *bits as usize {
                return Err(out_of_range(layout, position));
            }
            Ok(DecodedValue::Uint(value, *bits))
        }
        LayoutKind::Int(bits) => {
            let word = peek_word(data, position, layout)?;
            let raw = U256::from_be_slice(word);
            if *bits < 256 {
                // Everything above the sign bit must be a copy of it
                let shift = *bits as usize - 1;
                let upper = raw >> shift;
                if upper != U256::ZERO && upper != (U256::MAX >> shift) {
                    return Err(out_of_range(layout, position));
                }
            }
            Ok(DecodedValue::Int(I256::from_raw(raw), *bits))
        }
        LayoutKind::FixedBytes(size) => {
            let word = peek_word(data, position, layout)?;
            Ok(DecodedValue::Bytes(word[..*size].to_vec()))
        }
        _ => Err(AbiError::ArgumentMismatch {
            reason: format!("{} is not a one-word type", layout.type_name),
        }),
    }
}

fn out_of_range(layout: &Layout, offset: usize) -> AbiError {
    AbiError::ValueOutOfRange {
        ty: layout.type_name.clone(),
        offset,
    }
}

fn peek<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    layout: &Layout,
) -> Result<&'a [u8], AbiError> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(AbiError::TruncatedPayload {
            ty: layout.type_name.clone(),
            offset,
            needed: len,
            available: data.len().saturating_sub(offset),
        }),
    }
}

fn peek_word<'a>(data: &'a [u8], offset: usize, layout: &Layout) -> Result<&'a [u8], AbiError> {
    peek(data, offset, WORD, layout)
}

/// Read an offset or length word. Values that cannot address memory are rejected.
fn read_usize(data: &[u8], offset: usize, layout: &Layout) -> Result<usize, AbiError> {
    let word = peek_word(data, offset, layout)?;
    let invalid = || AbiError::InvalidOffset {
        ty: layout.type_name.clone(),
        offset,
    };
    if word[..24].iter().any(|b| *b != 0) {
        return Err(invalid());
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(low)).map_err(|_| invalid())
}

/// Length word at `position` followed by that many bytes
fn take_length_prefixed<'a>(
    data: &'a [u8],
    position: usize,
    layout: &Layout,
) -> Result<&'a [u8], AbiError> {
    let len = read_usize(data, position, layout)?;
    peek(data, position + WORD, len, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::abi::types::TupleField;

    const ERC20_ABI: &str = r#"[
        {"type":"function","name":"transfer","inputs":[
            {"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
            "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"approve","inputs":[
            {"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
            "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"name","inputs":[],"outputs":[{"name":"","type":"string"}]}
    ]"#;

    fn word(hex_str: &str) -> String {
        format!("{:0>64}", hex_str)
    }

    #[test]
    fn test_decode_transfer() {
        let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();

        // transfer(0x1234567890123456789012345678901234567890, 1000)
        let calldata = hex::decode(
            "a9059cbb000000000000000000000000123456789012345678901234567890123456789000000000000000000000000000000000000000000000000000000000000003e8"
        ).unwrap();

        let result = decoder.decode(&calldata).unwrap();
        assert_eq!(result.function.name, "transfer");
        assert_eq!(result.args.len(), 2);
        assert_eq!(
            result.args[0].as_address().unwrap().to_string().to_lowercase(),
            "0x1234567890123456789012345678901234567890"
        );
        assert_eq!(result.args[1].as_uint(), Some(U256::from(1000u64)));
    }

    #[test]
    fn test_unknown_selector() {
        let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();
        let calldata = hex::decode("deadbeef").unwrap();

        let result = decoder.decode(&calldata);
        assert!(matches!(result, Err(AbiError::UnknownSelector { .. })));
    }

    #[test]
    fn test_short_calldata() {
        let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();
        for len in 0..4 {
            let result = decoder.decode(&vec![0xa9; len]);
            assert!(matches!(result, Err(AbiError::TruncatedPayload { .. })));
        }
        assert!(matches!(
            decoder.decode_hex("0xa9059c"),
            Err(AbiError::TruncatedPayload { .. })
        ));
        assert!(matches!(
            decoder.decode_hex("0xnothex!"),
            Err(AbiError::InvalidHexInput { .. })
        ));
    }

    #[test]
    fn test_truncated_argument_is_error_not_zero() {
        let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();
        // Second word cut short by one byte
        let calldata = format!("0xa9059cbb{}{}", word("01"), &word("03e8")[..62]);
        match decoder.decode_hex(&calldata) {
            Err(AbiError::TruncatedPayload { ty, offset, .. }) => {
                assert_eq!(ty, "uint256");
                assert_eq!(offset, 32);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_dynamic_string_and_array() {
        // f(string,uint256[])
        let params = vec![
            Param::new("s", TypeDescriptor::String),
            Param::new("xs", TypeDescriptor::Array(Box::new(TypeDescriptor::Uint(256)), None)),
        ];
        let data = hex::decode(
            [
                word("40"),
                word("80"),
                word("05"),
                format!("{:0<64}", hex::encode("hello")),
                word("02"),
                word("07"),
                word("08"),
            ]
            .concat(),
        )
        .unwrap();

        let values = decode_params(&params, &data).unwrap();
        assert_eq!(values[0], DecodedValue::string("hello"));
        assert_eq!(
            values[1],
            DecodedValue::List(vec![
                DecodedValue::Uint(U256::from(7u8), 256),
                DecodedValue::Uint(U256::from(8u8), 256),
            ])
        );
    }

    #[test]
    fn test_decode_dynamic_tuple_offsets_relative_to_tuple() {
        // g((uint8,bytes))
        let ty = TypeDescriptor::Tuple(vec![
            TupleField {
                name: "id".into(),
                ty: TypeDescriptor::Uint(8),
            },
            TupleField {
                name: "blob".into(),
                ty: TypeDescriptor::Bytes,
            },
        ]);
        let data = hex::decode(
            [
                word("20"), // tuple at 0x20
                word("2a"), // id
                word("40"), // blob at tuple + 0x40
                word("03"),
                format!("{:0<64}", "abcdef"),
            ]
            .concat(),
        )
        .unwrap();

        let value = decode_single(&ty, &data).unwrap();
        assert_eq!(
            value,
            DecodedValue::Struct(vec![
                ("id".into(), DecodedValue::Uint(U256::from(42u8), 8)),
                ("blob".into(), DecodedValue::Bytes(vec![0xab, 0xcd, 0xef])),
            ])
        );
    }

    #[test]
    fn test_uint_overflow_for_narrow_type() {
        let params = vec![Param::new("x", TypeDescriptor::Uint(8))];
        let data = hex::decode(word("0100")).unwrap();
        assert!(matches!(
            decode_params(&params, &data),
            Err(AbiError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_negative_int_sign_extension() {
        let params = vec![Param::new("x", TypeDescriptor::Int(8))];
        let minus_two = hex::decode("f".repeat(62) + "fe").unwrap();
        let values = decode_params(&params, &minus_two).unwrap();
        let expected = I256::from_raw(U256::MAX - U256::from(1u8));
        assert_eq!(values[0], DecodedValue::Int(expected, 8));
        assert_eq!(expected.to_string(), "-2");

        // 0x80 without sign extension does not fit int8
        let bad = hex::decode(word("80")).unwrap();
        assert!(matches!(
            decode_params(&params, &bad),
            Err(AbiError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_bool_must_be_zero_or_one() {
        let params = vec![Param::new("b", TypeDescriptor::Bool)];
        let data = hex::decode(word("02")).unwrap();
        assert!(matches!(
            decode_params(&params, &data),
            Err(AbiError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_hostile_length_rejected_without_allocation() {
        let params = vec![Param::new(
            "xs",
            TypeDescriptor::Array(Box::new(TypeDescriptor::Uint(256)), None),
        )];
        let data = hex::decode([word("20"), word("ffffffffffff")].concat()).unwrap();
        assert!(matches!(
            decode_params(&params, &data),
            Err(AbiError::TruncatedPayload { .. })
        ));

        let huge_offset = hex::decode("ff".repeat(32)).unwrap();
        assert!(matches!(
            decode_params(&params, &huge_offset),
            Err(AbiError::InvalidOffset { .. })
        ));
    }

    /// `bytes[]` of `count` elements whose offsets all point at one `blob_len` blob
    fn aliased_bytes_array(count: usize, blob_len: usize) -> Vec<u8> {
        let heads_len = count * 32;
        let mut hex_data = word("20") + &word(&format!("{:x}", count));
        for _ in 0..count {
            hex_data += &word(&format!("{:x}", heads_len));
        }
        hex_data += &word(&format!("{:x}", blob_len));
        hex_data += &"ab".repeat(blob_len);
        hex::decode(hex_data).unwrap()
    }

    #[test]
    fn test_aliased_offsets_cannot_blow_up_output() {
        let params = vec![Param::new(
            "blobs",
            TypeDescriptor::Array(Box::new(TypeDescriptor::Bytes), None),
        )];

        // A couple of elements sharing a tail still decode
        let values = decode_params(&params, &aliased_bytes_array(2, 40)).unwrap();
        let items = values[0].as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], items[1]);
        assert_eq!(items[0].as_bytes().map(<[u8]>::len), Some(40));

        // Hundreds of elements copying the same kilobyte do not
        let data = aliased_bytes_array(256, 1024);
        assert!(matches!(
            decode_params(&params, &data),
            Err(AbiError::ExcessiveExpansion { .. })
        ));
    }

    #[test]
    fn test_decode_output_and_constructor() {
        let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();
        let ret = hex::decode(
            [word("20"), word("04"), format!("{:0<64}", hex::encode("USDC"))].concat(),
        )
        .unwrap();
        let values = decoder.decode_output("name", &ret).unwrap();
        assert_eq!(values, vec![DecodedValue::string("USDC")]);

        assert_eq!(decoder.decode_constructor(&[]).unwrap(), vec![]);
        assert!(decoder.decode_constructor(&[0u8; 32]).is_err());
    }
}
