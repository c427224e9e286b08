//! ABI domain models and the pure decode path
//!
//! Parsing, selector computation, decoding and formatting. Nothing in here
//! performs I/O or touches shared state.

pub mod decoder;
pub mod encoder;
mod error;
pub mod format;
mod layout;
pub mod parser;
mod registry;
pub mod selector;
mod types;
mod value;

pub use decoder::{decode_params, decode_single, AbiDecoder, DecodedCall};
pub use error::{decode_hex, AbiError};
pub use format::{format_args, format_value, DecodedArg};
pub use parser::AbiParser;
pub use registry::AbiRegistry;
pub use types::{
    selector_hex, AbiDefinition, EntryKind, FunctionEntry, Param, Selector, TupleField,
    TypeDescriptor,
};
pub use value::DecodedValue;
