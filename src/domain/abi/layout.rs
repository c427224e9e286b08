//! Precomputed encoding layout for a `TypeDescriptor`
//!
//! Dynamic status and head size are derived once, bottom-up, when a decoder is
//! built, so offset arithmetic uses the same answer at every nesting level.

use super::types::TypeDescriptor;

/// Size of one ABI word
pub const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutKind {
    Address,
    Bool,
    Uint(u16),
    Int(u16),
    FixedBytes(usize),
    Bytes,
    String,
    Array {
        element: Box<Layout>,
        len: Option<usize>,
    },
    Tuple(Vec<(String, Layout)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub kind: LayoutKind,
    /// Encoded out-of-line: the head holds an offset into the tail
    pub dynamic: bool,
    /// Bytes this value occupies in its enclosing head
    pub head_size: usize,
    /// Canonical type spelling, for error context
    pub type_name: String,
}

impl Layout {
    pub fn of(ty: &TypeDescriptor) -> Layout {
        let type_name = ty.canonical();
        let (kind, dynamic, static_size) = match ty {
            TypeDescriptor::Address => (LayoutKind::Address, false, WORD),
            TypeDescriptor::Bool => (LayoutKind::Bool, false, WORD),
            TypeDescriptor::Uint(bits) => (LayoutKind::Uint(*bits), false, WORD),
            TypeDescriptor::Int(bits) => (LayoutKind::Int(*bits), false, WORD),
            TypeDescriptor::FixedBytes(size) => {
                (LayoutKind::FixedBytes(*size as usize), false, WORD)
            }
            TypeDescriptor::Bytes => (LayoutKind::Bytes, true, WORD),
            TypeDescriptor::String => (LayoutKind::String, true, WORD),
            TypeDescriptor::Array(element, len) => {
                let element = Layout::of(element);
                let dynamic = len.is_none() || element.dynamic;
                let size = len.map_or(WORD, |n| n.saturating_mul(element.head_size));
                (
                    LayoutKind::Array {
                        element: Box::new(element),
                        len: *len,
                    },
                    dynamic,
                    size,
                )
            }
            TypeDescriptor::Tuple(fields) => {
                let fields: Vec<(String, Layout)> = fields
                    .iter()
                    .map(|field| (field.name.clone(), Layout::of(&field.ty)))
                    .collect();
                let dynamic = fields.iter().any(|(_, layout)| layout.dynamic);
                let size = fields
                    .iter()
                    .fold(0usize, |acc, (_, layout)| acc.saturating_add(layout.head_size));
                (LayoutKind::Tuple(fields), dynamic, size)
            }
        };

        Layout {
            kind,
            dynamic,
            head_size: if dynamic { WORD } else { static_size },
            type_name,
        }
    }

    pub fn of_all<'a>(types: impl IntoIterator<Item = &'a TypeDescriptor>) -> Vec<Layout> {
        types.into_iter().map(Layout::of).collect()
    }
}
