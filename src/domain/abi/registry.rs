//! ABI registry - dispatch table from selector to function entry

use std::collections::HashMap;

use super::error::AbiError;
use super::types::{selector_hex, AbiDefinition, Selector};

/// What a selector resolves to within one ABI
#[derive(Debug, Clone, PartialEq, Eq)]
enum Dispatch {
    /// Index into `AbiDefinition::entries`
    Function(usize),
    /// Distinct signatures sharing one selector
    Ambiguous(Vec<String>),
}

/// Functions of one `AbiDefinition` indexed by 4-byte selector.
///
/// Two different signatures hashing to the same selector make that selector
/// ambiguous; looking it up reports the collision instead of picking one.
/// Repeated declarations of an identical signature decode identically and keep
/// the first entry.
#[derive(Debug, Default, Clone)]
pub struct AbiRegistry {
    functions: HashMap<Selector, Dispatch>,
}

impl AbiRegistry {
    /// Build the dispatch table in declaration order
    pub fn build(abi: &AbiDefinition) -> Self {
        let mut functions: HashMap<Selector, Dispatch> = HashMap::new();

        for (idx, entry) in abi.entries().iter().enumerate() {
            if !entry.is_function() {
                continue;
            }
            match functions.get_mut(&entry.selector()) {
                None => {
                    functions.insert(entry.selector(), Dispatch::Function(idx));
                }
                Some(Dispatch::Function(existing)) => {
                    let first = abi.entries()[*existing].signature();
                    if first != entry.signature() {
                        let signatures = vec![first.to_string(), entry.signature().to_string()];
                        functions.insert(entry.selector(), Dispatch::Ambiguous(signatures));
                    }
                }
                Some(Dispatch::Ambiguous(signatures)) => {
                    if !signatures.iter().any(|sig| sig == entry.signature()) {
                        signatures.push(entry.signature().to_string());
                    }
                }
            }
        }

        Self { functions }
    }

    /// Resolve a selector to its entry index
    pub fn lookup(&self, selector: Selector) -> Result<usize, AbiError> {
        match self.functions.get(&selector) {
            Some(Dispatch::Function(idx)) => Ok(*idx),
            Some(Dispatch::Ambiguous(signatures)) => Err(AbiError::SelectorCollision {
                selector: selector_hex(selector),
                signatures: signatures.clone(),
            }),
            None => Err(AbiError::UnknownSelector {
                selector: selector_hex(selector),
            }),
        }
    }

    /// Selectors claimed by more than one signature
    pub fn collisions(&self) -> Vec<(Selector, Vec<String>)> {
        let mut out: Vec<(Selector, Vec<String>)> = self
            .functions
            .iter()
            .filter_map(|(selector, dispatch)| match dispatch {
                Dispatch::Ambiguous(signatures) => Some((*selector, signatures.clone())),
                Dispatch::Function(_) => None,
            })
            .collect();
        out.sort();
        out
    }

    /// Get the number of registered selectors
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
