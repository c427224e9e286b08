//! Domain layer - models, pure decode logic and collaborator contracts

pub mod abi;
pub mod contract;
