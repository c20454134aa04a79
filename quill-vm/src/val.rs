use std::fmt;

use alloy_primitives::{Bytes, I256, U256};
use serde::{Deserialize, Serialize};

use crate::types::Type;

/// A compile-time constant of a non-array type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Val {
    Bool(bool),
    I256(I256),
    U256(U256),
    ByteVec(Bytes),
    Address(Bytes),
}

impl Val {
    pub fn u256(value: u64) -> Val {
        Val::U256(U256::from(value))
    }

    pub fn byte_vec(bytes: impl Into<Bytes>) -> Val {
        Val::ByteVec(bytes.into())
    }

    pub fn ty(&self) -> Type {
        Type::from_val(self)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Bool(b) => write!(f, "{}", b),
            Val::I256(n) => write!(f, "{}i", n),
            Val::U256(n) => write!(f, "{}u", n),
            Val::ByteVec(bytes) => write!(f, "#{}", bytes),
            Val::Address(bytes) => write!(f, "@{}", bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn val_type_tags() {
        assert_eq!(Val::Bool(true).ty(), Type::Bool);
        assert_eq!(Val::u256(7).ty(), Type::U256);
        assert_eq!(Val::I256(I256::ZERO).ty(), Type::I256);
        assert_eq!(Val::byte_vec(vec![0x01, 0x02]).ty(), Type::ByteVec);
        assert_eq!(Val::Address(Bytes::from(vec![0u8; 4])).ty(), Type::Address);
    }

    #[test]
    fn display_renders_literal_forms() {
        assert_eq!(Val::Bool(false).to_string(), "false");
        assert_eq!(Val::u256(42).to_string(), "42u");
        assert_eq!(Val::byte_vec(vec![0xab]).to_string(), "#0xab");
    }
}
