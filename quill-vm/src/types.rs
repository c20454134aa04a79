use std::fmt;

use serde::{Deserialize, Serialize};

use crate::val::Val;

/// Name of a user-declared contract, interface or script type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub String);

impl TypeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of Quill source types.
///
/// Equality is structural: arrays compare on (element, size), contract
/// types on their type id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    I256,
    U256,
    ByteVec,
    Address,
    FixedArray { elem: Box<Type>, size: usize },
    Contract(TypeId),
}

impl Type {
    pub fn array(elem: Type, size: usize) -> Type {
        Type::FixedArray {
            elem: Box::new(elem),
            size,
        }
    }

    pub fn from_val(val: &Val) -> Type {
        match val {
            Val::Bool(_) => Type::Bool,
            Val::I256(_) => Type::I256,
            Val::U256(_) => Type::U256,
            Val::ByteVec(_) => Type::ByteVec,
            Val::Address(_) => Type::Address,
        }
    }

    /// Number of VM stack slots a value of this type occupies.
    pub fn flattened_size(&self) -> usize {
        match self {
            Type::FixedArray { elem, size } => size * elem.flattened_size(),
            _ => 1,
        }
    }

    /// Total slot count of a value sequence.
    pub fn flattened_size_of(types: &[Type]) -> usize {
        types.iter().map(Type::flattened_size).sum()
    }

    /// Stable textual form used in diagnostics and ABI output.
    pub fn signature(&self) -> String {
        match self {
            Type::Bool => "Bool".to_string(),
            Type::I256 => "I256".to_string(),
            Type::U256 => "U256".to_string(),
            Type::ByteVec => "ByteVec".to_string(),
            Type::Address => "Address".to_string(),
            Type::FixedArray { elem, size } => format!("[{};{}]", elem.signature(), size),
            Type::Contract(id) => id.name().to_string(),
        }
    }

    /// Signature of a type sequence, e.g. `(U256,Bool)`.
    pub fn signatures(types: &[Type]) -> String {
        let inner: Vec<String> = types.iter().map(Type::signature).collect();
        format!("({})", inner.join(","))
    }

    pub fn is_array_type(&self) -> bool {
        matches!(self, Type::FixedArray { .. })
    }

    pub fn is_contract_type(&self) -> bool {
        matches!(self, Type::Contract(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_occupy_one_slot() {
        for ty in [Type::Bool, Type::I256, Type::U256, Type::ByteVec, Type::Address] {
            assert_eq!(ty.flattened_size(), 1);
        }
        assert_eq!(Type::Contract(TypeId::new("Token")).flattened_size(), 1);
    }

    #[test]
    fn nested_arrays_multiply_through() {
        let inner = Type::array(Type::U256, 3);
        assert_eq!(inner.flattened_size(), 3);
        let outer = Type::array(inner.clone(), 4);
        assert_eq!(outer.flattened_size(), 12);
        assert_eq!(outer.signature(), "[[U256;3];4]");
        assert_eq!(Type::flattened_size_of(&[outer, Type::Bool]), 13);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Type::array(Type::U256, 2), Type::array(Type::U256, 2));
        assert_ne!(Type::array(Type::U256, 2), Type::array(Type::U256, 3));
        assert_ne!(Type::array(Type::U256, 2), Type::array(Type::I256, 2));
        assert_eq!(
            Type::Contract(TypeId::new("A")),
            Type::Contract(TypeId::new("A"))
        );
        assert_ne!(
            Type::Contract(TypeId::new("A")),
            Type::Contract(TypeId::new("B"))
        );
    }

    #[test]
    fn signatures_render_sequences() {
        assert_eq!(Type::signatures(&[]), "()");
        assert_eq!(Type::signatures(&[Type::U256, Type::Bool]), "(U256,Bool)");
    }
}
