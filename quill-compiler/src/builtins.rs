// Built-in function table. Built-ins are written `name!` in source; they
// resolve here instead of against the unit's own function table and are
// emitted inline as dedicated opcodes.

use quill_vm::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Assert,
    Panic,
    CheckCaller,
    CallerAddress,
    BlockTimeStamp,
    Size,
    TransferToken,
    TransferTokenFromSelf,
    TransferTokenToSelf,
    TokenRemaining,
    Migrate,
    EncodeToByteVec,
}

const TABLE: &[(&str, Builtin)] = &[
    ("assert", Builtin::Assert),
    ("panic", Builtin::Panic),
    ("checkCaller", Builtin::CheckCaller),
    ("callerAddress", Builtin::CallerAddress),
    ("blockTimeStamp", Builtin::BlockTimeStamp),
    ("size", Builtin::Size),
    ("transferToken", Builtin::TransferToken),
    ("transferTokenFromSelf", Builtin::TransferTokenFromSelf),
    ("transferTokenToSelf", Builtin::TransferTokenToSelf),
    ("tokenRemaining", Builtin::TokenRemaining),
    ("migrate", Builtin::Migrate),
    ("encodeToByteVec", Builtin::EncodeToByteVec),
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        TABLE
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, builtin)| *builtin)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        TABLE.iter().map(|(name, _)| *name)
    }

    pub fn name(self) -> &'static str {
        match TABLE.iter().find(|(_, builtin)| *builtin == self) {
            Some((name, _)) => name,
            None => "",
        }
    }

    /// Declared argument types; `None` marks a variadic built-in, whose
    /// call sites carry an explicit argument count.
    pub fn arg_types(self) -> Option<Vec<Type>> {
        let types = match self {
            Builtin::Assert | Builtin::CheckCaller => vec![Type::Bool, Type::U256],
            Builtin::Panic => vec![Type::U256],
            Builtin::CallerAddress | Builtin::BlockTimeStamp => vec![],
            Builtin::Size | Builtin::Migrate => vec![Type::ByteVec],
            Builtin::TransferToken => {
                vec![Type::Address, Type::Address, Type::ByteVec, Type::U256]
            }
            Builtin::TransferTokenFromSelf | Builtin::TransferTokenToSelf => {
                vec![Type::Address, Type::ByteVec, Type::U256]
            }
            Builtin::TokenRemaining => vec![Type::Address, Type::ByteVec],
            Builtin::EncodeToByteVec => return None,
        };
        Some(types)
    }

    pub fn return_types(self) -> Vec<Type> {
        match self {
            Builtin::CallerAddress => vec![Type::Address],
            Builtin::BlockTimeStamp | Builtin::Size | Builtin::TokenRemaining => vec![Type::U256],
            Builtin::EncodeToByteVec => vec![Type::ByteVec],
            _ => vec![],
        }
    }

    pub fn is_variadic(self) -> bool {
        self.arg_types().is_none()
    }

    /// `panic!` never falls through; a call to it terminates a control
    /// path for the exhaustive-return analysis.
    pub fn diverges(self) -> bool {
        matches!(self, Builtin::Panic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_round_trips_every_name() {
        for name in Builtin::names() {
            let builtin = Builtin::lookup(name).unwrap();
            assert_eq!(builtin.name(), name);
        }
        assert_eq!(Builtin::lookup("noSuchBuiltin"), None);
    }

    #[test]
    fn only_encode_is_variadic() {
        for name in Builtin::names() {
            let builtin = Builtin::lookup(name).unwrap();
            assert_eq!(builtin.is_variadic(), builtin == Builtin::EncodeToByteVec);
        }
    }

    #[test]
    fn panic_terminates_a_path() {
        assert!(Builtin::Panic.diverges());
        assert!(!Builtin::Assert.diverges());
    }
}
