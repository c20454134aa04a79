use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instr::Instr;

/// One compiled method of a contract or script.
///
/// `args_length` and `return_length` count flattened stack slots;
/// `locals_length` is the method frame size and includes the argument
/// slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_contract_assets: bool,
    pub args_length: usize,
    pub locals_length: usize,
    pub return_length: usize,
    pub instrs: Vec<Instr>,
}

impl Method {
    pub fn has_debug_code(&self) -> bool {
        self.instrs.iter().any(Instr::is_debug)
    }
}

/// A deployable contract: flattened field layout plus its method table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulContract {
    pub fields_length: usize,
    pub methods: Vec<Method>,
}

impl StatefulContract {
    pub fn has_debug_code(&self) -> bool {
        self.methods.iter().any(Method::has_debug_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a tx script needs one public entry method followed by private methods only")]
pub struct InvalidScriptMethods;

/// A one-shot transaction program. The first method is the entry point
/// and must be public; every other method must be private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulScript {
    methods: Vec<Method>,
}

impl StatefulScript {
    pub fn from_methods(methods: Vec<Method>) -> Result<Self, InvalidScriptMethods> {
        let mut iter = methods.iter();
        let valid = match iter.next() {
            Some(entry) => entry.is_public && iter.all(|m| !m.is_public),
            None => false,
        };
        if valid {
            Ok(Self { methods })
        } else {
            Err(InvalidScriptMethods)
        }
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn has_debug_code(&self) -> bool {
        self.methods.iter().any(Method::has_debug_code)
    }
}

/// An asset (spending) script; holds no persistent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatelessScript {
    pub methods: Vec<Method>,
}

impl StatelessScript {
    pub fn has_debug_code(&self) -> bool {
        self.methods.iter().any(Method::has_debug_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(is_public: bool, instrs: Vec<Instr>) -> Method {
        Method {
            is_public,
            use_preapproved_assets: false,
            use_contract_assets: false,
            args_length: 0,
            locals_length: 0,
            return_length: 0,
            instrs,
        }
    }

    #[test]
    fn script_entry_must_be_public() {
        assert!(StatefulScript::from_methods(vec![method(true, vec![Instr::Return])]).is_ok());
        assert_eq!(
            StatefulScript::from_methods(vec![method(false, vec![Instr::Return])]),
            Err(InvalidScriptMethods)
        );
        assert_eq!(StatefulScript::from_methods(vec![]), Err(InvalidScriptMethods));
    }

    #[test]
    fn script_non_entry_methods_must_be_private() {
        let ok = StatefulScript::from_methods(vec![
            method(true, vec![Instr::Return]),
            method(false, vec![Instr::Return]),
        ]);
        assert!(ok.is_ok());

        let bad = StatefulScript::from_methods(vec![
            method(true, vec![Instr::Return]),
            method(true, vec![Instr::Return]),
        ]);
        assert_eq!(bad, Err(InvalidScriptMethods));
    }

    #[test]
    fn debug_code_is_detected_across_methods() {
        let contract = StatefulContract {
            fields_length: 1,
            methods: vec![
                method(true, vec![Instr::Return]),
                method(false, vec![Instr::Debug(vec![String::new()]), Instr::Return]),
            ],
        };
        assert!(contract.has_debug_code());
    }
}
