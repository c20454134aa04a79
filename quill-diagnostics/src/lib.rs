// Diagnostics for the Quill compiler.
//
// Every user-facing failure is one `CompileError` carrying a readable
// message; the enum variants enumerate the error kinds the pipeline can
// produce. Warnings never abort a compilation and accumulate per unit in
// a stable order.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    // name errors
    #[error("undefined identifier \"{name}\"")]
    UndefinedIdentifier { name: String, help: Option<String> },
    #[error("undefined function \"{name}\"")]
    UndefinedFunction { name: String, help: Option<String> },
    #[error("undefined contract type \"{name}\"")]
    UndefinedContract { name: String },
    #[error("undefined event \"{name}\"")]
    UndefinedEvent { name: String },
    #[error("\"{name}\" is defined multiple times")]
    DuplicateDefinition { name: String },

    // type errors
    #[error("operator {op} is not defined on {operands}")]
    OperatorTypeMismatch { op: String, operands: String },
    #[error("condition must be Bool, got {found}")]
    InvalidCondition { found: String },
    #[error("let declares {declared} names but the value produces {produced}")]
    VarDeclarationMismatch { declared: usize, produced: usize },
    #[error("cannot assign {found} to {expected}")]
    AssignmentTypeMismatch { expected: String, found: String },
    #[error("function \"{func}\" returns {found}, declared {expected}")]
    ReturnTypeMismatch {
        func: String,
        expected: String,
        found: String,
    },
    #[error("invalid arguments for \"{func}\": expected {expected}, got {found}")]
    ArgumentTypeMismatch {
        func: String,
        expected: String,
        found: String,
    },

    // array errors
    #[error("array literals must not be empty")]
    EmptyArray,
    #[error("array elements must share one type, got {found}")]
    HeterogeneousArray { found: String },
    #[error("an array element must be a single value, got {found}")]
    InvalidArrayElement { found: String },
    #[error("array index {index} out of range")]
    ArrayIndexOutOfRange { index: String },
    #[error("array index must be a constant U256, got {found}")]
    InvalidArrayIndex { found: String },
    #[error("expected an array, got {found}")]
    ExpectedArrayType { found: String },

    // mutability errors
    #[error("cannot assign to immutable variable \"{name}\"")]
    ImmutableAssignment { name: String },

    // contract and inheritance errors
    #[error("expected a contract-typed expression, got {found}")]
    ContractExpected { found: String },
    #[error("\"{name}\" is not an instantiable contract type")]
    NotInstantiable { name: String },
    #[error("cyclic inheritance involving \"{name}\"")]
    CyclicInheritance { name: String },
    #[error("\"{name}\" is not inheritable")]
    NotInheritable { name: String },
    #[error("fields of \"{child}\" do not match the field list of parent \"{parent}\"")]
    InheritanceFieldsMismatch { child: String, parent: String },
    #[error("inherited interfaces must form a single chain, got {interfaces}")]
    InterfaceNotChained { interfaces: String },
    #[error("std interface id of \"{child}\" must strictly extend the id of \"{parent}\"")]
    InvalidStdInterfaceId { child: String, parent: String },
    #[error("conflicting stdIdEnabled settings in the inheritance chain of \"{contract}\"")]
    StdIdEnabledConflict { contract: String },
    #[error("function \"{func}\" is implemented with signature {found}, expected {expected}")]
    SignatureMismatch {
        func: String,
        expected: String,
        found: String,
    },
    #[error("contract \"{contract}\" does not implement: {funcs}")]
    UnimplementedMethods { contract: String, funcs: String },
    #[error("function \"{func}\" of contract \"{contract}\" has no body")]
    AbstractFuncInContract { contract: String, func: String },
    #[error("function \"{func}\" of interface \"{interface}\" must not have a body")]
    FuncBodyInInterface { interface: String, func: String },

    // asset-attribute errors
    #[error("function \"{func}\" does not accept preapproved assets")]
    ApprovedAssetsNotAccepted { func: String },
    #[error("function \"{func}\" needs preapproved assets, please use braces syntax")]
    MissingApprovedAssets { func: String },

    // static-method errors
    #[error("function \"{func}\" is not static")]
    ExpectedStaticFunction { func: String },
    #[error("function \"{func}\" is static, call it through the contract type")]
    ExpectedNonStaticFunction { func: String },

    // layout errors
    #[error("branch offset {offset} exceeds the limit of 255 instructions")]
    BranchTooLong { offset: i64 },
    #[error("too many variables or methods in \"{owner}\"")]
    TooManySlots { owner: String },

    // unit errors
    #[error("tx script \"{script}\" needs one public entry method followed by private methods")]
    InvalidTxScriptMethods { script: String },
    #[error("mutable variables of \"{owner}\" are never assigned: {vars}")]
    UnassignedMutableVars { owner: String, vars: String },
    #[error("expected a return statement on every path of function \"{func}\"")]
    MissingReturn { func: String },

    // event errors
    #[error("event \"{event}\" cannot log {found}")]
    InvalidEventArg { event: String, found: String },
    #[error("arguments of event \"{event}\" must be {expected}, got {found}")]
    EventArgsMismatch {
        event: String,
        expected: String,
        found: String,
    },

    #[error("{0}")]
    Other(String),
}

impl CompileError {
    /// Build an undefined-identifier error with a did-you-mean suggestion
    /// drawn from the names in scope.
    pub fn undefined_identifier<'a>(
        name: &str,
        candidates: impl Iterator<Item = &'a str>,
    ) -> CompileError {
        CompileError::UndefinedIdentifier {
            name: name.to_string(),
            help: did_you_mean(name, candidates),
        }
    }

    pub fn undefined_function<'a>(
        name: &str,
        candidates: impl Iterator<Item = &'a str>,
    ) -> CompileError {
        CompileError::UndefinedFunction {
            name: name.to_string(),
            help: did_you_mean(name, candidates),
        }
    }

    pub fn help(&self) -> Option<&str> {
        match self {
            CompileError::UndefinedIdentifier { help, .. }
            | CompileError::UndefinedFunction { help, .. } => help.as_deref(),
            _ => None,
        }
    }

    /// Terminal rendering: `error: <message>` plus an optional help line.
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", "error".red().bold(), self);
        if let Some(help) = self.help() {
            out.push_str(&format!("\n  {}: {}", "help".green().bold(), help));
        }
        out
    }
}

/// Closest-name suggestion. Jaro similarity above 0.7 counts as close.
pub fn did_you_mean<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    for candidate in candidates {
        let score = strsim::jaro(name, candidate);
        if score > 0.7 && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, candidate)| format!("did you mean \"{}\"?", candidate))
}

/// A non-fatal diagnostic; order of emission is stable per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("{}: {}", "warning".yellow().bold(), self.message)
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
