// Semantic analysis and code generation for the Quill contract language.
//
// The pipeline takes parsed ASTs (`quill-ast`), resolves inheritance and
// names, checks the semantic rules, and emits `quill-vm` methods. Parsing
// and execution live elsewhere; this crate is the middle of the compiler.

pub mod analysis;
pub mod builtins;
pub mod codegen;
pub mod inherit;
pub mod options;
pub mod project;
pub mod state;
pub mod typecheck;

// Re-export diagnostics so downstream crates need only this dependency.
pub use quill_diagnostics as diagnostics;

pub use analysis::MethodSummary;
pub use builtins::Builtin;
pub use diagnostics::{CompileError, Result, Warning};
pub use inherit::{FlattenedContract, FlattenedInterface, STD_ID_FIELD, STD_ID_PREFIX};
pub use options::CompilerOptions;
pub use project::{
    compile_project, CompiledAssetScript, CompiledContract, CompiledScript, CompiledUnit,
};
pub use state::{CompilerState, Phase};
