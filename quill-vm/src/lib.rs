// Value model, type lattice and instruction alphabet of the Quill VM.
//
// The compiler is a producer of this crate's types: it names opcodes and
// assembles methods, but never interprets them. Execution lives in the VM.

pub mod artifact;
pub mod instr;
pub mod types;
pub mod val;

pub use artifact::{InvalidScriptMethods, Method, StatefulContract, StatefulScript, StatelessScript};
pub use instr::Instr;
pub use types::{Type, TypeId};
pub use val::Val;
