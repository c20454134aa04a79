use alloy_primitives::{Bytes, I256, U256};
use serde::{Deserialize, Serialize};

/// One opcode of the Quill VM.
///
/// Jump offsets are relative, counted in instructions, and apply to the
/// instruction following the jump. `LoadField`/`StoreField` address the
/// flattened field layout of the enclosing contract; `LoadLocal` and
/// `StoreLocal` address the method frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    // constants
    ConstTrue,
    ConstFalse,
    I256Const(I256),
    U256Const(U256),
    BytesConst(Bytes),
    AddressConst(Bytes),

    // storage
    LoadLocal(u8),
    StoreLocal(u8),
    LoadField(u8),
    StoreField(u8),
    LoadTemplate(u8),

    // stack and control flow
    Pop,
    Dup,
    Return,
    IfTrue(i32),
    IfFalse(i32),
    Jump(i32),
    CallLocal(u8),
    CallExternal { contract: String, method: String },

    // per-type arithmetic and logic
    U256Add,
    U256Sub,
    U256Mul,
    U256Div,
    U256Mod,
    U256Eq,
    U256Neq,
    U256Lt,
    U256Le,
    U256Gt,
    U256Ge,
    I256Add,
    I256Sub,
    I256Mul,
    I256Div,
    I256Mod,
    I256Eq,
    I256Neq,
    I256Lt,
    I256Le,
    I256Gt,
    I256Ge,
    BoolAnd,
    BoolOr,
    BoolNot,
    BoolEq,
    BoolNeq,
    ByteVecEq,
    ByteVecNeq,
    ByteVecConcat,
    ByteVecSize,
    AddressEq,
    AddressNeq,

    // events, assets, built-ins
    Log(u8),
    ApproveAlph,
    ApproveToken,
    TransferAlph,
    TransferToken,
    TransferAlphFromSelf,
    TransferTokenFromSelf,
    TransferAlphToSelf,
    TransferTokenToSelf,
    AlphRemaining,
    TokenRemaining,
    ALPHTokenId,
    CallerAddress,
    AssertWithErrorCode,
    Panic,
    MigrateSimple,
    BlockTimeStamp,
    Encode,
    Debug(Vec<String>),
}

impl Instr {
    /// A `U256Const` from a small host integer; used for call arities,
    /// event indices and encode lengths.
    pub fn u256_const(value: u64) -> Instr {
        Instr::U256Const(U256::from(value))
    }

    /// Debug ops are elided from release builds.
    pub fn is_debug(&self) -> bool {
        matches!(self, Instr::Debug(_))
    }
}
