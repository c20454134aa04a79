// AST node model for the Quill contract language.
//
// Nodes are immutable after parsing. The only interior mutability is the
// write-once type memo on expression nodes, filled by the first type
// inference pass and reused by code generation.

use std::cell::OnceCell;
use std::fmt;

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

pub use quill_vm::{Type, TypeId, Val};

/// A plain identifier: variable, field, constant or event field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function name. Built-in functions are written `name!` in source and
/// resolved against the compiler's built-in table instead of the unit's
/// own function table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncId {
    pub name: String,
    pub is_builtin: bool,
}

impl FuncId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_builtin: false,
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_builtin: true,
        }
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_builtin {
            write!(f, "{}!", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// A function argument or a contract field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub ident: Ident,
    pub ty: Type,
    pub is_mutable: bool,
    pub is_unused: bool,
}

impl Argument {
    pub fn new(ident: Ident, ty: Type, is_mutable: bool) -> Self {
        Self {
            ident,
            ty,
            is_mutable,
            is_unused: false,
        }
    }
}

/// Binary operators. `Concat` (`++`) joins byte vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Concat => "++",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("!")
    }
}

/// An approve-assets entry attached to a call: one beneficiary address and
/// the (token id, amount) pairs pre-authorized for the callee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveAsset {
    pub address: Expr,
    pub tokens: Vec<(Expr, Expr)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranchExpr {
    pub condition: Expr,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranchStmt {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

/// An expression node. The `ty` slot is a write-once memo filled by the
/// first `type_of` evaluation and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(skip)]
    ty: OnceCell<Vec<Type>>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            ty: OnceCell::new(),
        }
    }

    pub fn const_val(val: Val) -> Self {
        Self::new(ExprKind::Const(val))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Variable(Ident::new(name)))
    }

    /// The memoized type, if inference ran already.
    pub fn memoized_type(&self) -> Option<&Vec<Type>> {
        self.ty.get()
    }

    /// Memoize the node's type. The first write wins; later writes of the
    /// same traversal return the stored value.
    pub fn memoize_type(&self, types: Vec<Type>) -> &Vec<Type> {
        self.ty.get_or_init(|| types)
    }

    /// Strip grouping parentheses.
    pub fn unparenthesized(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparenthesized(),
            _ => self,
        }
    }

    /// Whether the expression is the native-token id sentinel, used to
    /// select the dedicated ALPH opcodes over the generic token ones.
    pub fn is_alph_token_id(&self) -> bool {
        matches!(self.unparenthesized().kind, ExprKind::AlphTokenId)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        // the memo is derived state, not node identity
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Const(Val),
    Variable(Ident),
    EnumFieldSelector {
        enum_id: TypeId,
        field: Ident,
    },
    CreateArray(Vec<Expr>),
    ArrayElement {
        array: Box<Expr>,
        indexes: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `TypeName(addressExpr)`: view a contract id as a typed contract.
    ContractConv {
        type_id: TypeId,
        address: Box<Expr>,
    },
    /// Call of a function of the enclosing unit, or of a built-in.
    Call {
        id: FuncId,
        approve_assets: Vec<ApproveAsset>,
        args: Vec<Expr>,
    },
    /// `TypeName.func(...)`: call of a static function of a named contract.
    ContractStaticCall {
        contract: TypeId,
        id: FuncId,
        approve_assets: Vec<ApproveAsset>,
        args: Vec<Expr>,
    },
    /// `obj.func(...)`: dynamic call through a contract-typed object.
    ContractCall {
        obj: Box<Expr>,
        id: FuncId,
        approve_assets: Vec<ApproveAsset>,
        args: Vec<Expr>,
    },
    /// Expression form of if/else; the else branch is mandatory.
    IfElse {
        branches: Vec<IfBranchExpr>,
        else_expr: Box<Expr>,
    },
    Paren(Box<Expr>),
    /// The native-token id sentinel, of type ByteVec.
    AlphTokenId,
}

/// One declared name of a `let`; anonymous slots discard their value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarDeclaration {
    Named { mutable: bool, ident: Ident },
    Anonymous,
}

/// A write target of an assignment statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignmentTarget {
    Var(Ident),
    ArrayElement { ident: Ident, indexes: Vec<Expr> },
}

impl AssignmentTarget {
    pub fn ident(&self) -> &Ident {
        match self {
            AssignmentTarget::Var(ident) => ident,
            AssignmentTarget::ArrayElement { ident, .. } => ident,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    VarDef {
        decls: Vec<VarDeclaration>,
        value: Expr,
    },
    Assign {
        targets: Vec<AssignmentTarget>,
        rhs: Expr,
    },
    /// Statement-position call; results are popped.
    FuncCall {
        id: FuncId,
        approve_assets: Vec<ApproveAsset>,
        args: Vec<Expr>,
    },
    StaticContractCall {
        contract: TypeId,
        id: FuncId,
        approve_assets: Vec<ApproveAsset>,
        args: Vec<Expr>,
    },
    ContractCall {
        obj: Expr,
        id: FuncId,
        approve_assets: Vec<ApproveAsset>,
        args: Vec<Expr>,
    },
    IfElse {
        branches: Vec<IfBranchStmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    ForLoop {
        init: Box<Stmt>,
        cond: Expr,
        update: Box<Stmt>,
        body: Vec<Stmt>,
    },
    Return(Vec<Expr>),
    EmitEvent {
        id: TypeId,
        args: Vec<Expr>,
    },
    /// Interpolated debug output; elided entirely from release builds.
    Debug {
        string_parts: Vec<String>,
        interpolations: Vec<Expr>,
    },
}

/// A function definition. `body: None` marks an abstract function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub id: FuncId,
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_contract_assets: bool,
    pub use_update_fields: bool,
    pub use_check_external_caller: bool,
    pub args: Vec<Argument>,
    pub rtypes: Vec<Type>,
    pub body: Option<Vec<Stmt>>,
}

impl FuncDef {
    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    /// Canonical signature text; two definitions of the same function must
    /// agree on it exactly.
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                let prefix = if arg.is_mutable { "mut " } else { "" };
                format!("{}{}:{}", prefix, arg.ident, arg.ty.signature())
            })
            .collect();
        let access = if self.is_public { "pub " } else { "" };
        format!(
            "{}{}({})->{}",
            access,
            self.id.name,
            args.join(","),
            Type::signatures(&self.rtypes)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventField {
    pub ident: Ident,
    pub ty: Type,
}

/// An event definition; the field order is the log layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    pub id: TypeId,
    pub fields: Vec<EventField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantVarDef {
    pub ident: Ident,
    pub value: Val,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumField {
    pub ident: Ident,
    pub value: Val,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub id: TypeId,
    pub fields: Vec<EnumField>,
}

/// An inheritance clause. Contract inheritance re-declares the parent's
/// fields by name; interface inheritance carries no fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inheritance {
    Contract { parent: TypeId, idents: Vec<Ident> },
    Interface { parent: TypeId },
}

impl Inheritance {
    pub fn parent(&self) -> &TypeId {
        match self {
            Inheritance::Contract { parent, .. } => parent,
            Inheritance::Interface { parent } => parent,
        }
    }
}

/// A one-shot transaction program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxScript {
    pub id: TypeId,
    pub template_vars: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
}

/// A spending script; like a tx script but stateless on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetScript {
    pub id: TypeId,
    pub template_vars: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
}

/// A contract definition. Abstract contracts may declare bodyless
/// functions and can only be used as parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: TypeId,
    pub is_abstract: bool,
    pub std_id_enabled: Option<bool>,
    pub template_vars: Vec<Argument>,
    pub fields: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
    pub events: Vec<EventDef>,
    pub constants: Vec<ConstantVarDef>,
    pub enums: Vec<EnumDef>,
    pub inheritances: Vec<Inheritance>,
}

/// An interface: abstract functions and events only. `std_id` is the raw
/// standard-id suffix; the compiler prepends the fixed `"ALPH"` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub id: TypeId,
    pub std_id: Option<Bytes>,
    pub funcs: Vec<FuncDef>,
    pub events: Vec<EventDef>,
    pub inheritances: Vec<Inheritance>,
}

/// A top-level compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContractUnit {
    TxScript(TxScript),
    Contract(Contract),
    Interface(Interface),
    AssetScript(AssetScript),
}

impl ContractUnit {
    pub fn id(&self) -> &TypeId {
        match self {
            ContractUnit::TxScript(s) => &s.id,
            ContractUnit::Contract(c) => &c.id,
            ContractUnit::Interface(i) => &i.id,
            ContractUnit::AssetScript(s) => &s.id,
        }
    }

    pub fn funcs(&self) -> &[FuncDef] {
        match self {
            ContractUnit::TxScript(s) => &s.funcs,
            ContractUnit::Contract(c) => &c.funcs,
            ContractUnit::Interface(i) => &i.funcs,
            ContractUnit::AssetScript(s) => &s.funcs,
        }
    }

    pub fn inheritances(&self) -> &[Inheritance] {
        match self {
            ContractUnit::Contract(c) => &c.inheritances,
            ContractUnit::Interface(i) => &i.inheritances,
            _ => &[],
        }
    }

    /// Interfaces are always inheritable; contracts only when abstract.
    pub fn is_inheritable(&self) -> bool {
        match self {
            ContractUnit::Interface(_) => true,
            ContractUnit::Contract(c) => c.is_abstract,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_memo_is_write_once() {
        let expr = Expr::variable("x");
        assert!(expr.memoized_type().is_none());
        let first = expr.memoize_type(vec![Type::U256]).clone();
        let second = expr.memoize_type(vec![Type::Bool]).clone();
        assert_eq!(first, vec![Type::U256]);
        assert_eq!(second, vec![Type::U256]);
    }

    #[test]
    fn memo_does_not_affect_equality() {
        let a = Expr::variable("x");
        let b = Expr::variable("x");
        a.memoize_type(vec![Type::U256]);
        assert_eq!(a, b);
    }

    #[test]
    fn alph_sentinel_is_found_through_parens() {
        let plain = Expr::new(ExprKind::AlphTokenId);
        let wrapped = Expr::new(ExprKind::Paren(Box::new(Expr::new(ExprKind::Paren(
            Box::new(Expr::new(ExprKind::AlphTokenId)),
        )))));
        assert!(plain.is_alph_token_id());
        assert!(wrapped.is_alph_token_id());
        assert!(!Expr::variable("token").is_alph_token_id());
    }

    #[test]
    fn func_signature_text_is_canonical() {
        let func = FuncDef {
            id: FuncId::new("swap"),
            is_public: true,
            use_preapproved_assets: false,
            use_contract_assets: false,
            use_update_fields: false,
            use_check_external_caller: true,
            args: vec![
                Argument::new(Ident::new("amount"), Type::U256, false),
                Argument::new(Ident::new("buf"), Type::ByteVec, true),
            ],
            rtypes: vec![Type::U256],
            body: None,
        };
        assert_eq!(
            func.signature(),
            "pub swap(amount:U256,mut buf:ByteVec)->(U256)"
        );
    }

    #[test]
    fn expr_serialization_skips_the_memo() {
        let expr = Expr::const_val(Val::u256(5));
        expr.memoize_type(vec![Type::U256]);
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
        assert!(back.memoized_type().is_none());
    }
}
