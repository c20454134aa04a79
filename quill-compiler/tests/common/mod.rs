#![allow(dead_code)]

// Shared AST builders for the integration suites. The parser is out of
// scope, so tests assemble units programmatically.

use quill_ast::{
    Argument, AssignmentTarget, BinaryOperator, Contract, ContractUnit, Expr, ExprKind, FuncDef,
    FuncId, Ident, IfBranchStmt, Inheritance, Interface, Stmt, TxScript, UnaryOperator,
    VarDeclaration,
};
use quill_compiler::{compile_project, CompiledUnit, CompilerOptions};
use quill_vm::{Type, TypeId, Val};

pub fn u256(value: u64) -> Expr {
    Expr::const_val(Val::u256(value))
}

pub fn boolean(value: bool) -> Expr {
    Expr::const_val(Val::Bool(value))
}

pub fn bytes(value: &[u8]) -> Expr {
    Expr::const_val(Val::byte_vec(value.to_vec()))
}

pub fn var(name: &str) -> Expr {
    Expr::variable(name)
}

pub fn not(expr: Expr) -> Expr {
    Expr::new(ExprKind::UnaryOp {
        op: UnaryOperator::Not,
        expr: Box::new(expr),
    })
}

pub fn binop(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::new(ExprKind::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn array(elements: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::CreateArray(elements))
}

pub fn index(array: Expr, indexes: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::ArrayElement {
        array: Box::new(array),
        indexes,
    })
}

pub fn alph() -> Expr {
    Expr::new(ExprKind::AlphTokenId)
}

pub fn arg(name: &str, ty: Type) -> Argument {
    Argument::new(Ident::new(name), ty, false)
}

pub fn field(name: &str, ty: Type, mutable: bool) -> Argument {
    Argument::new(Ident::new(name), ty, mutable)
}

pub fn let_(name: &str, mutable: bool, value: Expr) -> Stmt {
    Stmt::VarDef {
        decls: vec![VarDeclaration::Named {
            mutable,
            ident: Ident::new(name),
        }],
        value,
    }
}

pub fn assign(name: &str, rhs: Expr) -> Stmt {
    Stmt::Assign {
        targets: vec![AssignmentTarget::Var(Ident::new(name))],
        rhs,
    }
}

pub fn ret(exprs: Vec<Expr>) -> Stmt {
    Stmt::Return(exprs)
}

pub fn call_stmt(name: &str, args: Vec<Expr>) -> Stmt {
    Stmt::FuncCall {
        id: FuncId::new(name),
        approve_assets: vec![],
        args,
    }
}

pub fn builtin_stmt(name: &str, args: Vec<Expr>) -> Stmt {
    Stmt::FuncCall {
        id: FuncId::builtin(name),
        approve_assets: vec![],
        args,
    }
}

pub fn if_else(cond: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    Stmt::IfElse {
        branches: vec![IfBranchStmt {
            condition: cond,
            body: then_body,
        }],
        else_branch: else_body,
    }
}

pub fn func(
    name: &str,
    is_public: bool,
    args: Vec<Argument>,
    rtypes: Vec<Type>,
    body: Vec<Stmt>,
) -> FuncDef {
    FuncDef {
        id: FuncId::new(name),
        is_public,
        use_preapproved_assets: false,
        use_contract_assets: false,
        use_update_fields: false,
        use_check_external_caller: true,
        args,
        rtypes,
        body: Some(body),
    }
}

pub fn abstract_func(name: &str, is_public: bool, args: Vec<Argument>, rtypes: Vec<Type>) -> FuncDef {
    FuncDef {
        body: None,
        ..func(name, is_public, args, rtypes, vec![])
    }
}

pub fn contract(name: &str, fields: Vec<Argument>, funcs: Vec<FuncDef>) -> ContractUnit {
    ContractUnit::Contract(Contract {
        id: TypeId::new(name),
        is_abstract: false,
        std_id_enabled: None,
        template_vars: vec![],
        fields,
        funcs,
        events: vec![],
        constants: vec![],
        enums: vec![],
        inheritances: vec![],
    })
}

pub fn abstract_contract(name: &str, fields: Vec<Argument>, funcs: Vec<FuncDef>) -> ContractUnit {
    match contract(name, fields, funcs) {
        ContractUnit::Contract(mut c) => {
            c.is_abstract = true;
            ContractUnit::Contract(c)
        }
        _ => unreachable!(),
    }
}

pub fn extends(unit: ContractUnit, parent: &str, idents: &[&str]) -> ContractUnit {
    match unit {
        ContractUnit::Contract(mut c) => {
            c.inheritances.push(Inheritance::Contract {
                parent: TypeId::new(parent),
                idents: idents.iter().map(|i| Ident::new(*i)).collect(),
            });
            ContractUnit::Contract(c)
        }
        other => other,
    }
}

pub fn implements(unit: ContractUnit, parent: &str) -> ContractUnit {
    match unit {
        ContractUnit::Contract(mut c) => {
            c.inheritances.push(Inheritance::Interface {
                parent: TypeId::new(parent),
            });
            ContractUnit::Contract(c)
        }
        other => other,
    }
}

pub fn interface(name: &str, std_id: Option<&[u8]>, funcs: Vec<FuncDef>) -> ContractUnit {
    ContractUnit::Interface(Interface {
        id: TypeId::new(name),
        std_id: std_id.map(|bytes| alloy_primitives::Bytes::from(bytes.to_vec())),
        funcs,
        events: vec![],
        inheritances: vec![],
    })
}

pub fn tx_script(name: &str, funcs: Vec<FuncDef>) -> ContractUnit {
    ContractUnit::TxScript(TxScript {
        id: TypeId::new(name),
        template_vars: vec![],
        funcs,
    })
}

pub fn compile(units: &[ContractUnit]) -> Vec<CompiledUnit> {
    compile_project(units, &CompilerOptions::default()).expect("compilation failed")
}

pub fn contract_of(unit: &CompiledUnit) -> &quill_compiler::CompiledContract {
    match unit {
        CompiledUnit::Contract(compiled) => compiled,
        other => panic!("expected a contract, got {}", other.name()),
    }
}

pub fn script_of(unit: &CompiledUnit) -> &quill_compiler::CompiledScript {
    match unit {
        CompiledUnit::Script(compiled) => compiled,
        other => panic!("expected a script, got {}", other.name()),
    }
}
