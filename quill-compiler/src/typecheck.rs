// Semantic checking: `type_of` for every expression variant plus the
// statement and function checks. Types are memoized on the node the first
// time they are computed; code generation reuses the memo and never
// recomputes.

use quill_ast::{
    ApproveAsset, BinaryOperator, Expr, ExprKind, FuncDef, FuncId, Ident, Stmt, UnaryOperator,
    VarDeclaration,
};
use quill_diagnostics::{CompileError, Result};
use quill_vm::{Type, TypeId};

use crate::builtins::Builtin;
use crate::state::{CompilerState, ContractKind};

pub fn type_of_expr(expr: &Expr, state: &mut CompilerState) -> Result<Vec<Type>> {
    if let Some(types) = expr.memoized_type() {
        return Ok(types.clone());
    }
    let types = infer_expr(expr, state)?;
    Ok(expr.memoize_type(types).clone())
}

fn infer_expr(expr: &Expr, state: &mut CompilerState) -> Result<Vec<Type>> {
    match &expr.kind {
        ExprKind::Const(val) => Ok(vec![Type::from_val(val)]),
        ExprKind::Variable(ident) => Ok(vec![state.get_type(ident)?]),
        ExprKind::EnumFieldSelector { enum_id, field } => {
            let ident = Ident::new(format!("{}.{}", enum_id, field));
            Ok(vec![state.get_type(&ident)?])
        }
        ExprKind::CreateArray(elements) => {
            if elements.is_empty() {
                return Err(CompileError::EmptyArray);
            }
            let mut element_types = Vec::with_capacity(elements.len());
            for element in elements {
                let types = type_of_expr(element, state)?;
                match types.as_slice() {
                    [ty] => element_types.push(ty.clone()),
                    other => {
                        return Err(CompileError::InvalidArrayElement {
                            found: Type::signatures(other),
                        })
                    }
                }
            }
            let first = element_types[0].clone();
            if element_types.iter().any(|ty| *ty != first) {
                return Err(CompileError::HeterogeneousArray {
                    found: Type::signatures(&element_types),
                });
            }
            Ok(vec![Type::array(first, elements.len())])
        }
        ExprKind::ArrayElement { array, indexes } => {
            let base = type_of_expr(array, state)?;
            state.get_array_element_type(&base, indexes)
        }
        ExprKind::UnaryOp { op, expr: operand } => {
            let types = type_of_expr(operand, state)?;
            match (op, types.as_slice()) {
                (UnaryOperator::Not, [Type::Bool]) => Ok(vec![Type::Bool]),
                _ => Err(CompileError::OperatorTypeMismatch {
                    op: op.to_string(),
                    operands: Type::signatures(&types),
                }),
            }
        }
        ExprKind::BinaryOp { op, left, right } => {
            let left_types = type_of_expr(left, state)?;
            let right_types = type_of_expr(right, state)?;
            match (left_types.as_slice(), right_types.as_slice()) {
                ([l], [r]) => operator_result_type(*op, l, r),
                _ => Err(CompileError::OperatorTypeMismatch {
                    op: op.to_string(),
                    operands: format!(
                        "{} and {}",
                        Type::signatures(&left_types),
                        Type::signatures(&right_types)
                    ),
                }),
            }
        }
        ExprKind::ContractConv { type_id, address } => {
            let address_types = type_of_expr(address, state)?;
            if address_types != [Type::ByteVec] {
                return Err(CompileError::ArgumentTypeMismatch {
                    func: type_id.to_string(),
                    expected: "(ByteVec)".to_string(),
                    found: Type::signatures(&address_types),
                });
            }
            let info = state.get_contract_info(type_id)?;
            match info.kind {
                ContractKind::Contract { is_abstract: false } | ContractKind::Interface => {
                    Ok(vec![Type::Contract(type_id.clone())])
                }
                _ => Err(CompileError::NotInstantiable {
                    name: type_id.to_string(),
                }),
            }
        }
        ExprKind::Call {
            id,
            approve_assets,
            args,
        } => check_func_call(id, approve_assets, args, state),
        ExprKind::ContractStaticCall {
            contract,
            id,
            approve_assets,
            args,
        } => check_static_call(contract, id, approve_assets, args, state),
        ExprKind::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => check_contract_call(obj, id, approve_assets, args, state),
        ExprKind::IfElse {
            branches,
            else_expr,
        } => {
            let else_types = type_of_expr(else_expr, state)?;
            for branch in branches {
                check_condition(&branch.condition, state)?;
                let branch_types = type_of_expr(&branch.expr, state)?;
                if branch_types != else_types {
                    return Err(CompileError::Other(format!(
                        "if/else branches must produce one type, got {} and {}",
                        Type::signatures(&branch_types),
                        Type::signatures(&else_types)
                    )));
                }
            }
            Ok(else_types)
        }
        ExprKind::Paren(inner) => type_of_expr(inner, state),
        ExprKind::AlphTokenId => Ok(vec![Type::ByteVec]),
    }
}

/// Result typing of binary operators. Arithmetic stays within one signed
/// or unsigned 256-bit type; comparisons yield Bool; `++` joins byte
/// vectors. Anything else is a mismatch.
pub(crate) fn operator_result_type(
    op: BinaryOperator,
    left: &Type,
    right: &Type,
) -> Result<Vec<Type>> {
    use BinaryOperator::*;
    let mismatch = || {
        Err(CompileError::OperatorTypeMismatch {
            op: op.to_string(),
            operands: Type::signatures(&[left.clone(), right.clone()]),
        })
    };
    match op {
        Add | Sub | Mul | Div | Mod => match (left, right) {
            (Type::U256, Type::U256) => Ok(vec![Type::U256]),
            (Type::I256, Type::I256) => Ok(vec![Type::I256]),
            _ => mismatch(),
        },
        Concat => match (left, right) {
            (Type::ByteVec, Type::ByteVec) => Ok(vec![Type::ByteVec]),
            _ => mismatch(),
        },
        Eq | Ne => {
            let comparable =
                left == right && !left.is_array_type() && !left.is_contract_type();
            if comparable {
                Ok(vec![Type::Bool])
            } else {
                mismatch()
            }
        }
        Lt | Le | Gt | Ge => match (left, right) {
            (Type::U256, Type::U256) | (Type::I256, Type::I256) => Ok(vec![Type::Bool]),
            _ => mismatch(),
        },
        And | Or => match (left, right) {
            (Type::Bool, Type::Bool) => Ok(vec![Type::Bool]),
            _ => mismatch(),
        },
    }
}

fn check_condition(cond: &Expr, state: &mut CompilerState) -> Result<()> {
    let types = type_of_expr(cond, state)?;
    if types != [Type::Bool] {
        return Err(CompileError::InvalidCondition {
            found: Type::signatures(&types),
        });
    }
    Ok(())
}

fn concat_arg_types(args: &[Expr], state: &mut CompilerState) -> Result<Vec<Type>> {
    let mut types = Vec::new();
    for arg in args {
        types.extend(type_of_expr(arg, state)?);
    }
    Ok(types)
}

/// Approve-assets entries pre-authorize `(Address, ByteVec token, U256
/// amount)` triples; the types are validated here, the caller/callee
/// attribute agreement in `check_approve_usage`.
fn check_approve_assets(assets: &[ApproveAsset], state: &mut CompilerState) -> Result<()> {
    for asset in assets {
        let address_types = type_of_expr(&asset.address, state)?;
        if address_types != [Type::Address] {
            return Err(CompileError::ArgumentTypeMismatch {
                func: "approve assets".to_string(),
                expected: "(Address)".to_string(),
                found: Type::signatures(&address_types),
            });
        }
        for (token, amount) in &asset.tokens {
            let token_types = type_of_expr(token, state)?;
            if token_types != [Type::ByteVec] {
                return Err(CompileError::ArgumentTypeMismatch {
                    func: "approve assets".to_string(),
                    expected: "(ByteVec)".to_string(),
                    found: Type::signatures(&token_types),
                });
            }
            let amount_types = type_of_expr(amount, state)?;
            if amount_types != [Type::U256] {
                return Err(CompileError::ArgumentTypeMismatch {
                    func: "approve assets".to_string(),
                    expected: "(U256)".to_string(),
                    found: Type::signatures(&amount_types),
                });
            }
        }
    }
    Ok(())
}

/// A call site with a non-empty approve block needs a callee that accepts
/// preapproved assets, and vice versa.
fn check_approve_usage(
    func_name: &str,
    accepts_assets: bool,
    assets: &[ApproveAsset],
) -> Result<()> {
    let has_assets = !assets.is_empty();
    if has_assets && !accepts_assets {
        return Err(CompileError::ApprovedAssetsNotAccepted {
            func: func_name.to_string(),
        });
    }
    if !has_assets && accepts_assets {
        return Err(CompileError::MissingApprovedAssets {
            func: func_name.to_string(),
        });
    }
    Ok(())
}

fn check_args_against(
    func_name: &str,
    expected: &[Type],
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<()> {
    let found = concat_arg_types(args, state)?;
    if found != expected {
        return Err(CompileError::ArgumentTypeMismatch {
            func: func_name.to_string(),
            expected: Type::signatures(expected),
            found: Type::signatures(&found),
        });
    }
    Ok(())
}

pub(crate) fn check_func_call(
    id: &FuncId,
    approve_assets: &[ApproveAsset],
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<Vec<Type>> {
    check_approve_assets(approve_assets, state)?;
    if id.is_builtin {
        let builtin = Builtin::lookup(&id.name)
            .ok_or_else(|| CompileError::undefined_function(&id.name, Builtin::names()))?;
        check_approve_usage(&id.to_string(), false, approve_assets)?;
        match builtin.arg_types() {
            Some(expected) => check_args_against(&id.to_string(), &expected, args, state)?,
            None => {
                // variadic: every argument is a single value
                for arg in args {
                    let types = type_of_expr(arg, state)?;
                    if types.len() != 1 {
                        return Err(CompileError::InvalidArrayElement {
                            found: Type::signatures(&types),
                        });
                    }
                }
            }
        }
        Ok(builtin.return_types())
    } else {
        let func = state.get_func(&id.name)?;
        check_approve_usage(&func.name, func.use_preapproved_assets, approve_assets)?;
        check_args_against(&func.name, &func.arg_types.clone(), args, state)?;
        Ok(func.return_types)
    }
}

pub(crate) fn check_static_call(
    contract: &TypeId,
    id: &FuncId,
    approve_assets: &[ApproveAsset],
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<Vec<Type>> {
    check_approve_assets(approve_assets, state)?;
    let func = state.get_contract_func(contract, &id.name)?;
    if !func.is_static {
        return Err(CompileError::ExpectedStaticFunction {
            func: format!("{}.{}", contract, id.name),
        });
    }
    check_approve_usage(&func.name, func.use_preapproved_assets, approve_assets)?;
    check_args_against(&func.name, &func.arg_types.clone(), args, state)?;
    Ok(func.return_types)
}

pub(crate) fn check_contract_call(
    obj: &Expr,
    id: &FuncId,
    approve_assets: &[ApproveAsset],
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<Vec<Type>> {
    check_approve_assets(approve_assets, state)?;
    let obj_types = type_of_expr(obj, state)?;
    let type_id = match obj_types.as_slice() {
        [Type::Contract(type_id)] => type_id.clone(),
        other => {
            return Err(CompileError::ContractExpected {
                found: Type::signatures(other),
            })
        }
    };
    let func = state.get_contract_func(&type_id, &id.name)?;
    if func.is_static {
        return Err(CompileError::ExpectedNonStaticFunction {
            func: format!("{}.{}", type_id, id.name),
        });
    }
    check_approve_usage(&func.name, func.use_preapproved_assets, approve_assets)?;
    check_args_against(&func.name, &func.arg_types.clone(), args, state)?;
    Ok(func.return_types)
}

pub fn check_stmt(stmt: &Stmt, state: &mut CompilerState) -> Result<()> {
    match stmt {
        Stmt::VarDef { decls, value } => {
            let types = type_of_expr(value, state)?;
            if decls.len() != types.len() {
                return Err(CompileError::VarDeclarationMismatch {
                    declared: decls.len(),
                    produced: types.len(),
                });
            }
            for (decl, ty) in decls.iter().zip(&types) {
                if let VarDeclaration::Named { mutable, ident } = decl {
                    state.add_local_variable(ident.clone(), ty.clone(), *mutable, false, false)?;
                }
            }
            Ok(())
        }
        Stmt::Assign { targets, rhs } => {
            let mut expected = Vec::with_capacity(targets.len());
            for target in targets {
                match target {
                    quill_ast::AssignmentTarget::Var(ident) => {
                        expected.push(state.get_variable(ident, true)?.ty);
                    }
                    quill_ast::AssignmentTarget::ArrayElement { ident, indexes } => {
                        let info = state.get_variable(ident, true)?;
                        let element = state.get_array_element_type(&[info.ty], indexes)?;
                        expected.extend(element);
                    }
                }
            }
            let found = type_of_expr(rhs, state)?;
            if found != expected {
                return Err(CompileError::AssignmentTypeMismatch {
                    expected: Type::signatures(&expected),
                    found: Type::signatures(&found),
                });
            }
            Ok(())
        }
        Stmt::FuncCall {
            id,
            approve_assets,
            args,
        } => {
            check_func_call(id, approve_assets, args, state)?;
            Ok(())
        }
        Stmt::StaticContractCall {
            contract,
            id,
            approve_assets,
            args,
        } => {
            check_static_call(contract, id, approve_assets, args, state)?;
            Ok(())
        }
        Stmt::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => {
            check_contract_call(obj, id, approve_assets, args, state)?;
            Ok(())
        }
        Stmt::IfElse {
            branches,
            else_branch,
        } => {
            for branch in branches {
                check_condition(&branch.condition, state)?;
                for stmt in &branch.body {
                    check_stmt(stmt, state)?;
                }
            }
            if let Some(body) = else_branch {
                for stmt in body {
                    check_stmt(stmt, state)?;
                }
            }
            Ok(())
        }
        Stmt::While { cond, body } => {
            check_condition(cond, state)?;
            for stmt in body {
                check_stmt(stmt, state)?;
            }
            Ok(())
        }
        Stmt::ForLoop {
            init,
            cond,
            update,
            body,
        } => {
            check_stmt(init, state)?;
            check_condition(cond, state)?;
            for stmt in body {
                check_stmt(stmt, state)?;
            }
            check_stmt(update, state)?;
            Ok(())
        }
        Stmt::Return(exprs) => {
            let mut types = Vec::new();
            for expr in exprs {
                types.extend(type_of_expr(expr, state)?);
            }
            state.check_return(&types)
        }
        Stmt::EmitEvent { id, args } => {
            let (_, event) = state.event_index(id)?;
            let mut found = Vec::with_capacity(args.len());
            for arg in args {
                let types = type_of_expr(arg, state)?;
                match types.as_slice() {
                    [ty] if !ty.is_array_type() => found.push(ty.clone()),
                    other => {
                        return Err(CompileError::InvalidEventArg {
                            event: id.to_string(),
                            found: Type::signatures(other),
                        })
                    }
                }
            }
            let expected: Vec<Type> = event.fields.iter().map(|f| f.ty.clone()).collect();
            if found != expected {
                return Err(CompileError::EventArgsMismatch {
                    event: id.to_string(),
                    expected: Type::signatures(&expected),
                    found: Type::signatures(&found),
                });
            }
            Ok(())
        }
        Stmt::Debug { interpolations, .. } => {
            for expr in interpolations {
                let types = type_of_expr(expr, state)?;
                match types.as_slice() {
                    [ty] if !ty.is_array_type() => {}
                    other => {
                        return Err(CompileError::Other(format!(
                            "cannot interpolate {} in a debug statement",
                            Type::signatures(other)
                        )))
                    }
                }
            }
            Ok(())
        }
    }
}

/// Whether every control path through `stmts` ends in `return` or a
/// `panic!` call. Loops never count: their bodies may not run.
pub(crate) fn block_terminates(stmts: &[Stmt]) -> bool {
    match stmts.last() {
        Some(Stmt::Return(_)) => true,
        Some(Stmt::FuncCall { id, .. }) => {
            id.is_builtin && Builtin::lookup(&id.name).is_some_and(Builtin::diverges)
        }
        Some(Stmt::IfElse {
            branches,
            else_branch: Some(else_body),
        }) => {
            branches.iter().all(|branch| block_terminates(&branch.body))
                && block_terminates(else_body)
        }
        _ => false,
    }
}

/// Per-function traversal of the check phase: bind arguments as locals,
/// check the body, then run the unused/unassigned analyses for the scope.
pub fn check_func(func: &FuncDef, state: &mut CompilerState) -> Result<()> {
    let body = func.body.as_ref().ok_or_else(|| {
        CompileError::AbstractFuncInContract {
            contract: state.type_id.to_string(),
            func: func.id.name.clone(),
        }
    })?;
    state.set_func_scope(&func.id.name);
    state.check_arguments(&func.args)?;
    for arg in &func.args {
        state.add_local_variable(
            arg.ident.clone(),
            arg.ty.clone(),
            arg.is_mutable,
            arg.is_unused,
            false,
        )?;
    }
    for stmt in body {
        check_stmt(stmt, state)?;
    }
    if !func.rtypes.is_empty() && !block_terminates(body) {
        return Err(CompileError::MissingReturn {
            func: func.id.name.clone(),
        });
    }
    state.check_unused_local_vars(&func.id.name);
    state.check_unassigned_local_mutable_vars(&func.id.name)?;
    state.exit_func_scope();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::IfBranchStmt;
    use quill_vm::Val;

    #[test]
    fn arithmetic_stays_within_one_int_type() {
        assert_eq!(
            operator_result_type(BinaryOperator::Add, &Type::U256, &Type::U256).unwrap(),
            vec![Type::U256]
        );
        assert_eq!(
            operator_result_type(BinaryOperator::Mod, &Type::I256, &Type::I256).unwrap(),
            vec![Type::I256]
        );
        assert!(operator_result_type(BinaryOperator::Add, &Type::U256, &Type::I256).is_err());
        assert!(operator_result_type(BinaryOperator::Add, &Type::Bool, &Type::Bool).is_err());
    }

    #[test]
    fn comparisons_yield_bool() {
        assert_eq!(
            operator_result_type(BinaryOperator::Lt, &Type::U256, &Type::U256).unwrap(),
            vec![Type::Bool]
        );
        assert_eq!(
            operator_result_type(BinaryOperator::Eq, &Type::ByteVec, &Type::ByteVec).unwrap(),
            vec![Type::Bool]
        );
        assert!(operator_result_type(BinaryOperator::Lt, &Type::ByteVec, &Type::ByteVec).is_err());
        let array = Type::array(Type::U256, 2);
        assert!(operator_result_type(BinaryOperator::Eq, &array, &array).is_err());
    }

    #[test]
    fn concat_joins_byte_vectors_only() {
        assert_eq!(
            operator_result_type(BinaryOperator::Concat, &Type::ByteVec, &Type::ByteVec).unwrap(),
            vec![Type::ByteVec]
        );
        assert!(operator_result_type(BinaryOperator::Concat, &Type::U256, &Type::U256).is_err());
    }

    fn return_stmt() -> Stmt {
        Stmt::Return(vec![])
    }

    fn panic_stmt() -> Stmt {
        Stmt::FuncCall {
            id: FuncId::builtin("panic"),
            approve_assets: vec![],
            args: vec![Expr::const_val(Val::u256(1))],
        }
    }

    #[test]
    fn terminal_statements_end_a_path() {
        assert!(block_terminates(&[return_stmt()]));
        assert!(block_terminates(&[panic_stmt()]));
        assert!(!block_terminates(&[]));
        assert!(!block_terminates(&[Stmt::While {
            cond: Expr::const_val(Val::Bool(true)),
            body: vec![return_stmt()],
        }]));
    }

    #[test]
    fn if_else_terminates_when_all_arms_do() {
        let terminal = Stmt::IfElse {
            branches: vec![IfBranchStmt {
                condition: Expr::const_val(Val::Bool(true)),
                body: vec![return_stmt()],
            }],
            else_branch: Some(vec![panic_stmt()]),
        };
        assert!(block_terminates(&[terminal]));

        let open = Stmt::IfElse {
            branches: vec![IfBranchStmt {
                condition: Expr::const_val(Val::Bool(true)),
                body: vec![return_stmt()],
            }],
            else_branch: None,
        };
        assert!(!block_terminates(&[open]));
    }
}
