// Code generation: `emit` for every node. Produces a flat instruction
// vector per function with relative jumps counted in instructions; the
// maximum absolute branch offset is 255.

use quill_ast::{
    ApproveAsset, BinaryOperator, Expr, ExprKind, FuncDef, FuncId, Stmt, UnaryOperator,
    VarDeclaration,
};
use quill_diagnostics::{CompileError, Result};
use quill_vm::{Instr, Method, Type, TypeId};

use crate::builtins::Builtin;
use crate::state::{ArrayRef, CompilerState, FuncKind, Phase, RefKind};

const MAX_BRANCH_OFFSET: i64 = 255;

fn branch_offset(value: i64) -> Result<i32> {
    if value.abs() > MAX_BRANCH_OFFSET {
        Err(CompileError::BranchTooLong { offset: value })
    } else {
        Ok(value as i32)
    }
}

fn require_codegen(state: &CompilerState) -> Result<()> {
    if state.phase != Phase::CodeGen {
        return Err(CompileError::Other(
            "emit invoked outside of the code generation phase".to_string(),
        ));
    }
    Ok(())
}

fn memoized_types(expr: &Expr) -> Result<Vec<Type>> {
    expr.memoized_type().cloned().ok_or_else(|| {
        CompileError::Other("expression type was not resolved before emit".to_string())
    })
}

pub fn emit_expr(expr: &Expr, state: &mut CompilerState) -> Result<Vec<Instr>> {
    require_codegen(state)?;
    memoized_types(expr)?;
    match &expr.kind {
        ExprKind::Const(val) => Ok(vec![crate::state::const_instr(val)]),
        ExprKind::Variable(ident) => state.gen_load_code(ident),
        ExprKind::EnumFieldSelector { enum_id, field } => {
            let ident = quill_ast::Ident::new(format!("{}.{}", enum_id, field));
            state.gen_load_code(&ident)
        }
        ExprKind::CreateArray(elements) => {
            let mut instrs = Vec::new();
            for element in elements {
                instrs.extend(emit_expr(element, state)?);
            }
            Ok(instrs)
        }
        ExprKind::ArrayElement { array, indexes } => {
            let (mut instrs, base) = array_ref_of(array, state)?;
            let (offset, residual) = state.element_offset(&base.ty, indexes)?;
            instrs.extend(base.load_code(offset, residual.flattened_size())?);
            Ok(instrs)
        }
        ExprKind::UnaryOp {
            op: UnaryOperator::Not,
            expr: operand,
        } => {
            let mut instrs = emit_expr(operand, state)?;
            instrs.push(Instr::BoolNot);
            Ok(instrs)
        }
        ExprKind::BinaryOp { op, left, right } => {
            let operand = memoized_types(left)?;
            let mut instrs = emit_expr(left, state)?;
            instrs.extend(emit_expr(right, state)?);
            instrs.push(operator_instr(*op, &operand)?);
            Ok(instrs)
        }
        // the contract id byte vector is the value
        ExprKind::ContractConv { address, .. } => emit_expr(address, state),
        ExprKind::Call {
            id,
            approve_assets,
            args,
        } => Ok(emit_func_call(id, approve_assets, args, state)?.0),
        ExprKind::ContractStaticCall {
            contract, id, args, ..
        } => Ok(emit_static_call(contract, id, args, state)?.0),
        ExprKind::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => Ok(emit_contract_call(obj, id, approve_assets, args, state)?.0),
        ExprKind::IfElse {
            branches,
            else_expr,
        } => {
            let mut bodies = Vec::with_capacity(branches.len());
            for branch in branches {
                bodies.push(emit_expr(&branch.expr, state)?);
            }
            let else_code = emit_expr(else_expr, state)?;
            let conds: Vec<&Expr> = branches.iter().map(|b| &b.condition).collect();
            assemble_if_else(&conds, bodies, else_code, state)
        }
        ExprKind::Paren(inner) => emit_expr(inner, state),
        ExprKind::AlphTokenId => Ok(vec![Instr::ALPHTokenId]),
    }
}

fn operator_instr(op: BinaryOperator, operand: &[Type]) -> Result<Instr> {
    use BinaryOperator::*;
    let mismatch = || {
        Err(CompileError::OperatorTypeMismatch {
            op: op.to_string(),
            operands: Type::signatures(operand),
        })
    };
    let ty = match operand {
        [ty] => ty,
        _ => return mismatch(),
    };
    let instr = match (op, ty) {
        (Add, Type::U256) => Instr::U256Add,
        (Sub, Type::U256) => Instr::U256Sub,
        (Mul, Type::U256) => Instr::U256Mul,
        (Div, Type::U256) => Instr::U256Div,
        (Mod, Type::U256) => Instr::U256Mod,
        (Add, Type::I256) => Instr::I256Add,
        (Sub, Type::I256) => Instr::I256Sub,
        (Mul, Type::I256) => Instr::I256Mul,
        (Div, Type::I256) => Instr::I256Div,
        (Mod, Type::I256) => Instr::I256Mod,
        (Eq, Type::U256) => Instr::U256Eq,
        (Ne, Type::U256) => Instr::U256Neq,
        (Lt, Type::U256) => Instr::U256Lt,
        (Le, Type::U256) => Instr::U256Le,
        (Gt, Type::U256) => Instr::U256Gt,
        (Ge, Type::U256) => Instr::U256Ge,
        (Eq, Type::I256) => Instr::I256Eq,
        (Ne, Type::I256) => Instr::I256Neq,
        (Lt, Type::I256) => Instr::I256Lt,
        (Le, Type::I256) => Instr::I256Le,
        (Gt, Type::I256) => Instr::I256Gt,
        (Ge, Type::I256) => Instr::I256Ge,
        (Eq, Type::Bool) => Instr::BoolEq,
        (Ne, Type::Bool) => Instr::BoolNeq,
        (And, Type::Bool) => Instr::BoolAnd,
        (Or, Type::Bool) => Instr::BoolOr,
        (Eq, Type::ByteVec) => Instr::ByteVecEq,
        (Ne, Type::ByteVec) => Instr::ByteVecNeq,
        (Concat, Type::ByteVec) => Instr::ByteVecConcat,
        (Eq, Type::Address) => Instr::AddressEq,
        (Ne, Type::Address) => Instr::AddressNeq,
        _ => return mismatch(),
    };
    Ok(instr)
}

/// Resolve the slot range backing an array expression. Expressions that
/// are not already variable-backed are spilled into a generated local.
fn array_ref_of(expr: &Expr, state: &mut CompilerState) -> Result<(Vec<Instr>, ArrayRef)> {
    let expr = expr.unparenthesized();
    match &expr.kind {
        ExprKind::Variable(ident) => Ok((Vec::new(), state.get_array_ref(ident)?)),
        ExprKind::ArrayElement { array, indexes } => {
            let (setup, outer) = array_ref_of(array, state)?;
            let (offset, residual) = state.element_offset(&outer.ty, indexes)?;
            if !residual.is_array_type() {
                return Err(CompileError::ExpectedArrayType {
                    found: residual.signature(),
                });
            }
            let base = u8::try_from(usize::from(outer.base) + offset)
                .map_err(|_| CompileError::Other("variable slot overflow".to_string()))?;
            Ok((
                setup,
                ArrayRef {
                    kind: outer.kind,
                    base,
                    ty: residual,
                    is_mutable: outer.is_mutable,
                },
            ))
        }
        _ => {
            let types = memoized_types(expr)?;
            let ty = match types.as_slice() {
                [ty @ Type::FixedArray { .. }] => ty.clone(),
                other => {
                    return Err(CompileError::ExpectedArrayType {
                        found: Type::signatures(other),
                    })
                }
            };
            let ident = state.fresh_temp_ident()?;
            let base = state.add_local_variable(ident.clone(), ty.clone(), true, true, true)?;
            let mut setup = emit_expr(expr, state)?;
            setup.extend(state.gen_store_code(&ident)?);
            Ok((
                setup,
                ArrayRef {
                    kind: RefKind::Local,
                    base,
                    ty,
                    is_mutable: true,
                },
            ))
        }
    }
}

fn emit_args(args: &[Expr], state: &mut CompilerState) -> Result<Vec<Instr>> {
    let mut instrs = Vec::new();
    for arg in args {
        instrs.extend(emit_expr(arg, state)?);
    }
    Ok(instrs)
}

fn flattened_arg_count(args: &[Expr]) -> Result<usize> {
    let mut count = 0;
    for arg in args {
        count += Type::flattened_size_of(&memoized_types(arg)?);
    }
    Ok(count)
}

/// Approve-assets block: the address is emitted once and duplicated per
/// token entry; native-token entries use the dedicated ALPH opcode.
fn emit_approve_assets(assets: &[ApproveAsset], state: &mut CompilerState) -> Result<Vec<Instr>> {
    let mut instrs = Vec::new();
    for asset in assets {
        instrs.extend(emit_expr(&asset.address, state)?);
        for _ in 1..asset.tokens.len() {
            instrs.push(Instr::Dup);
        }
        for (token, amount) in &asset.tokens {
            if token.is_alph_token_id() {
                instrs.extend(emit_expr(amount, state)?);
                instrs.push(Instr::ApproveAlph);
            } else {
                instrs.extend(emit_expr(token, state)?);
                instrs.extend(emit_expr(amount, state)?);
                instrs.push(Instr::ApproveToken);
            }
        }
    }
    Ok(instrs)
}

fn emit_func_call(
    id: &FuncId,
    approve_assets: &[ApproveAsset],
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<(Vec<Instr>, usize)> {
    if id.is_builtin {
        let builtin = Builtin::lookup(&id.name)
            .ok_or_else(|| CompileError::undefined_function(&id.name, Builtin::names()))?;
        let code = emit_builtin(builtin, args, state)?;
        let ret = Type::flattened_size_of(&builtin.return_types());
        return Ok((code, ret));
    }
    let func = state.get_func(&id.name)?;
    let index = func.method_index().ok_or_else(|| {
        CompileError::ExpectedNonStaticFunction {
            func: func.name.clone(),
        }
    })?;
    let mut instrs = emit_approve_assets(approve_assets, state)?;
    instrs.extend(emit_args(args, state)?);
    instrs.push(Instr::CallLocal(index));
    state.add_internal_call(&func.name);
    Ok((instrs, Type::flattened_size_of(&func.return_types)))
}

fn emit_builtin(builtin: Builtin, args: &[Expr], state: &mut CompilerState) -> Result<Vec<Instr>> {
    // token built-ins specialize on the native-token sentinel: the ALPH
    // opcode is substituted and the token argument is not emitted
    let token_specialized = |state: &mut CompilerState,
                            args: &[Expr],
                            token_pos: usize,
                            alph: Instr,
                            generic: Instr|
     -> Result<Vec<Instr>> {
        let mut instrs = Vec::new();
        let is_alph = args
            .get(token_pos)
            .is_some_and(|token| token.is_alph_token_id());
        for (i, arg) in args.iter().enumerate() {
            if is_alph && i == token_pos {
                continue;
            }
            instrs.extend(emit_expr(arg, state)?);
        }
        instrs.push(if is_alph { alph } else { generic });
        Ok(instrs)
    };

    match builtin {
        Builtin::Assert => {
            let mut instrs = emit_args(args, state)?;
            instrs.push(Instr::AssertWithErrorCode);
            Ok(instrs)
        }
        Builtin::CheckCaller => {
            state.record_check_caller();
            let mut instrs = emit_args(args, state)?;
            instrs.push(Instr::AssertWithErrorCode);
            Ok(instrs)
        }
        Builtin::Panic => {
            let mut instrs = emit_args(args, state)?;
            instrs.push(Instr::Panic);
            Ok(instrs)
        }
        Builtin::CallerAddress => Ok(vec![Instr::CallerAddress]),
        Builtin::BlockTimeStamp => Ok(vec![Instr::BlockTimeStamp]),
        Builtin::Size => {
            let mut instrs = emit_args(args, state)?;
            instrs.push(Instr::ByteVecSize);
            Ok(instrs)
        }
        Builtin::Migrate => {
            state.record_migrate();
            let mut instrs = emit_args(args, state)?;
            instrs.push(Instr::MigrateSimple);
            Ok(instrs)
        }
        Builtin::TransferToken => {
            token_specialized(state, args, 2, Instr::TransferAlph, Instr::TransferToken)
        }
        Builtin::TransferTokenFromSelf => token_specialized(
            state,
            args,
            1,
            Instr::TransferAlphFromSelf,
            Instr::TransferTokenFromSelf,
        ),
        Builtin::TransferTokenToSelf => token_specialized(
            state,
            args,
            1,
            Instr::TransferAlphToSelf,
            Instr::TransferTokenToSelf,
        ),
        Builtin::TokenRemaining => {
            token_specialized(state, args, 1, Instr::AlphRemaining, Instr::TokenRemaining)
        }
        Builtin::EncodeToByteVec => {
            // variadic: the argument count is part of the call
            let mut instrs = emit_args(args, state)?;
            let count = flattened_arg_count(args)?;
            instrs.push(Instr::u256_const(count as u64));
            instrs.push(Instr::Encode);
            Ok(instrs)
        }
    }
}

fn emit_static_call(
    contract: &TypeId,
    id: &FuncId,
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<(Vec<Instr>, usize)> {
    let func = state.get_contract_func(contract, &id.name)?;
    match &func.kind {
        FuncKind::FieldEncoder { std_id } => {
            let mut instrs = Vec::new();
            let mut count = 0usize;
            if let Some(std_id) = std_id {
                instrs.push(Instr::BytesConst(std_id.clone()));
                count += 1;
            }
            instrs.extend(emit_args(args, state)?);
            count += flattened_arg_count(args)?;
            instrs.push(Instr::u256_const(count as u64));
            instrs.push(Instr::Encode);
            Ok((instrs, Type::flattened_size_of(&func.return_types)))
        }
        FuncKind::Method { .. } => Err(CompileError::ExpectedStaticFunction {
            func: format!("{}.{}", contract, id.name),
        }),
    }
}

fn emit_contract_call(
    obj: &Expr,
    id: &FuncId,
    approve_assets: &[ApproveAsset],
    args: &[Expr],
    state: &mut CompilerState,
) -> Result<(Vec<Instr>, usize)> {
    let obj_types = memoized_types(obj)?;
    let type_id = match obj_types.as_slice() {
        [Type::Contract(type_id)] => type_id.clone(),
        other => {
            return Err(CompileError::ContractExpected {
                found: Type::signatures(other),
            })
        }
    };
    let func = state.get_contract_func(&type_id, &id.name)?;
    let arg_len = flattened_arg_count(args)?;
    let ret_len = Type::flattened_size_of(&func.return_types);

    let mut instrs = emit_approve_assets(approve_assets, state)?;
    instrs.extend(emit_args(args, state)?);
    instrs.push(Instr::u256_const(arg_len as u64));
    instrs.push(Instr::u256_const(ret_len as u64));
    instrs.extend(emit_expr(obj, state)?);
    instrs.push(Instr::CallExternal {
        contract: type_id.to_string(),
        method: id.name.clone(),
    });

    state.add_external_call(&type_id, &id.name);
    if state.get_contract_info(&type_id)?.kind.is_interface() {
        state.add_interface_func_call();
    }
    Ok((instrs, ret_len))
}

/// Condition prelude of a conditional block: `!x` inverts the branch
/// instruction instead of emitting a `BoolNot`.
fn cond_ir(cond: &Expr, skip: usize, state: &mut CompilerState) -> Result<Vec<Instr>> {
    let offset = branch_offset(skip as i64)?;
    match &cond.unparenthesized().kind {
        ExprKind::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => {
            let mut instrs = emit_expr(expr, state)?;
            instrs.push(Instr::IfTrue(offset));
            Ok(instrs)
        }
        _ => {
            let mut instrs = emit_expr(cond, state)?;
            instrs.push(Instr::IfFalse(offset));
            Ok(instrs)
        }
    }
}

/// Shared layout of if/else statements and expressions. Branches are
/// assembled last-to-first so every forward offset is known exactly; a
/// branch's trailing jump is omitted when nothing follows it.
fn assemble_if_else(
    conds: &[&Expr],
    bodies: Vec<Vec<Instr>>,
    else_code: Vec<Instr>,
    state: &mut CompilerState,
) -> Result<Vec<Instr>> {
    let mut rest = else_code.len();
    let mut blocks: Vec<Vec<Instr>> = Vec::with_capacity(bodies.len());
    for (cond, body) in conds.iter().zip(bodies).rev() {
        let jump = if rest == 0 {
            Vec::new()
        } else {
            vec![Instr::Jump(branch_offset(rest as i64)?)]
        };
        let skip = body.len() + jump.len();
        let mut block = cond_ir(cond, skip, state)?;
        block.extend(body);
        block.extend(jump);
        rest += block.len();
        blocks.push(block);
    }
    let mut out = Vec::new();
    for block in blocks.into_iter().rev() {
        out.extend(block);
    }
    out.extend(else_code);
    Ok(out)
}

pub fn emit_block(stmts: &[Stmt], state: &mut CompilerState) -> Result<Vec<Instr>> {
    let mut instrs = Vec::new();
    for stmt in stmts {
        instrs.extend(emit_stmt(stmt, state)?);
    }
    Ok(instrs)
}

pub fn emit_stmt(stmt: &Stmt, state: &mut CompilerState) -> Result<Vec<Instr>> {
    require_codegen(state)?;
    match stmt {
        Stmt::VarDef { decls, value } => {
            let types = memoized_types(value)?;
            let mut instrs = emit_expr(value, state)?;
            // named slots store in reverse so values land right-to-left;
            // anonymous slots pop their flattened width
            for (decl, ty) in decls.iter().zip(&types).rev() {
                match decl {
                    VarDeclaration::Named { ident, .. } => {
                        instrs.extend(state.gen_store_code(ident)?);
                    }
                    VarDeclaration::Anonymous => {
                        instrs.extend(std::iter::repeat(Instr::Pop).take(ty.flattened_size()));
                    }
                }
            }
            Ok(instrs)
        }
        Stmt::Assign { targets, rhs } => {
            let mut instrs = emit_expr(rhs, state)?;
            for target in targets.iter().rev() {
                match target {
                    quill_ast::AssignmentTarget::Var(ident) => {
                        instrs.extend(state.gen_store_code(ident)?);
                    }
                    quill_ast::AssignmentTarget::ArrayElement { ident, indexes } => {
                        let _ = state.get_variable(ident, true)?;
                        let array = state.get_array_ref(ident)?;
                        let (offset, residual) = state.element_offset(&array.ty, indexes)?;
                        instrs.extend(array.store_code(offset, residual.flattened_size())?);
                    }
                }
            }
            Ok(instrs)
        }
        Stmt::FuncCall {
            id,
            approve_assets,
            args,
        } => {
            let (mut instrs, ret_len) = emit_func_call(id, approve_assets, args, state)?;
            instrs.extend(std::iter::repeat(Instr::Pop).take(ret_len));
            Ok(instrs)
        }
        Stmt::StaticContractCall {
            contract, id, args, ..
        } => {
            let (mut instrs, ret_len) = emit_static_call(contract, id, args, state)?;
            instrs.extend(std::iter::repeat(Instr::Pop).take(ret_len));
            Ok(instrs)
        }
        Stmt::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => {
            let (mut instrs, ret_len) = emit_contract_call(obj, id, approve_assets, args, state)?;
            instrs.extend(std::iter::repeat(Instr::Pop).take(ret_len));
            Ok(instrs)
        }
        Stmt::IfElse {
            branches,
            else_branch,
        } => {
            let mut bodies = Vec::with_capacity(branches.len());
            for branch in branches {
                bodies.push(emit_block(&branch.body, state)?);
            }
            let else_code = match else_branch {
                Some(body) => emit_block(body, state)?,
                None => Vec::new(),
            };
            let conds: Vec<&Expr> = branches.iter().map(|b| &b.condition).collect();
            assemble_if_else(&conds, bodies, else_code, state)
        }
        Stmt::While { cond, body } => {
            let body_code = emit_block(body, state)?;
            let cond_code = cond_ir(cond, body_code.len() + 1, state)?;
            let back = -((cond_code.len() + body_code.len() + 1) as i64);
            let mut instrs = cond_code;
            instrs.extend(body_code);
            instrs.push(Instr::Jump(branch_offset(back)?));
            Ok(instrs)
        }
        Stmt::ForLoop {
            init,
            cond,
            update,
            body,
        } => {
            let init_code = emit_stmt(init, state)?;
            let body_code = emit_block(body, state)?;
            let update_code = emit_stmt(update, state)?;
            let cond_code = cond_ir(cond, body_code.len() + update_code.len() + 1, state)?;
            let back =
                -((cond_code.len() + body_code.len() + update_code.len() + 1) as i64);
            let mut instrs = init_code;
            instrs.extend(cond_code);
            instrs.extend(body_code);
            instrs.extend(update_code);
            instrs.push(Instr::Jump(branch_offset(back)?));
            Ok(instrs)
        }
        Stmt::Return(exprs) => {
            let mut instrs = Vec::new();
            for expr in exprs {
                instrs.extend(emit_expr(expr, state)?);
            }
            instrs.push(Instr::Return);
            Ok(instrs)
        }
        Stmt::EmitEvent { id, args } => {
            let (index, _) = state.event_index(id)?;
            let mut instrs = vec![Instr::u256_const(index as u64)];
            for arg in args {
                instrs.extend(emit_expr(arg, state)?);
            }
            let count = u8::try_from(args.len() + 1).map_err(|_| {
                CompileError::TooManySlots {
                    owner: id.to_string(),
                }
            })?;
            instrs.push(Instr::Log(count));
            Ok(instrs)
        }
        Stmt::Debug {
            string_parts,
            interpolations,
        } => {
            if !state.allow_debug {
                return Ok(Vec::new());
            }
            let mut instrs = Vec::new();
            for expr in interpolations {
                instrs.extend(emit_expr(expr, state)?);
            }
            instrs.push(Instr::Debug(string_parts.clone()));
            Ok(instrs)
        }
    }
}

/// Assemble one method from a checked function definition.
pub fn gen_method(func: &FuncDef, state: &mut CompilerState) -> Result<Method> {
    require_codegen(state)?;
    let body = func.body.as_ref().ok_or_else(|| {
        CompileError::AbstractFuncInContract {
            contract: state.type_id.to_string(),
            func: func.id.name.clone(),
        }
    })?;
    state.set_func_scope(&func.id.name);
    let instrs = emit_block(body, state)?;
    let arg_types: Vec<Type> = func.args.iter().map(|arg| arg.ty.clone()).collect();
    let method = Method {
        is_public: func.is_public,
        use_preapproved_assets: func.use_preapproved_assets,
        use_contract_assets: func.use_contract_assets,
        args_length: Type::flattened_size_of(&arg_types),
        locals_length: state.local_slot_count(&func.id.name),
        return_length: Type::flattened_size_of(&func.rtypes),
        instrs,
    };
    state.exit_func_scope();
    Ok(method)
}
