// Multi-unit orchestration: resolve inheritance, build the project-wide
// contract table, then drive check + emit per unit in input order. Each
// deployable unit is emitted twice when debug ops are present: once with
// them (the debug artifact) and once without (the release artifact).

use std::collections::HashMap;

use quill_ast::{self as ast, ContractUnit, Ident};
use quill_diagnostics::{CompileError, Result, Warning};
use quill_vm::{Method, StatefulContract, StatefulScript, StatelessScript, Type, TypeId};
use serde::Serialize;

use crate::analysis::{self, MethodSummary};
use crate::codegen;
use crate::inherit::{
    flatten_contract, flatten_interface, FlattenedContract, FlattenedInterface,
    InheritanceResolver, UnitTable, STD_ID_FIELD,
};
use crate::options::CompilerOptions;
use crate::state::{CompilerState, ContractInfo, ContractKind, FuncInfo, FuncKind};
use crate::typecheck;

/// A compiled contract: release and debug artifacts, the flattened AST
/// they were generated from, and the unit's warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledContract {
    pub contract: StatefulContract,
    pub debug_contract: StatefulContract,
    pub ast: FlattenedContract,
    pub warnings: Vec<Warning>,
    pub method_summaries: Vec<MethodSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledScript {
    pub script: StatefulScript,
    pub debug_script: StatefulScript,
    pub ast: ast::TxScript,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledAssetScript {
    pub script: StatelessScript,
    pub debug_script: StatelessScript,
    pub ast: ast::AssetScript,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CompiledUnit {
    Contract(Box<CompiledContract>),
    Script(CompiledScript),
    AssetScript(CompiledAssetScript),
}

impl CompiledUnit {
    pub fn name(&self) -> &str {
        match self {
            CompiledUnit::Contract(c) => c.ast.id.name(),
            CompiledUnit::Script(s) => s.ast.id.name(),
            CompiledUnit::AssetScript(s) => s.ast.id.name(),
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            CompiledUnit::Contract(c) => &c.warnings,
            CompiledUnit::Script(s) => &s.warnings,
            CompiledUnit::AssetScript(s) => &s.warnings,
        }
    }
}

/// Compile a whole project. Units are processed in input order; a failing
/// unit aborts the batch.
pub fn compile_project(
    units: &[ContractUnit],
    options: &CompilerOptions,
) -> Result<Vec<CompiledUnit>> {
    let table = UnitTable::new(units)?;
    let mut resolver = InheritanceResolver::new(table);

    // resolve every closure up front so cycles and invalid clauses are
    // reported even for units nothing instantiates
    for unit in units {
        match unit {
            ContractUnit::Contract(_) | ContractUnit::Interface(_) => {
                resolver.parents(unit.id())?;
            }
            _ => {}
        }
    }

    let mut contracts: HashMap<String, FlattenedContract> = HashMap::new();
    let mut interfaces: HashMap<String, FlattenedInterface> = HashMap::new();
    for unit in units {
        match unit {
            ContractUnit::Contract(contract) => {
                let flat = flatten_contract(contract, &mut resolver)?;
                contracts.insert(contract.id.name().to_string(), flat);
            }
            ContractUnit::Interface(interface) => {
                let flat = flatten_interface(interface, &mut resolver)?;
                interfaces.insert(interface.id.name().to_string(), flat);
            }
            _ => {}
        }
    }

    let contract_table = build_contract_table(units, &contracts, &interfaces)?;

    let mut outputs = Vec::new();
    for unit in units {
        match unit {
            ContractUnit::TxScript(script) => {
                outputs.push(CompiledUnit::Script(compile_script(
                    script,
                    &contract_table,
                    options,
                )?));
            }
            ContractUnit::AssetScript(script) => {
                outputs.push(CompiledUnit::AssetScript(compile_asset_script(
                    script,
                    &contract_table,
                    options,
                )?));
            }
            ContractUnit::Contract(contract) if !contract.is_abstract => {
                let flat = contracts
                    .get(contract.id.name())
                    .ok_or_else(|| CompileError::UndefinedContract {
                        name: contract.id.to_string(),
                    })?;
                outputs.push(CompiledUnit::Contract(Box::new(compile_contract(
                    flat,
                    &contract_table,
                    options,
                )?)));
            }
            _ => {}
        }
    }
    Ok(outputs)
}

fn field_encoder(name: &str, arg_types: Vec<Type>, std_id: Option<alloy_primitives::Bytes>) -> FuncInfo {
    FuncInfo {
        name: name.to_string(),
        is_public: true,
        is_static: true,
        use_preapproved_assets: false,
        use_contract_assets: false,
        use_update_fields: false,
        use_check_external_caller: false,
        arg_types,
        return_types: vec![Type::ByteVec],
        kind: FuncKind::FieldEncoder { std_id },
    }
}

fn func_table(funcs: &[ast::FuncDef]) -> Result<HashMap<String, FuncInfo>> {
    if funcs.len() > 256 {
        return Err(CompileError::TooManySlots {
            owner: "function table".to_string(),
        });
    }
    Ok(funcs
        .iter()
        .enumerate()
        .map(|(index, func)| {
            (
                func.id.name.clone(),
                FuncInfo::from_def(func, index as u8),
            )
        })
        .collect())
}

fn build_contract_table(
    units: &[ContractUnit],
    contracts: &HashMap<String, FlattenedContract>,
    interfaces: &HashMap<String, FlattenedInterface>,
) -> Result<HashMap<TypeId, ContractInfo>> {
    let mut table = HashMap::new();
    for unit in units {
        let info = match unit {
            ContractUnit::TxScript(_) => ContractInfo {
                kind: ContractKind::TxScript,
                funcs: HashMap::new(),
            },
            ContractUnit::AssetScript(_) => ContractInfo {
                kind: ContractKind::AssetScript,
                funcs: HashMap::new(),
            },
            ContractUnit::Contract(contract) => {
                let flat = contracts.get(contract.id.name()).ok_or_else(|| {
                    CompileError::UndefinedContract {
                        name: contract.id.to_string(),
                    }
                })?;
                let mut funcs = func_table(&flat.funcs)?;
                let immutable: Vec<Type> = flat
                    .fields
                    .iter()
                    .filter(|field| !field.is_mutable)
                    .map(|field| field.ty.clone())
                    .collect();
                let mutable: Vec<Type> = flat
                    .fields
                    .iter()
                    .filter(|field| field.is_mutable)
                    .map(|field| field.ty.clone())
                    .collect();
                let all: Vec<Type> = flat.fields.iter().map(|field| field.ty.clone()).collect();
                let std_id = flat.std_id.clone().filter(|_| flat.has_std_id_field);
                funcs.insert(
                    "encodeImmFields".to_string(),
                    field_encoder("encodeImmFields", immutable, std_id.clone()),
                );
                funcs.insert(
                    "encodeMutFields".to_string(),
                    field_encoder("encodeMutFields", mutable, None),
                );
                funcs.insert(
                    "encodeFields".to_string(),
                    field_encoder("encodeFields", all, std_id),
                );
                ContractInfo {
                    kind: ContractKind::Contract {
                        is_abstract: contract.is_abstract,
                    },
                    funcs,
                }
            }
            ContractUnit::Interface(interface) => {
                let flat = interfaces.get(interface.id.name()).ok_or_else(|| {
                    CompileError::UndefinedContract {
                        name: interface.id.to_string(),
                    }
                })?;
                ContractInfo {
                    kind: ContractKind::Interface,
                    funcs: func_table(&flat.funcs)?,
                }
            }
        };
        table.insert(unit.id().clone(), info);
    }
    Ok(table)
}

fn new_contract_state(
    flat: &FlattenedContract,
    contract_table: &HashMap<TypeId, ContractInfo>,
    options: &CompilerOptions,
) -> Result<CompilerState> {
    let mut state = CompilerState::new(flat.id.clone(), contract_table.clone(), options.clone());
    for template in &flat.template_vars {
        state.add_template_variable(
            template.ident.clone(),
            template.ty.clone(),
            template.is_unused,
        )?;
    }
    for field in &flat.fields {
        state.add_field_variable(
            field.ident.clone(),
            field.ty.clone(),
            field.is_mutable,
            field.is_unused,
            false,
        )?;
    }
    if flat.has_std_id_field {
        state.add_field_variable(Ident::new(STD_ID_FIELD), Type::ByteVec, false, true, true)?;
    }
    for constant in &flat.constants {
        state.add_constant_variable(constant.ident.clone(), constant.value.clone())?;
    }
    for enum_def in &flat.enums {
        for field in &enum_def.fields {
            state.add_constant_variable(
                Ident::new(format!("{}.{}", enum_def.id, field.ident)),
                field.value.clone(),
            )?;
        }
    }
    state.set_events(flat.events.clone());
    let funcs: Vec<FuncInfo> = flat
        .funcs
        .iter()
        .enumerate()
        .map(|(index, func)| FuncInfo::from_def(func, index as u8))
        .collect();
    state.set_funcs(funcs);
    Ok(state)
}

fn gen_methods(funcs: &[ast::FuncDef], state: &mut CompilerState) -> Result<Vec<Method>> {
    funcs
        .iter()
        .map(|func| codegen::gen_method(func, state))
        .collect()
}

fn compile_contract(
    flat: &FlattenedContract,
    contract_table: &HashMap<TypeId, ContractInfo>,
    options: &CompilerOptions,
) -> Result<CompiledContract> {
    log::debug!("compiling contract {}", flat.id);
    let mut state = new_contract_state(flat, contract_table, options)?;

    for func in &flat.funcs {
        typecheck::check_func(func, &mut state)?;
    }
    state.check_unused_fields();
    state.check_unused_constants();
    state.check_unassigned_mutable_fields()?;

    state.start_codegen();
    let methods = gen_methods(&flat.funcs, &mut state)?;
    let fields_length = Type::flattened_size_of(
        &flat
            .fields
            .iter()
            .map(|field| field.ty.clone())
            .collect::<Vec<_>>(),
    ) + usize::from(flat.has_std_id_field);
    let debug_contract = StatefulContract {
        fields_length,
        methods,
    };

    analysis::check_external_calls(&state)?;
    let method_summaries = analysis::method_summaries(&flat.funcs, &state);
    analysis::check_external_caller_warnings(&flat.funcs, &method_summaries, &mut state);
    analysis::update_fields_warnings(&flat.funcs, &mut state);
    analysis::unused_private_functions(&flat.funcs, &mut state);

    let contract = if debug_contract.has_debug_code() {
        state.allow_debug = false;
        StatefulContract {
            fields_length,
            methods: gen_methods(&flat.funcs, &mut state)?,
        }
    } else {
        debug_contract.clone()
    };

    Ok(CompiledContract {
        contract,
        debug_contract,
        ast: flat.clone(),
        warnings: state.warnings.clone(),
        method_summaries,
    })
}

fn new_script_state(
    id: &TypeId,
    template_vars: &[ast::Argument],
    funcs: &[ast::FuncDef],
    contract_table: &HashMap<TypeId, ContractInfo>,
    options: &CompilerOptions,
) -> Result<CompilerState> {
    let mut state = CompilerState::new(id.clone(), contract_table.clone(), options.clone());
    for template in template_vars {
        state.add_template_variable(
            template.ident.clone(),
            template.ty.clone(),
            template.is_unused,
        )?;
    }
    if funcs.len() > 256 {
        return Err(CompileError::TooManySlots {
            owner: id.to_string(),
        });
    }
    let infos: Vec<FuncInfo> = funcs
        .iter()
        .enumerate()
        .map(|(index, func)| FuncInfo::from_def(func, index as u8))
        .collect();
    state.set_funcs(infos);
    Ok(state)
}

fn compile_script(
    script: &ast::TxScript,
    contract_table: &HashMap<TypeId, ContractInfo>,
    options: &CompilerOptions,
) -> Result<CompiledScript> {
    log::debug!("compiling tx script {}", script.id);
    let mut state = new_script_state(
        &script.id,
        &script.template_vars,
        &script.funcs,
        contract_table,
        options,
    )?;
    for func in &script.funcs {
        typecheck::check_func(func, &mut state)?;
    }

    state.start_codegen();
    let methods = gen_methods(&script.funcs, &mut state)?;
    let debug_script = StatefulScript::from_methods(methods).map_err(|_| {
        CompileError::InvalidTxScriptMethods {
            script: script.id.to_string(),
        }
    })?;

    analysis::check_external_calls(&state)?;
    analysis::unused_private_functions(&script.funcs, &mut state);

    let release = if debug_script.has_debug_code() {
        state.allow_debug = false;
        StatefulScript::from_methods(gen_methods(&script.funcs, &mut state)?).map_err(|_| {
            CompileError::InvalidTxScriptMethods {
                script: script.id.to_string(),
            }
        })?
    } else {
        debug_script.clone()
    };

    Ok(CompiledScript {
        script: release,
        debug_script,
        ast: script.clone(),
        warnings: state.warnings.clone(),
    })
}

fn compile_asset_script(
    script: &ast::AssetScript,
    contract_table: &HashMap<TypeId, ContractInfo>,
    options: &CompilerOptions,
) -> Result<CompiledAssetScript> {
    log::debug!("compiling asset script {}", script.id);
    let mut state = new_script_state(
        &script.id,
        &script.template_vars,
        &script.funcs,
        contract_table,
        options,
    )?;
    for func in &script.funcs {
        typecheck::check_func(func, &mut state)?;
    }

    state.start_codegen();
    let debug_script = StatelessScript {
        methods: gen_methods(&script.funcs, &mut state)?,
    };

    analysis::check_external_calls(&state)?;
    analysis::unused_private_functions(&script.funcs, &mut state);

    let release = if debug_script.has_debug_code() {
        state.allow_debug = false;
        StatelessScript {
            methods: gen_methods(&script.funcs, &mut state)?,
        }
    } else {
        debug_script.clone()
    };

    Ok(CompiledAssetScript {
        script: release,
        debug_script,
        ast: script.clone(),
        warnings: state.warnings.clone(),
    })
}
