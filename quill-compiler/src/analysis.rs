// Post-emission static analyses: external-call resolution, the
// check-external-caller table with its fixed-point propagation, the
// update-fields agreement warnings and the unused-private-function sweep.

use std::collections::{BTreeMap, BTreeSet};

use quill_ast::FuncDef;
use quill_diagnostics::Result;
use quill_vm::TypeId;
use serde::{Deserialize, Serialize};

use crate::state::CompilerState;

/// Per-method metadata surfaced on the compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub name: String,
    pub is_public: bool,
    /// A simple view reads state only: no field updates, no asset usage,
    /// no interface calls, no migration.
    pub is_simple_view: bool,
}

pub fn method_summaries(funcs: &[FuncDef], state: &CompilerState) -> Vec<MethodSummary> {
    funcs
        .iter()
        .map(|func| {
            let name = func.id.name.as_str();
            let is_simple_view = !state.funcs_updating_fields.contains(name)
                && !func.use_preapproved_assets
                && !func.use_contract_assets
                && !state.interface_func_calls.contains(name)
                && !state.migrate_calls.contains(name);
            MethodSummary {
                name: name.to_string(),
                is_public: func.is_public,
                is_simple_view,
            }
        })
        .collect()
}

/// Every recorded external call must resolve on the target's flattened
/// function table.
pub fn check_external_calls(state: &CompilerState) -> Result<()> {
    for (contract, func) in &state.external_calls {
        let info = state.get_contract_info(&TypeId::new(contract.clone()))?;
        if !info.funcs.contains_key(func) {
            return Err(quill_diagnostics::CompileError::UndefinedFunction {
                name: format!("{}.{}", contract, func),
                help: None,
            });
        }
    }
    Ok(())
}

/// Build the check-external-caller table and warn about unprotected
/// public functions.
///
/// A function starts marked when it directly calls `checkCaller!` or
/// explicitly opted out via its attribute. Marks then propagate from
/// private functions to their (transitive) callers until a fixed point.
/// Public functions still unmarked afterwards are reported, except simple
/// views, which have nothing to protect.
pub fn check_external_caller_warnings(
    funcs: &[FuncDef],
    summaries: &[MethodSummary],
    state: &mut CompilerState,
) {
    let mut table: BTreeMap<&str, bool> = funcs
        .iter()
        .map(|func| {
            let name = func.id.name.as_str();
            let seeded =
                state.check_caller_calls.contains(name) || !func.use_check_external_caller;
            (name, seeded)
        })
        .collect();
    let private: BTreeSet<&str> = funcs
        .iter()
        .filter(|func| !func.is_public)
        .map(|func| func.id.name.as_str())
        .collect();

    loop {
        let mut changed = false;
        let marked: Vec<&str> = table
            .iter()
            .filter_map(|(name, marked)| marked.then_some(*name))
            .collect();
        for callee in marked {
            if !private.contains(callee) {
                continue;
            }
            if let Some(callers) = state.internal_calls_reversed.get(callee) {
                for caller in callers {
                    if let Some(entry) = table.get_mut(caller.as_str()) {
                        if !*entry {
                            *entry = true;
                            changed = true;
                        }
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    if state.options.ignore_check_external_caller_warnings {
        return;
    }
    let mut messages = Vec::new();
    for func in funcs {
        let name = func.id.name.as_str();
        let is_simple_view = summaries
            .iter()
            .find(|summary| summary.name == name)
            .is_some_and(|summary| summary.is_simple_view);
        let checked = table.get(name).copied().unwrap_or(false);
        if func.is_public && func.use_check_external_caller && !checked && !is_simple_view {
            messages.push(format!(
                "no external caller check for function {}.{}; call checkCaller!(...) or annotate the function with checkExternalCaller = false",
                state.type_id, name
            ));
        }
    }
    for message in messages {
        state.warn(message);
    }
}

/// Field writes and the `updateFields` attribute must agree, in both
/// directions.
pub fn update_fields_warnings(funcs: &[FuncDef], state: &mut CompilerState) {
    if state.options.ignore_update_fields_check_warnings {
        return;
    }
    let mut messages = Vec::new();
    for func in funcs {
        if func.body.is_none() {
            continue;
        }
        let name = func.id.name.as_str();
        let updates = state.funcs_updating_fields.contains(name);
        if updates && !func.use_update_fields {
            messages.push(format!(
                "function {}.{} updates fields; annotate it with updateFields = true",
                state.type_id, name
            ));
        }
        if !updates && func.use_update_fields {
            messages.push(format!(
                "function {}.{} does not update fields; drop updateFields = true",
                state.type_id, name
            ));
        }
    }
    for message in messages {
        state.warn(message);
    }
}

/// Private functions that no emitted call reaches.
pub fn unused_private_functions(funcs: &[FuncDef], state: &mut CompilerState) {
    if state.options.ignore_unused_private_functions_warnings {
        return;
    }
    let mut unused = Vec::new();
    for func in funcs {
        if func.is_public || func.body.is_none() {
            continue;
        }
        let called = state
            .internal_calls_reversed
            .get(func.id.name.as_str())
            .is_some_and(|callers| !callers.is_empty());
        if !called {
            unused.push(func.id.name.clone());
        }
    }
    if !unused.is_empty() {
        let message = format!(
            "found unused private functions in {}: {}",
            state.type_id,
            unused.join(", ")
        );
        state.warn(message);
    }
}
