// Warning analyses: the check-external-caller fixed point, update-fields
// agreement, unused code sweeps and the option flags that silence them.

mod common;

use common::*;
use quill_ast::ContractUnit;
use quill_compiler::{compile_project, CompileError, CompilerOptions};
use quill_vm::Type;

fn vault() -> ContractUnit {
    // guard() seeds the external-caller table; set() inherits the mark
    // through the call graph; reset() stays unprotected.
    let guard = func(
        "guard",
        false,
        vec![],
        vec![],
        vec![builtin_stmt("checkCaller", vec![boolean(true), u256(0)])],
    );
    let mut set = func(
        "set",
        true,
        vec![arg("v", Type::U256)],
        vec![],
        vec![call_stmt("guard", vec![]), assign("total", var("v"))],
    );
    set.use_update_fields = true;
    let mut reset = func("reset", true, vec![], vec![], vec![assign("total", u256(0))]);
    reset.use_update_fields = true;

    contract(
        "Vault",
        vec![field("total", Type::U256, true)],
        vec![guard, set, reset],
    )
}

#[test]
fn check_caller_marks_propagate_to_callers() {
    let compiled = compile(&[vault()]);
    let c = contract_of(&compiled[0]);
    assert_eq!(c.warnings.len(), 1);
    assert!(c.warnings[0].message.contains("Vault.reset"));
    assert!(c.warnings[0].message.contains("external caller"));
}

#[test]
fn check_caller_warnings_can_be_silenced() {
    let options = CompilerOptions {
        ignore_check_external_caller_warnings: true,
        ..CompilerOptions::default()
    };
    let compiled = compile_project(&[vault()], &options).unwrap();
    assert!(contract_of(&compiled[0]).warnings.is_empty());
}

#[test]
fn external_caller_analysis_is_a_fixed_point() {
    let first = compile(&[vault()]);
    let second = compile(&[vault()]);
    assert_eq!(
        contract_of(&first[0]).warnings,
        contract_of(&second[0]).warnings
    );
}

#[test]
fn update_fields_attribute_must_agree_with_writes() {
    let touch = func("touch", true, vec![], vec![], vec![assign("total", u256(1))]);
    let mut noop = func("noop", true, vec![], vec![], vec![]);
    noop.use_update_fields = true;

    let units = vec![contract(
        "C",
        vec![field("total", Type::U256, true)],
        vec![touch, noop],
    )];
    let options = CompilerOptions {
        ignore_check_external_caller_warnings: true,
        ..CompilerOptions::default()
    };
    let compiled = compile_project(&units, &options).unwrap();
    let warnings = contract_of(&compiled[0]).warnings.clone();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].message.contains("C.touch updates fields"));
    assert!(warnings[1].message.contains("C.noop does not update fields"));
}

#[test]
fn unused_locals_and_fields_warn_in_stable_order() {
    let units = vec![contract(
        "C",
        vec![field("ghost", Type::Bool, false)],
        vec![func(
            "f",
            true,
            vec![],
            vec![],
            vec![let_("dead", false, u256(1))],
        )],
    )];
    let compiled = compile(&units);
    let warnings = contract_of(&compiled[0]).warnings.clone();
    assert_eq!(warnings.len(), 2);
    // per-function warnings first, unit-level field sweep last
    assert!(warnings[0].message.contains("unused variables in C: f.dead"));
    assert!(warnings[1].message.contains("unused fields in C: ghost"));

    let options = CompilerOptions {
        ignore_unused_variables_warnings: true,
        ignore_unused_fields_warnings: true,
        ..CompilerOptions::default()
    };
    let compiled = compile_project(&units, &options).unwrap();
    assert!(contract_of(&compiled[0]).warnings.is_empty());
}

#[test]
fn uncalled_private_functions_warn() {
    let units = vec![contract(
        "C",
        vec![],
        vec![
            func("helper", false, vec![], vec![], vec![]),
            func("entry", true, vec![], vec![], vec![]),
        ],
    )];
    let compiled = compile(&units);
    let warnings = contract_of(&compiled[0]).warnings.clone();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0]
        .message
        .contains("unused private functions in C: helper"));

    let options = CompilerOptions {
        ignore_unused_private_functions_warnings: true,
        ..CompilerOptions::default()
    };
    let compiled = compile_project(&units, &options).unwrap();
    assert!(contract_of(&compiled[0]).warnings.is_empty());
}

#[test]
fn unassigned_mutable_locals_are_errors() {
    let units = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![],
            vec![Type::U256],
            vec![let_("x", true, u256(1)), ret(vec![var("x")])],
        )],
    )];
    let err = compile_project(&units, &CompilerOptions::default()).unwrap_err();
    match err {
        CompileError::UnassignedMutableVars { owner, vars } => {
            assert_eq!(owner, "C.f");
            assert_eq!(vars, "x");
        }
        other => panic!("expected UnassignedMutableVars, got {other:?}"),
    }
}

#[test]
fn writes_to_immutable_targets_are_errors() {
    let units = vec![contract(
        "C",
        vec![field("x", Type::U256, false)],
        vec![func("f", true, vec![], vec![], vec![assign("x", u256(1))])],
    )];
    let err = compile_project(&units, &CompilerOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::ImmutableAssignment { .. }));
}

#[test]
fn undefined_identifiers_suggest_close_names() {
    let units = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![arg("amount", Type::U256)],
            vec![Type::U256],
            vec![ret(vec![var("amonut")])],
        )],
    )];
    let err = compile_project(&units, &CompilerOptions::default()).unwrap_err();
    match &err {
        CompileError::UndefinedIdentifier { name, help } => {
            assert_eq!(name, "amonut");
            assert_eq!(help.as_deref(), Some("did you mean \"amount\"?"));
        }
        other => panic!("expected UndefinedIdentifier, got {other:?}"),
    }
    assert!(err.render().contains("amonut"));
}

#[test]
fn condition_types_are_enforced() {
    let units = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![],
            vec![],
            vec![if_else(u256(1), vec![], None)],
        )],
    )];
    let err = compile_project(&units, &CompilerOptions::default()).unwrap_err();
    match err {
        CompileError::InvalidCondition { found } => assert_eq!(found, "(U256)"),
        other => panic!("expected InvalidCondition, got {other:?}"),
    }
}

#[test]
fn heterogeneous_arrays_are_rejected() {
    let units = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![],
            vec![],
            vec![let_("a", false, array(vec![u256(1), boolean(true)]))],
        )],
    )];
    let err = compile_project(&units, &CompilerOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::HeterogeneousArray { .. }));
}

#[test]
fn array_indexes_must_be_constant_and_in_range() {
    let out_of_range = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![],
            vec![Type::U256],
            vec![
                let_("a", false, array(vec![u256(1), u256(2)])),
                ret(vec![index(var("a"), vec![u256(2)])]),
            ],
        )],
    )];
    let err = compile_project(&out_of_range, &CompilerOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::ArrayIndexOutOfRange { .. }));

    let dynamic = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![arg("i", Type::U256)],
            vec![Type::U256],
            vec![
                let_("a", false, array(vec![u256(1), u256(2)])),
                ret(vec![index(var("a"), vec![var("i")])]),
            ],
        )],
    )];
    let err = compile_project(&dynamic, &CompilerOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::InvalidArrayIndex { .. }));
}

#[test]
fn return_types_are_checked_against_the_signature() {
    let units = vec![contract(
        "C",
        vec![],
        vec![func(
            "f",
            true,
            vec![],
            vec![Type::U256],
            vec![ret(vec![boolean(true)])],
        )],
    )];
    let err = compile_project(&units, &CompilerOptions::default()).unwrap_err();
    match err {
        CompileError::ReturnTypeMismatch {
            func,
            expected,
            found,
        } => {
            assert_eq!(func, "f");
            assert_eq!(expected, "(U256)");
            assert_eq!(found, "(Bool)");
        }
        other => panic!("expected ReturnTypeMismatch, got {other:?}"),
    }
}
