// Inheritance resolution: closure computation with cycle detection, the
// interface-chain rules, std-interface-id validation and definition
// merging. The result of flattening is a self-contained contract with no
// remaining references to its parents.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::Bytes;
use quill_ast::{
    Argument, ConstantVarDef, Contract, ContractUnit, EnumDef, EventDef, FuncDef, Ident,
    Inheritance, Interface,
};
use quill_diagnostics::{CompileError, Result};
use quill_vm::TypeId;
use serde::{Deserialize, Serialize};

/// Fixed ASCII prefix of every materialized std interface id.
pub const STD_ID_PREFIX: &[u8] = b"ALPH";

/// Name of the synthetic field holding the std interface id.
pub const STD_ID_FIELD: &str = "__stdInterfaceId";

/// All units of a project, indexed by name. Unit names are unique.
#[derive(Debug)]
pub struct UnitTable<'a> {
    units: &'a [ContractUnit],
    by_name: HashMap<&'a str, &'a ContractUnit>,
}

impl<'a> UnitTable<'a> {
    pub fn new(units: &'a [ContractUnit]) -> Result<Self> {
        let mut by_name = HashMap::new();
        for unit in units {
            if by_name.insert(unit.id().name(), unit).is_some() {
                return Err(CompileError::DuplicateDefinition {
                    name: unit.id().name().to_string(),
                });
            }
        }
        Ok(Self { units, by_name })
    }

    pub fn units(&self) -> &'a [ContractUnit] {
        self.units
    }

    pub fn get(&self, id: &TypeId) -> Result<&'a ContractUnit> {
        self.by_name
            .get(id.name())
            .copied()
            .ok_or_else(|| CompileError::UndefinedContract {
                name: id.to_string(),
            })
    }
}

/// Computes and memoizes inheritance closures via DFS; detects cycles and
/// validates every inheritance clause on first visit.
pub struct InheritanceResolver<'a> {
    table: UnitTable<'a>,
    parents: HashMap<String, Vec<TypeId>>,
}

impl<'a> InheritanceResolver<'a> {
    pub fn new(table: UnitTable<'a>) -> Self {
        Self {
            table,
            parents: HashMap::new(),
        }
    }

    pub fn unit(&self, id: &TypeId) -> Result<&'a ContractUnit> {
        self.table.get(id)
    }

    pub fn units(&self) -> &'a [ContractUnit] {
        self.table.units()
    }

    /// The full inheritance closure of a unit, parents before children,
    /// deduplicated in first-encounter order.
    pub fn parents(&mut self, id: &TypeId) -> Result<Vec<TypeId>> {
        let mut visiting = Vec::new();
        self.closure(id, &mut visiting)
    }

    fn closure(&mut self, id: &TypeId, visiting: &mut Vec<String>) -> Result<Vec<TypeId>> {
        if let Some(cached) = self.parents.get(id.name()) {
            return Ok(cached.clone());
        }
        if visiting.iter().any(|name| name == id.name()) {
            return Err(CompileError::CyclicInheritance {
                name: id.to_string(),
            });
        }
        visiting.push(id.name().to_string());

        let unit = self.table.get(id)?;
        let mut result: Vec<TypeId> = Vec::new();
        for inheritance in unit.inheritances() {
            let parent_id = inheritance.parent();
            let parent = self.table.get(parent_id)?;
            if !parent.is_inheritable() {
                return Err(CompileError::NotInheritable {
                    name: parent_id.to_string(),
                });
            }
            validate_inheritance_kinds(unit, inheritance, parent)?;
            let grand = self.closure(parent_id, visiting)?;
            for candidate in grand.into_iter().chain([parent_id.clone()]) {
                if !result.contains(&candidate) {
                    result.push(candidate);
                }
            }
        }

        visiting.pop();
        self.parents.insert(id.name().to_string(), result.clone());
        Ok(result)
    }
}

fn validate_inheritance_kinds(
    child: &ContractUnit,
    inheritance: &Inheritance,
    parent: &ContractUnit,
) -> Result<()> {
    match (inheritance, parent) {
        (Inheritance::Contract { idents, .. }, ContractUnit::Contract(parent_contract)) => {
            match child {
                ContractUnit::Contract(child_contract) => {
                    check_inherited_fields(child_contract, parent_contract, idents)
                }
                _ => Err(CompileError::NotInheritable {
                    name: parent_contract.id.to_string(),
                }),
            }
        }
        (Inheritance::Interface { .. }, ContractUnit::Interface(_)) => Ok(()),
        _ => Err(CompileError::NotInheritable {
            name: parent.id().to_string(),
        }),
    }
}

/// The idents listed in `extends Parent(a, b, ...)` must cover the
/// parent's whole field list, and the child must declare each of them
/// with the parent's exact type and mutability.
fn check_inherited_fields(child: &Contract, parent: &Contract, idents: &[Ident]) -> Result<()> {
    let mismatch = || CompileError::InheritanceFieldsMismatch {
        child: child.id.to_string(),
        parent: parent.id.to_string(),
    };
    if idents.len() != parent.fields.len() {
        return Err(mismatch());
    }
    for (ident, parent_field) in idents.iter().zip(&parent.fields) {
        let child_field = child
            .fields
            .iter()
            .find(|field| &field.ident == ident)
            .ok_or_else(mismatch)?;
        if child_field.ty != parent_field.ty || child_field.is_mutable != parent_field.is_mutable
        {
            return Err(mismatch());
        }
    }
    Ok(())
}

/// A contract with every inherited definition merged in; the input of the
/// per-unit check and emit passes, and the `ast` of the compiled output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedContract {
    pub id: TypeId,
    pub is_abstract: bool,
    pub std_id: Option<Bytes>,
    pub has_std_id_field: bool,
    pub template_vars: Vec<Argument>,
    pub fields: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
    pub events: Vec<EventDef>,
    pub constants: Vec<ConstantVarDef>,
    pub enums: Vec<EnumDef>,
}

/// An interface with its inherited functions and events merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedInterface {
    pub id: TypeId,
    pub std_id: Option<Bytes>,
    pub funcs: Vec<FuncDef>,
    pub events: Vec<EventDef>,
}

/// Sort inherited interfaces by closure size ascending and require a
/// strict single chain: every element must inherit from its predecessor.
fn sorted_interface_chain<'a>(
    resolver: &mut InheritanceResolver<'a>,
    interfaces: Vec<&'a Interface>,
) -> Result<Vec<&'a Interface>> {
    let mut sized = Vec::with_capacity(interfaces.len());
    for interface in interfaces {
        let size = resolver.parents(&interface.id)?.len();
        sized.push((size, interface));
    }
    sized.sort_by_key(|(size, _)| *size);
    let chain: Vec<&Interface> = sized.into_iter().map(|(_, interface)| interface).collect();
    for pair in chain.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        let upper_parents = resolver.parents(&upper.id)?;
        if !upper_parents.contains(&lower.id) {
            let names: Vec<&str> = chain.iter().map(|i| i.id.name()).collect();
            return Err(CompileError::InterfaceNotChained {
                interfaces: names.join(", "),
            });
        }
    }
    Ok(chain)
}

/// Walk the chain's std ids: each declared id must strictly extend its
/// predecessor's byte prefix. The deepest id wins.
fn resolve_std_id(chain: &[&Interface]) -> Result<Option<Bytes>> {
    let mut current: Option<(&Bytes, &TypeId)> = None;
    for interface in chain {
        if let Some(raw) = &interface.std_id {
            if let Some((prev_raw, prev_id)) = current {
                let extends = raw.len() > prev_raw.len() && raw.starts_with(prev_raw);
                if !extends {
                    return Err(CompileError::InvalidStdInterfaceId {
                        child: interface.id.to_string(),
                        parent: prev_id.to_string(),
                    });
                }
            }
            current = Some((raw, &interface.id));
        }
    }
    Ok(current.map(|(raw, _)| Bytes::from([STD_ID_PREFIX, raw.as_ref()].concat())))
}

fn push_unique_event(events: &mut Vec<EventDef>, event: &EventDef) -> Result<()> {
    if events.iter().any(|existing| existing.id == event.id) {
        return Err(CompileError::DuplicateDefinition {
            name: event.id.to_string(),
        });
    }
    events.push(event.clone());
    Ok(())
}

fn merge_enum(enums: &mut Vec<EnumDef>, incoming: &EnumDef) -> Result<()> {
    let member_type = |def: &EnumDef| def.fields.first().map(|f| f.value.ty());
    if let Some(existing) = enums.iter_mut().find(|def| def.id == incoming.id) {
        let expected = member_type(existing);
        for field in &incoming.fields {
            if existing.fields.iter().any(|f| f.ident == field.ident) {
                return Err(CompileError::DuplicateDefinition {
                    name: format!("{}.{}", incoming.id, field.ident),
                });
            }
            if expected.as_ref().is_some_and(|ty| *ty != field.value.ty()) {
                return Err(CompileError::Other(format!(
                    "members of enum {} must share one type",
                    incoming.id
                )));
            }
            existing.fields.push(field.clone());
        }
    } else {
        if let Some(first) = member_type(incoming) {
            if incoming.fields.iter().any(|f| f.value.ty() != first) {
                return Err(CompileError::Other(format!(
                    "members of enum {} must share one type",
                    incoming.id
                )));
            }
        }
        enums.push(incoming.clone());
    }
    Ok(())
}

/// Merge the definitions of all parents plus the contract itself.
///
/// Functions are ordered interface-first: the abstract slots keep their
/// chain position and are replaced by their implementations; concrete
/// functions that implement nothing follow in parents-then-self order.
pub fn flatten_contract(
    contract: &Contract,
    resolver: &mut InheritanceResolver<'_>,
) -> Result<FlattenedContract> {
    let parent_ids = resolver.parents(&contract.id)?;
    let mut contract_parents = Vec::new();
    let mut interface_parents = Vec::new();
    for parent_id in &parent_ids {
        match resolver.unit(parent_id)? {
            ContractUnit::Contract(parent) => contract_parents.push(parent),
            ContractUnit::Interface(parent) => interface_parents.push(parent),
            other => {
                return Err(CompileError::NotInheritable {
                    name: other.id().to_string(),
                })
            }
        }
    }

    let chain = sorted_interface_chain(resolver, interface_parents)?;
    let std_id = resolve_std_id(&chain)?;

    // all explicit stdIdEnabled settings along the chain must agree
    let mut std_id_enabled: Option<bool> = None;
    for candidate in contract_parents.iter().copied().chain([contract]) {
        if let Some(flag) = candidate.std_id_enabled {
            match std_id_enabled {
                Some(previous) if previous != flag => {
                    return Err(CompileError::StdIdEnabledConflict {
                        contract: contract.id.to_string(),
                    })
                }
                _ => std_id_enabled = Some(flag),
            }
        }
    }
    let has_std_id_field = std_id.is_some() && std_id_enabled.unwrap_or(true);

    // partition functions into abstract and concrete
    let mut abstract_funcs: Vec<FuncDef> = Vec::new();
    for interface in &chain {
        for func in &interface.funcs {
            if func.body.is_some() {
                return Err(CompileError::FuncBodyInInterface {
                    interface: interface.id.to_string(),
                    func: func.id.name.clone(),
                });
            }
            if abstract_funcs.iter().any(|f| f.id.name == func.id.name) {
                return Err(CompileError::DuplicateDefinition {
                    name: func.id.name.clone(),
                });
            }
            abstract_funcs.push(func.clone());
        }
    }
    let mut concrete_funcs: Vec<FuncDef> = Vec::new();
    for candidate in contract_parents.iter().copied().chain([contract]) {
        for func in &candidate.funcs {
            if func.body.is_none() {
                if abstract_funcs.iter().any(|f| f.id.name == func.id.name) {
                    return Err(CompileError::DuplicateDefinition {
                        name: func.id.name.clone(),
                    });
                }
                abstract_funcs.push(func.clone());
            } else {
                if concrete_funcs.iter().any(|f| f.id.name == func.id.name) {
                    return Err(CompileError::DuplicateDefinition {
                        name: func.id.name.clone(),
                    });
                }
                concrete_funcs.push(func.clone());
            }
        }
    }

    let mut funcs: Vec<FuncDef> = Vec::new();
    let mut implemented = BTreeSet::new();
    let mut unimplemented = Vec::new();
    for abstract_func in &abstract_funcs {
        match concrete_funcs
            .iter()
            .find(|f| f.id.name == abstract_func.id.name)
        {
            Some(implementation) => {
                if implementation.signature() != abstract_func.signature() {
                    return Err(CompileError::SignatureMismatch {
                        func: abstract_func.id.name.clone(),
                        expected: abstract_func.signature(),
                        found: implementation.signature(),
                    });
                }
                implemented.insert(implementation.id.name.clone());
                funcs.push(implementation.clone());
            }
            None => {
                unimplemented.push(abstract_func.id.name.clone());
                funcs.push(abstract_func.clone());
            }
        }
    }
    if !contract.is_abstract && !unimplemented.is_empty() {
        return Err(CompileError::UnimplementedMethods {
            contract: contract.id.to_string(),
            funcs: unimplemented.join(", "),
        });
    }
    for func in concrete_funcs {
        if !implemented.contains(&func.id.name) {
            funcs.push(func);
        }
    }
    if funcs.len() > 256 {
        return Err(CompileError::TooManySlots {
            owner: contract.id.to_string(),
        });
    }

    // events: interfaces first, then contracts
    let mut events = Vec::new();
    for interface in &chain {
        for event in &interface.events {
            push_unique_event(&mut events, event)?;
        }
    }
    for candidate in contract_parents.iter().copied().chain([contract]) {
        for event in &candidate.events {
            push_unique_event(&mut events, event)?;
        }
    }

    let mut constants = Vec::new();
    let mut enums = Vec::new();
    for candidate in contract_parents.iter().copied().chain([contract]) {
        constants.extend(candidate.constants.iter().cloned());
        for enum_def in &candidate.enums {
            merge_enum(&mut enums, enum_def)?;
        }
    }

    Ok(FlattenedContract {
        id: contract.id.clone(),
        is_abstract: contract.is_abstract,
        std_id,
        has_std_id_field,
        template_vars: contract.template_vars.clone(),
        fields: contract.fields.clone(),
        funcs,
        events,
        constants,
        enums,
    })
}

/// Merge an interface with its own inheritance chain, for the project's
/// function table.
pub fn flatten_interface(
    interface: &Interface,
    resolver: &mut InheritanceResolver<'_>,
) -> Result<FlattenedInterface> {
    let parent_ids = resolver.parents(&interface.id)?;
    let mut parents = Vec::new();
    for parent_id in &parent_ids {
        match resolver.unit(parent_id)? {
            ContractUnit::Interface(parent) => parents.push(parent),
            other => {
                return Err(CompileError::NotInheritable {
                    name: other.id().to_string(),
                })
            }
        }
    }
    let chain = sorted_interface_chain(resolver, parents)?;

    let mut funcs: Vec<FuncDef> = Vec::new();
    let mut events = Vec::new();
    for member in chain.iter().copied().chain([interface]) {
        for func in &member.funcs {
            if func.body.is_some() {
                return Err(CompileError::FuncBodyInInterface {
                    interface: member.id.to_string(),
                    func: func.id.name.clone(),
                });
            }
            if funcs.iter().any(|f| f.id.name == func.id.name) {
                return Err(CompileError::DuplicateDefinition {
                    name: func.id.name.clone(),
                });
            }
            funcs.push(func.clone());
        }
        for event in &member.events {
            push_unique_event(&mut events, event)?;
        }
    }

    let full_chain: Vec<&Interface> = chain.iter().copied().chain([interface]).collect();
    let std_id = resolve_std_id(&full_chain)?;

    Ok(FlattenedInterface {
        id: interface.id.clone(),
        std_id,
        funcs,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::FuncId;
    use quill_vm::Type;

    fn interface(name: &str, std_id: Option<&[u8]>, parents: &[&str]) -> ContractUnit {
        ContractUnit::Interface(Interface {
            id: TypeId::new(name),
            std_id: std_id.map(|bytes| Bytes::from(bytes.to_vec())),
            funcs: vec![],
            events: vec![],
            inheritances: parents
                .iter()
                .map(|parent| Inheritance::Interface {
                    parent: TypeId::new(*parent),
                })
                .collect(),
        })
    }

    fn abstract_fn(name: &str) -> FuncDef {
        FuncDef {
            id: FuncId::new(name),
            is_public: true,
            use_preapproved_assets: false,
            use_contract_assets: false,
            use_update_fields: false,
            use_check_external_caller: true,
            args: vec![],
            rtypes: vec![Type::U256],
            body: None,
        }
    }

    fn resolver(units: &[ContractUnit]) -> InheritanceResolver<'_> {
        InheritanceResolver::new(UnitTable::new(units).unwrap())
    }

    #[test]
    fn duplicate_unit_names_are_rejected() {
        let units = vec![interface("A", None, &[]), interface("A", None, &[])];
        let err = UnitTable::new(&units).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateDefinition { .. }));
    }

    #[test]
    fn closure_is_parents_before_children() {
        let units = vec![
            interface("A", None, &[]),
            interface("B", None, &["A"]),
            interface("C", None, &["B"]),
        ];
        let mut resolver = resolver(&units);
        let parents = resolver.parents(&TypeId::new("C")).unwrap();
        assert_eq!(parents, vec![TypeId::new("A"), TypeId::new("B")]);
    }

    #[test]
    fn cycles_are_detected() {
        let units = vec![interface("A", None, &["B"]), interface("B", None, &["A"])];
        let mut resolver = resolver(&units);
        let err = resolver.parents(&TypeId::new("A")).unwrap_err();
        match err {
            CompileError::CyclicInheritance { name } => {
                assert!(name == "A" || name == "B");
            }
            other => panic!("expected CyclicInheritance, got {other:?}"),
        }
    }

    #[test]
    fn std_ids_must_strictly_extend_along_the_chain() {
        let units = vec![
            interface("Base", Some(b"\x00\x01"), &[]),
            interface("Child", Some(b"\x00\x01\x02"), &["Base"]),
        ];
        let mut r = resolver(&units);
        let flat = match r.unit(&TypeId::new("Child")).unwrap() {
            ContractUnit::Interface(i) => flatten_interface(i, &mut r).unwrap(),
            _ => unreachable!(),
        };
        assert_eq!(
            flat.std_id,
            Some(Bytes::from(b"ALPH\x00\x01\x02".to_vec()))
        );

        // same id as the parent: no strict extension
        let units = vec![
            interface("Base", Some(b"\x00\x01"), &[]),
            interface("Child", Some(b"\x00\x01"), &["Base"]),
        ];
        let mut r = resolver(&units);
        let err = match r.unit(&TypeId::new("Child")).unwrap() {
            ContractUnit::Interface(i) => flatten_interface(i, &mut r).unwrap_err(),
            _ => unreachable!(),
        };
        assert!(matches!(err, CompileError::InvalidStdInterfaceId { .. }));
    }

    #[test]
    fn unchained_interfaces_are_rejected() {
        let mut base_a = interface("A", None, &[]);
        if let ContractUnit::Interface(i) = &mut base_a {
            i.funcs.push(abstract_fn("a"));
        }
        let mut base_b = interface("B", None, &[]);
        if let ContractUnit::Interface(i) = &mut base_b {
            i.funcs.push(abstract_fn("b"));
        }
        let child = interface("C", None, &["A", "B"]);
        let units = vec![base_a, base_b, child];
        let mut r = resolver(&units);
        let err = match r.unit(&TypeId::new("C")).unwrap() {
            ContractUnit::Interface(i) => flatten_interface(i, &mut r).unwrap_err(),
            _ => unreachable!(),
        };
        assert!(matches!(err, CompileError::InterfaceNotChained { .. }));
    }

    #[test]
    fn enum_merge_rejects_member_collisions() {
        use quill_ast::{EnumField, Val};
        let mut enums = vec![EnumDef {
            id: TypeId::new("Color"),
            fields: vec![EnumField {
                ident: Ident::new("Red"),
                value: Val::u256(0),
            }],
        }];
        let incoming = EnumDef {
            id: TypeId::new("Color"),
            fields: vec![EnumField {
                ident: Ident::new("Red"),
                value: Val::u256(1),
            }],
        };
        let err = merge_enum(&mut enums, &incoming).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateDefinition { .. }));

        let ok = EnumDef {
            id: TypeId::new("Color"),
            fields: vec![EnumField {
                ident: Ident::new("Blue"),
                value: Val::u256(1),
            }],
        };
        merge_enum(&mut enums, &ok).unwrap();
        assert_eq!(enums[0].fields.len(), 2);
    }
}
