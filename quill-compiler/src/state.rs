// Per-unit compiler state: scope stack, symbol tables, call graph and
// warning accumulators. One state object lives for one compilation of one
// unit and is discarded afterwards.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::Bytes;
use quill_ast::{self as ast, Ident};
use quill_diagnostics::{CompileError, Result, Warning};
use quill_vm::{Instr, Type, TypeId, Val};

use crate::options::CompilerOptions;
use crate::typecheck;

/// Compilation phase. `type_of` runs in both phases; `emit` requires
/// `CodeGen`, and the call-graph side tables only record during `CodeGen`
/// so that dead subtrees of the check phase contribute nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    CodeGen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarKind {
    Local,
    Field,
    Template,
    Constant(Val),
}

/// A resolved variable entry.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub kind: VarKind,
    pub ty: Type,
    pub is_mutable: bool,
    pub is_unused: bool,
    pub is_generated: bool,
    pub index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Local,
    Field,
    Template,
}

/// A view of a contiguous slot range holding an array value.
#[derive(Debug, Clone)]
pub struct ArrayRef {
    pub kind: RefKind,
    pub base: u8,
    pub ty: Type,
    pub is_mutable: bool,
}

impl ArrayRef {
    fn slot(&self, offset: usize) -> Result<u8> {
        u8::try_from(usize::from(self.base) + offset)
            .map_err(|_| CompileError::Other("variable slot overflow".to_string()))
    }

    /// Load `count` slots starting at `offset`, bottom slot first.
    pub fn load_code(&self, offset: usize, count: usize) -> Result<Vec<Instr>> {
        let mut instrs = Vec::with_capacity(count);
        for i in 0..count {
            let slot = self.slot(offset + i)?;
            instrs.push(match self.kind {
                RefKind::Local => Instr::LoadLocal(slot),
                RefKind::Field => Instr::LoadField(slot),
                RefKind::Template => Instr::LoadTemplate(slot),
            });
        }
        Ok(instrs)
    }

    /// Store `count` slots starting at `offset`; slots are written in
    /// reverse so the topmost stack value lands in the last slot.
    pub fn store_code(&self, offset: usize, count: usize) -> Result<Vec<Instr>> {
        let mut instrs = Vec::with_capacity(count);
        for i in (0..count).rev() {
            let slot = self.slot(offset + i)?;
            instrs.push(match self.kind {
                RefKind::Local => Instr::StoreLocal(slot),
                RefKind::Field => Instr::StoreField(slot),
                RefKind::Template => {
                    return Err(CompileError::Other(
                        "template variables are read-only".to_string(),
                    ))
                }
            });
        }
        Ok(instrs)
    }
}

/// How a function symbol is realized at a call site.
#[derive(Debug, Clone)]
pub enum FuncKind {
    /// A method of the owning unit, at its table index.
    Method { index: u8 },
    /// A compiler-generated static field encoder; emitted inline at the
    /// call site. `std_id` is prepended to the encoded fields if present.
    FieldEncoder { std_id: Option<Bytes> },
}

/// A function symbol-table entry.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: String,
    pub is_public: bool,
    pub is_static: bool,
    pub use_preapproved_assets: bool,
    pub use_contract_assets: bool,
    pub use_update_fields: bool,
    pub use_check_external_caller: bool,
    pub arg_types: Vec<Type>,
    pub return_types: Vec<Type>,
    pub kind: FuncKind,
}

impl FuncInfo {
    pub fn from_def(def: &ast::FuncDef, index: u8) -> Self {
        Self {
            name: def.id.name.clone(),
            is_public: def.is_public,
            is_static: false,
            use_preapproved_assets: def.use_preapproved_assets,
            use_contract_assets: def.use_contract_assets,
            use_update_fields: def.use_update_fields,
            use_check_external_caller: def.use_check_external_caller,
            arg_types: def.args.iter().map(|arg| arg.ty.clone()).collect(),
            return_types: def.rtypes.clone(),
            kind: FuncKind::Method { index },
        }
    }

    pub fn method_index(&self) -> Option<u8> {
        match self.kind {
            FuncKind::Method { index } => Some(index),
            FuncKind::FieldEncoder { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    TxScript,
    AssetScript,
    Contract { is_abstract: bool },
    Interface,
}

impl ContractKind {
    pub fn is_interface(&self) -> bool {
        matches!(self, ContractKind::Interface)
    }
}

/// Project-wide information about one unit, visible to every other unit.
#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub kind: ContractKind,
    pub funcs: HashMap<String, FuncInfo>,
}

#[derive(Debug, Default)]
struct Scope {
    next_local: usize,
    locals: Vec<Ident>,
    emit_temp: usize,
}

pub(crate) fn const_instr(val: &Val) -> Instr {
    match val {
        Val::Bool(true) => Instr::ConstTrue,
        Val::Bool(false) => Instr::ConstFalse,
        Val::I256(n) => Instr::I256Const(*n),
        Val::U256(n) => Instr::U256Const(*n),
        Val::ByteVec(bytes) => Instr::BytesConst(bytes.clone()),
        Val::Address(bytes) => Instr::AddressConst(bytes.clone()),
    }
}

/// Mutable context threaded through checking and code generation of one
/// unit. Symbol lookups, slot allocation, the call graph and warnings all
/// live here; nothing is global.
#[derive(Debug)]
pub struct CompilerState {
    pub type_id: TypeId,
    pub phase: Phase,
    pub allow_debug: bool,
    pub options: CompilerOptions,

    current_scope: Option<String>,
    vars: HashMap<String, VarInfo>,
    scopes: HashMap<String, Scope>,
    fields_order: Vec<Ident>,
    constants_order: Vec<Ident>,
    next_field: usize,
    next_template: usize,

    funcs: Vec<FuncInfo>,
    func_index: HashMap<String, usize>,
    pub contract_table: HashMap<TypeId, ContractInfo>,
    events: Vec<ast::EventDef>,

    accessed: BTreeSet<String>,
    assigned: BTreeSet<String>,
    pub funcs_updating_fields: BTreeSet<String>,
    pub internal_calls: HashMap<String, BTreeSet<String>>,
    pub internal_calls_reversed: HashMap<String, BTreeSet<String>>,
    pub external_calls: BTreeSet<(String, String)>,
    pub interface_func_calls: BTreeSet<String>,
    pub check_caller_calls: BTreeSet<String>,
    pub migrate_calls: BTreeSet<String>,
    pub warnings: Vec<Warning>,
}

impl CompilerState {
    pub fn new(
        type_id: TypeId,
        contract_table: HashMap<TypeId, ContractInfo>,
        options: CompilerOptions,
    ) -> Self {
        Self {
            type_id,
            phase: Phase::Check,
            allow_debug: true,
            options,
            current_scope: None,
            vars: HashMap::new(),
            scopes: HashMap::new(),
            fields_order: Vec::new(),
            constants_order: Vec::new(),
            next_field: 0,
            next_template: 0,
            funcs: Vec::new(),
            func_index: HashMap::new(),
            contract_table,
            events: Vec::new(),
            accessed: BTreeSet::new(),
            assigned: BTreeSet::new(),
            funcs_updating_fields: BTreeSet::new(),
            internal_calls: HashMap::new(),
            internal_calls_reversed: HashMap::new(),
            external_calls: BTreeSet::new(),
            interface_func_calls: BTreeSet::new(),
            check_caller_calls: BTreeSet::new(),
            migrate_calls: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn start_codegen(&mut self) {
        log::debug!("{}: switching to code generation", self.type_id);
        self.phase = Phase::CodeGen;
    }

    // ---- scopes ----

    pub fn set_func_scope(&mut self, name: &str) {
        self.current_scope = Some(name.to_string());
        self.scopes.entry(name.to_string()).or_default();
    }

    pub fn exit_func_scope(&mut self) {
        self.current_scope = None;
    }

    pub fn current_scope_name(&self) -> Option<&str> {
        self.current_scope.as_deref()
    }

    /// Frame size of a function: argument slots plus declared locals plus
    /// generated temporaries.
    pub fn local_slot_count(&self, func: &str) -> usize {
        self.scopes.get(func).map_or(0, |scope| scope.next_local)
    }

    /// Fresh per-function name for a generated spill temporary. The
    /// counter never resets, so a release re-emission allocates its own
    /// temps instead of colliding with the debug pass's slots.
    pub(crate) fn fresh_temp_ident(&mut self) -> Result<Ident> {
        let scope_name = self.require_scope()?;
        let scope = self.scopes.entry(scope_name).or_default();
        let ident = Ident::new(format!("__t{}", scope.emit_temp));
        scope.emit_temp += 1;
        Ok(ident)
    }

    fn require_scope(&self) -> Result<String> {
        self.current_scope
            .clone()
            .ok_or_else(|| CompileError::Other("no active function scope".to_string()))
    }

    // ---- variable tables ----

    fn resolve_key(&self, ident: &Ident) -> Option<String> {
        if let Some(scope) = &self.current_scope {
            let scoped = format!("{}.{}", scope, ident.0);
            if self.vars.contains_key(&scoped) {
                return Some(scoped);
            }
        }
        if self.vars.contains_key(&ident.0) {
            Some(ident.0.clone())
        } else {
            None
        }
    }

    fn visible_names(&self) -> impl Iterator<Item = &str> {
        let scope_prefix = self
            .current_scope
            .as_ref()
            .map(|scope| format!("{}.", scope));
        self.vars.keys().filter_map(move |key| match &scope_prefix {
            Some(prefix) if key.starts_with(prefix.as_str()) => key.get(prefix.len()..),
            _ if !key.contains('.') => Some(key.as_str()),
            _ => None,
        })
    }

    /// Resolve a variable, recording the access. Writes check mutability
    /// and feed the update-fields analysis.
    pub fn get_variable(&mut self, ident: &Ident, is_write: bool) -> Result<VarInfo> {
        let key = self.resolve_key(ident).ok_or_else(|| {
            CompileError::undefined_identifier(&ident.0, self.visible_names())
        })?;
        let info = self
            .vars
            .get(&key)
            .cloned()
            .ok_or_else(|| CompileError::undefined_identifier(&ident.0, std::iter::empty()))?;
        self.accessed.insert(key.clone());
        if is_write {
            let writable = info.is_mutable
                && matches!(info.kind, VarKind::Local | VarKind::Field);
            if !writable {
                return Err(CompileError::ImmutableAssignment {
                    name: ident.0.clone(),
                });
            }
            self.assigned.insert(key);
            if matches!(info.kind, VarKind::Field) {
                if let Some(func) = &self.current_scope {
                    self.funcs_updating_fields.insert(func.clone());
                }
            }
        }
        Ok(info)
    }

    pub fn get_type(&mut self, ident: &Ident) -> Result<Type> {
        Ok(self.get_variable(ident, false)?.ty)
    }

    pub fn add_local_variable(
        &mut self,
        ident: Ident,
        ty: Type,
        is_mutable: bool,
        is_unused: bool,
        is_generated: bool,
    ) -> Result<u8> {
        self.validate_type(&ty)?;
        let scope_name = self.require_scope()?;
        let key = format!("{}.{}", scope_name, ident.0);
        if self.vars.contains_key(&key) {
            return Err(CompileError::DuplicateDefinition {
                name: ident.0.clone(),
            });
        }
        let owner = self.type_id.to_string();
        let scope = self.scopes.entry(scope_name).or_default();
        let end = scope.next_local + ty.flattened_size();
        if end > 256 {
            return Err(CompileError::TooManySlots { owner });
        }
        let index = scope.next_local as u8;
        scope.next_local = end;
        scope.locals.push(ident);
        self.vars.insert(
            key,
            VarInfo {
                kind: VarKind::Local,
                ty,
                is_mutable,
                is_unused,
                is_generated,
                index,
            },
        );
        Ok(index)
    }

    pub fn add_field_variable(
        &mut self,
        ident: Ident,
        ty: Type,
        is_mutable: bool,
        is_unused: bool,
        is_generated: bool,
    ) -> Result<u8> {
        self.validate_type(&ty)?;
        if self.vars.contains_key(&ident.0) {
            return Err(CompileError::DuplicateDefinition {
                name: ident.0.clone(),
            });
        }
        let end = self.next_field + ty.flattened_size();
        if end > 256 {
            return Err(CompileError::TooManySlots {
                owner: self.type_id.to_string(),
            });
        }
        let index = self.next_field as u8;
        self.next_field = end;
        self.fields_order.push(ident.clone());
        self.vars.insert(
            ident.0,
            VarInfo {
                kind: VarKind::Field,
                ty,
                is_mutable,
                is_unused,
                is_generated,
                index,
            },
        );
        Ok(index)
    }

    pub fn add_template_variable(&mut self, ident: Ident, ty: Type, is_unused: bool) -> Result<u8> {
        self.validate_type(&ty)?;
        if self.vars.contains_key(&ident.0) {
            return Err(CompileError::DuplicateDefinition {
                name: ident.0.clone(),
            });
        }
        let end = self.next_template + ty.flattened_size();
        if end > 256 {
            return Err(CompileError::TooManySlots {
                owner: self.type_id.to_string(),
            });
        }
        let index = self.next_template as u8;
        self.next_template = end;
        self.vars.insert(
            ident.0,
            VarInfo {
                kind: VarKind::Template,
                ty,
                is_mutable: false,
                is_unused,
                is_generated: false,
                index,
            },
        );
        Ok(index)
    }

    pub fn add_constant_variable(&mut self, ident: Ident, value: Val) -> Result<()> {
        if self.vars.contains_key(&ident.0) {
            return Err(CompileError::DuplicateDefinition {
                name: ident.0.clone(),
            });
        }
        let ty = value.ty();
        self.constants_order.push(ident.clone());
        self.vars.insert(
            ident.0,
            VarInfo {
                kind: VarKind::Constant(value),
                ty,
                is_mutable: false,
                is_unused: false,
                is_generated: false,
                index: 0,
            },
        );
        Ok(())
    }

    /// Types naming contracts must name known contract or interface units.
    pub fn validate_type(&self, ty: &Type) -> Result<()> {
        match ty {
            Type::Contract(id) => match self.contract_table.get(id) {
                Some(info)
                    if matches!(
                        info.kind,
                        ContractKind::Contract { .. } | ContractKind::Interface
                    ) =>
                {
                    Ok(())
                }
                _ => Err(CompileError::UndefinedContract {
                    name: id.to_string(),
                }),
            },
            Type::FixedArray { elem, .. } => self.validate_type(elem),
            _ => Ok(()),
        }
    }

    // ---- load/store sequences ----

    pub fn gen_load_code(&mut self, ident: &Ident) -> Result<Vec<Instr>> {
        let info = self.get_variable(ident, false)?;
        let count = info.ty.flattened_size();
        match info.kind {
            VarKind::Constant(ref val) => Ok(vec![const_instr(val)]),
            VarKind::Local => ref_of(RefKind::Local, &info).load_code(0, count),
            VarKind::Field => ref_of(RefKind::Field, &info).load_code(0, count),
            VarKind::Template => ref_of(RefKind::Template, &info).load_code(0, count),
        }
    }

    pub fn gen_store_code(&mut self, ident: &Ident) -> Result<Vec<Instr>> {
        let info = self.get_variable(ident, true)?;
        let count = info.ty.flattened_size();
        match info.kind {
            VarKind::Local => ref_of(RefKind::Local, &info).store_code(0, count),
            VarKind::Field => ref_of(RefKind::Field, &info).store_code(0, count),
            // unreachable: get_variable rejects writes to these kinds
            _ => Err(CompileError::ImmutableAssignment {
                name: ident.0.clone(),
            }),
        }
    }

    // ---- arrays ----

    pub fn get_array_ref(&mut self, ident: &Ident) -> Result<ArrayRef> {
        let info = self.get_variable(ident, false)?;
        if !info.ty.is_array_type() {
            return Err(CompileError::ExpectedArrayType {
                found: info.ty.signature(),
            });
        }
        let kind = match info.kind {
            VarKind::Local => RefKind::Local,
            VarKind::Field => RefKind::Field,
            VarKind::Template => RefKind::Template,
            VarKind::Constant(_) => {
                return Err(CompileError::ExpectedArrayType {
                    found: info.ty.signature(),
                })
            }
        };
        Ok(ArrayRef {
            kind,
            base: info.index,
            ty: info.ty,
            is_mutable: info.is_mutable,
        })
    }

    /// Walk `indexes` into an array type, validating each level, and
    /// return the slot offset and the residual element type.
    pub fn element_offset(
        &mut self,
        array_ty: &Type,
        indexes: &[ast::Expr],
    ) -> Result<(usize, Type)> {
        let mut ty = array_ty.clone();
        let mut offset = 0usize;
        for index in indexes {
            let index_types = typecheck::type_of_expr(index, self)?;
            if index_types != [Type::U256] {
                return Err(CompileError::InvalidArrayIndex {
                    found: Type::signatures(&index_types),
                });
            }
            let value = self.constant_index(index)?;
            match ty {
                Type::FixedArray { elem, size } => {
                    if value >= size {
                        return Err(CompileError::ArrayIndexOutOfRange {
                            index: value.to_string(),
                        });
                    }
                    offset += value * elem.flattened_size();
                    ty = *elem;
                }
                _ => {
                    return Err(CompileError::ArrayIndexOutOfRange {
                        index: value.to_string(),
                    })
                }
            }
        }
        Ok((offset, ty))
    }

    /// Element type of an array value after applying `indexes`.
    pub fn get_array_element_type(
        &mut self,
        array_types: &[Type],
        indexes: &[ast::Expr],
    ) -> Result<Vec<Type>> {
        match array_types {
            [ty @ Type::FixedArray { .. }] => {
                let (_, element) = self.element_offset(ty, indexes)?;
                Ok(vec![element])
            }
            other => Err(CompileError::ExpectedArrayType {
                found: Type::signatures(other),
            }),
        }
    }

    fn constant_index(&mut self, index: &ast::Expr) -> Result<usize> {
        match &index.unparenthesized().kind {
            ast::ExprKind::Const(Val::U256(n)) => usize::try_from(*n).map_err(|_| {
                CompileError::ArrayIndexOutOfRange {
                    index: n.to_string(),
                }
            }),
            ast::ExprKind::Variable(ident) => {
                let info = self.get_variable(ident, false)?;
                match info.kind {
                    VarKind::Constant(Val::U256(n)) => usize::try_from(n).map_err(|_| {
                        CompileError::ArrayIndexOutOfRange {
                            index: n.to_string(),
                        }
                    }),
                    _ => Err(CompileError::InvalidArrayIndex {
                        found: ident.to_string(),
                    }),
                }
            }
            ast::ExprKind::EnumFieldSelector { enum_id, field } => {
                let ident = Ident::new(format!("{}.{}", enum_id, field));
                let info = self.get_variable(&ident, false)?;
                match info.kind {
                    VarKind::Constant(Val::U256(n)) => usize::try_from(n).map_err(|_| {
                        CompileError::ArrayIndexOutOfRange {
                            index: n.to_string(),
                        }
                    }),
                    _ => Err(CompileError::InvalidArrayIndex {
                        found: ident.to_string(),
                    }),
                }
            }
            _ => Err(CompileError::InvalidArrayIndex {
                found: "a non-constant expression".to_string(),
            }),
        }
    }

    // ---- functions and events ----

    pub fn set_funcs(&mut self, funcs: Vec<FuncInfo>) {
        self.func_index = funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        self.funcs = funcs;
    }

    pub fn get_func(&self, name: &str) -> Result<FuncInfo> {
        self.func_index
            .get(name)
            .and_then(|&i| self.funcs.get(i))
            .cloned()
            .ok_or_else(|| {
                CompileError::undefined_function(
                    name,
                    self.funcs.iter().map(|f| f.name.as_str()),
                )
            })
    }

    pub fn funcs(&self) -> &[FuncInfo] {
        &self.funcs
    }

    pub fn current_func(&self) -> Option<&FuncInfo> {
        let scope = self.current_scope.as_ref()?;
        self.func_index.get(scope).and_then(|&i| self.funcs.get(i))
    }

    pub fn check_return(&mut self, types: &[Type]) -> Result<()> {
        let func = self
            .current_func()
            .ok_or_else(|| CompileError::Other("return outside of a function".to_string()))?;
        if types != func.return_types.as_slice() {
            return Err(CompileError::ReturnTypeMismatch {
                func: func.name.clone(),
                expected: Type::signatures(&func.return_types),
                found: Type::signatures(types),
            });
        }
        Ok(())
    }

    pub fn check_arguments(&self, args: &[ast::Argument]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for arg in args {
            if !seen.insert(arg.ident.0.as_str()) {
                return Err(CompileError::DuplicateDefinition {
                    name: arg.ident.0.clone(),
                });
            }
            self.validate_type(&arg.ty)?;
        }
        Ok(())
    }

    pub fn get_contract_info(&self, type_id: &TypeId) -> Result<&ContractInfo> {
        self.contract_table
            .get(type_id)
            .ok_or_else(|| CompileError::UndefinedContract {
                name: type_id.to_string(),
            })
    }

    /// Resolve a function on another unit's flattened function table.
    pub fn get_contract_func(&self, type_id: &TypeId, name: &str) -> Result<FuncInfo> {
        let info = self.get_contract_info(type_id)?;
        info.funcs.get(name).cloned().ok_or_else(|| {
            let mut candidates: Vec<&str> = info.funcs.keys().map(String::as_str).collect();
            candidates.sort_unstable();
            CompileError::undefined_function(name, candidates.into_iter())
        })
    }

    pub fn set_events(&mut self, events: Vec<ast::EventDef>) {
        self.events = events;
    }

    /// The event's 0-based position in the contract's event list.
    pub fn event_index(&self, id: &TypeId) -> Result<(usize, ast::EventDef)> {
        self.events
            .iter()
            .position(|event| &event.id == id)
            .map(|i| (i, self.events[i].clone()))
            .ok_or_else(|| CompileError::UndefinedEvent {
                name: id.to_string(),
            })
    }

    // ---- call graph (emit-time only) ----

    pub fn add_internal_call(&mut self, callee: &str) {
        if self.phase != Phase::CodeGen {
            return;
        }
        let Some(caller) = self.current_scope.clone() else {
            return;
        };
        self.internal_calls
            .entry(caller.clone())
            .or_default()
            .insert(callee.to_string());
        self.internal_calls_reversed
            .entry(callee.to_string())
            .or_default()
            .insert(caller);
    }

    pub fn add_external_call(&mut self, type_id: &TypeId, func: &str) {
        if self.phase != Phase::CodeGen {
            return;
        }
        self.external_calls
            .insert((type_id.to_string(), func.to_string()));
    }

    pub fn add_interface_func_call(&mut self) {
        if self.phase != Phase::CodeGen {
            return;
        }
        if let Some(scope) = self.current_scope.clone() {
            self.interface_func_calls.insert(scope);
        }
    }

    pub fn record_check_caller(&mut self) {
        if self.phase != Phase::CodeGen {
            return;
        }
        if let Some(scope) = self.current_scope.clone() {
            self.check_caller_calls.insert(scope);
        }
    }

    pub fn record_migrate(&mut self) {
        if self.phase != Phase::CodeGen {
            return;
        }
        if let Some(scope) = self.current_scope.clone() {
            self.migrate_calls.insert(scope);
        }
    }

    // ---- warnings and post-checks ----

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(Warning::new(message));
    }

    pub fn check_unused_local_vars(&mut self, func: &str) {
        if self.options.ignore_unused_variables_warnings {
            return;
        }
        let mut unused = Vec::new();
        if let Some(scope) = self.scopes.get(func) {
            for ident in &scope.locals {
                let key = format!("{}.{}", func, ident.0);
                if let Some(info) = self.vars.get(&key) {
                    if !info.is_unused && !info.is_generated && !self.accessed.contains(&key) {
                        unused.push(format!("{}.{}", func, ident));
                    }
                }
            }
        }
        if !unused.is_empty() {
            let message = format!(
                "found unused variables in {}: {}",
                self.type_id,
                unused.join(", ")
            );
            self.warn(message);
        }
    }

    pub fn check_unassigned_local_mutable_vars(&self, func: &str) -> Result<()> {
        let mut pending = Vec::new();
        if let Some(scope) = self.scopes.get(func) {
            for ident in &scope.locals {
                let key = format!("{}.{}", func, ident.0);
                if let Some(info) = self.vars.get(&key) {
                    if info.is_mutable && !info.is_generated && !self.assigned.contains(&key) {
                        pending.push(ident.0.clone());
                    }
                }
            }
        }
        if pending.is_empty() {
            Ok(())
        } else {
            Err(CompileError::UnassignedMutableVars {
                owner: format!("{}.{}", self.type_id, func),
                vars: pending.join(", "),
            })
        }
    }

    pub fn check_unused_fields(&mut self) {
        if self.options.ignore_unused_fields_warnings {
            return;
        }
        let mut unused = Vec::new();
        for ident in &self.fields_order {
            if let Some(info) = self.vars.get(&ident.0) {
                if !info.is_unused && !info.is_generated && !self.accessed.contains(&ident.0) {
                    unused.push(ident.0.clone());
                }
            }
        }
        if !unused.is_empty() {
            let message = format!(
                "found unused fields in {}: {}",
                self.type_id,
                unused.join(", ")
            );
            self.warn(message);
        }
    }

    pub fn check_unassigned_mutable_fields(&self) -> Result<()> {
        let mut pending = Vec::new();
        for ident in &self.fields_order {
            if let Some(info) = self.vars.get(&ident.0) {
                if info.is_mutable && !info.is_generated && !self.assigned.contains(&ident.0) {
                    pending.push(ident.0.clone());
                }
            }
        }
        if pending.is_empty() {
            Ok(())
        } else {
            Err(CompileError::UnassignedMutableVars {
                owner: self.type_id.to_string(),
                vars: pending.join(", "),
            })
        }
    }

    pub fn check_unused_constants(&mut self) {
        if self.options.ignore_unused_constants_warnings {
            return;
        }
        let mut unused = Vec::new();
        for ident in &self.constants_order {
            if !self.accessed.contains(&ident.0) {
                unused.push(ident.0.clone());
            }
        }
        if !unused.is_empty() {
            let message = format!(
                "found unused constants in {}: {}",
                self.type_id,
                unused.join(", ")
            );
            self.warn(message);
        }
    }
}

fn ref_of(kind: RefKind, info: &VarInfo) -> ArrayRef {
    ArrayRef {
        kind,
        base: info.index,
        ty: info.ty.clone(),
        is_mutable: info.is_mutable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::Argument;

    fn state() -> CompilerState {
        CompilerState::new(
            TypeId::new("Test"),
            HashMap::new(),
            CompilerOptions::default(),
        )
    }

    #[test]
    fn locals_are_scoped_by_function() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_local_variable(Ident::new("x"), Type::U256, false, false, false)
            .unwrap();
        st.set_func_scope("g");
        // same name, different function
        st.add_local_variable(Ident::new("x"), Type::Bool, false, false, false)
            .unwrap();
        assert_eq!(st.get_type(&Ident::new("x")).unwrap(), Type::Bool);
    }

    #[test]
    fn duplicate_local_is_rejected() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_local_variable(Ident::new("x"), Type::U256, false, false, false)
            .unwrap();
        let err = st
            .add_local_variable(Ident::new("x"), Type::U256, false, false, false)
            .unwrap_err();
        assert!(matches!(err, CompileError::DuplicateDefinition { .. }));
    }

    #[test]
    fn array_locals_take_contiguous_slots() {
        let mut st = state();
        st.set_func_scope("f");
        let a = st
            .add_local_variable(Ident::new("a"), Type::array(Type::U256, 3), true, false, false)
            .unwrap();
        let b = st
            .add_local_variable(Ident::new("b"), Type::U256, false, false, false)
            .unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 3);
        assert_eq!(st.local_slot_count("f"), 4);

        let load = st.gen_load_code(&Ident::new("a")).unwrap();
        assert_eq!(
            load,
            vec![Instr::LoadLocal(0), Instr::LoadLocal(1), Instr::LoadLocal(2)]
        );
        let store = st.gen_store_code(&Ident::new("a")).unwrap();
        assert_eq!(
            store,
            vec![Instr::StoreLocal(2), Instr::StoreLocal(1), Instr::StoreLocal(0)]
        );
    }

    #[test]
    fn writes_to_immutable_variables_fail() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_local_variable(Ident::new("x"), Type::U256, false, false, false)
            .unwrap();
        let err = st.get_variable(&Ident::new("x"), true).unwrap_err();
        assert!(matches!(err, CompileError::ImmutableAssignment { .. }));
    }

    #[test]
    fn undefined_identifier_suggests_a_close_name() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_local_variable(Ident::new("amount"), Type::U256, false, false, false)
            .unwrap();
        let err = st.get_variable(&Ident::new("amonut"), false).unwrap_err();
        assert_eq!(err.help(), Some("did you mean \"amount\"?"));
    }

    #[test]
    fn constant_loads_use_const_instructions() {
        let mut st = state();
        st.add_constant_variable(Ident::new("MAX"), Val::u256(10)).unwrap();
        st.set_func_scope("f");
        assert_eq!(
            st.gen_load_code(&Ident::new("MAX")).unwrap(),
            vec![Instr::u256_const(10)]
        );
    }

    #[test]
    fn element_offset_resolves_nested_indexes() {
        let mut st = state();
        st.set_func_scope("f");
        let ty = Type::array(Type::array(Type::U256, 3), 2);
        let indexes = vec![
            ast::Expr::const_val(Val::u256(1)),
            ast::Expr::const_val(Val::u256(2)),
        ];
        let (offset, element) = st.element_offset(&ty, &indexes).unwrap();
        assert_eq!(offset, 5);
        assert_eq!(element, Type::U256);
    }

    #[test]
    fn overindexing_is_out_of_range() {
        let mut st = state();
        st.set_func_scope("f");
        let ty = Type::array(Type::U256, 3);
        let err = st
            .element_offset(&ty, &[ast::Expr::const_val(Val::u256(3))])
            .unwrap_err();
        assert!(matches!(err, CompileError::ArrayIndexOutOfRange { .. }));

        // indexing past the last array level
        let err = st
            .element_offset(
                &ty,
                &[
                    ast::Expr::const_val(Val::u256(0)),
                    ast::Expr::const_val(Val::u256(0)),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, CompileError::ArrayIndexOutOfRange { .. }));
    }

    #[test]
    fn non_constant_index_is_rejected() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_local_variable(Ident::new("i"), Type::U256, false, false, false)
            .unwrap();
        let ty = Type::array(Type::U256, 3);
        let err = st
            .element_offset(&ty, &[ast::Expr::variable("i")])
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidArrayIndex { .. }));
    }

    #[test]
    fn call_graph_records_only_during_codegen() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_internal_call("g");
        assert!(st.internal_calls.is_empty());
        st.start_codegen();
        st.set_func_scope("f");
        st.add_internal_call("g");
        assert!(st.internal_calls["f"].contains("g"));
        assert!(st.internal_calls_reversed["g"].contains("f"));
    }

    #[test]
    fn unused_locals_warn_once_per_function() {
        let mut st = state();
        st.set_func_scope("f");
        st.add_local_variable(Ident::new("x"), Type::U256, false, false, false)
            .unwrap();
        st.add_local_variable(Ident::new("y"), Type::U256, false, true, false)
            .unwrap();
        st.check_unused_local_vars("f");
        assert_eq!(st.warnings.len(), 1);
        assert!(st.warnings[0].message.contains("f.x"));
        assert!(!st.warnings[0].message.contains("f.y"));
    }

    #[test]
    fn unassigned_mutable_field_is_an_error() {
        let mut st = state();
        st.add_field_variable(Ident::new("total"), Type::U256, true, false, false)
            .unwrap();
        let err = st.check_unassigned_mutable_fields().unwrap_err();
        assert!(matches!(err, CompileError::UnassignedMutableVars { .. }));
    }

    #[test]
    fn check_arguments_rejects_duplicates() {
        let st = state();
        let args = vec![
            Argument::new(Ident::new("a"), Type::U256, false),
            Argument::new(Ident::new("a"), Type::Bool, false),
        ];
        let err = st.check_arguments(&args).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateDefinition { .. }));
    }
}
