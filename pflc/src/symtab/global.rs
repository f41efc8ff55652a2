use std::collections::HashMap;

use pflc_types::{FieldKind, ProtoDef};

use crate::error::{Diagnostic, ErrorRecorder, Fatal};
use crate::hir::{HirBuilder, ProtoHir};
use crate::ids::{FieldId, LabelId, LookupTableId, ProtoId, TempId};

/// A protocol, as it lives in the (immutable, shared) global symbol table.
#[derive(Debug, Clone)]
pub struct ProtoSym {
    pub id: ProtoId,
    pub name: String,
    pub fields: Vec<FieldSym>,
    field_by_name: HashMap<String, FieldId>,
    pub before: Option<pflc_types::PdlNode>,
    pub encapsulation: Vec<pflc_types::EncapCase>,
    pub encap_selector: Option<pflc_types::Expr>,
    pub verify: Option<pflc_types::PdlNode>,
    pub preferred_next: Vec<String>,
    pub supported: bool,
    /// Longest-path-from-`startproto` depth, filled in by
    /// [`crate::graph::EncapGraph::assign_layers`].
    pub layer: u32,
    /// Before/format/verify HIR, built once at database-load time and
    /// never rebuilt afterwards.
    pub hir: ProtoHir,
}

impl ProtoSym {
    pub fn field(&self, id: FieldId) -> &FieldSym {
        &self.fields[id.index()]
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldSym> {
        self.field_by_name.get(name).map(|id| self.field(*id))
    }
}

/// A field, as canonicalized by [`GlobalSymbols::store_proto_field`].
/// Per-compile usage flags and extraction positions are *not* stored here —
/// see [`crate::symtab::local::LocalSymbols`] — because `GlobalSymbols` must
/// stay read-only while independent `CompilationUnit`s share it.
#[derive(Debug, Clone)]
pub struct FieldSym {
    pub id: FieldId,
    pub proto: ProtoId,
    pub name: String,
    pub kind: FieldKind,
    pub flags: FieldFlags,
    /// Alternate definitions recorded when a later `StoreProtoField` call for
    /// this name disagreed on type or attributes.
    pub alt_defs: Vec<FieldKind>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldFlags {
    pub compattable: bool,
    pub int_compatible: bool,
}

impl FieldFlags {
    fn derive(kind: &FieldKind, compattable: bool) -> Self {
        let int_compatible = matches!(
            kind,
            FieldKind::Fixed { .. } | FieldKind::BitField { .. } | FieldKind::Variable { .. }
        );
        FieldFlags {
            compattable: compattable && matches!(kind, FieldKind::Fixed { .. }),
            int_compatible,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupValidity {
    Static,
    Dynamic,
    KeepMaxTime,
    UpdateOnHit,
    ReplaceOnHit,
    AddOnHit,
}

#[derive(Debug, Clone)]
pub struct LookupKeyValueSlot {
    pub name: String,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct LookupTable {
    pub id: LookupTableId,
    pub name: String,
    pub validity: LookupValidity,
    pub keys: Vec<LookupKeyValueSlot>,
    pub values: Vec<LookupKeyValueSlot>,
    /// Timestamp/lifespan/flags slots appended for dynamic tables, invisible
    /// to the filter author but present in the emitted table layout.
    pub hidden_slots: Vec<LookupKeyValueSlot>,
    /// Protocols whose before/format/verify sections reference this table;
    /// used to prune unreferenced tables from the prelude.
    pub used_by: Vec<ProtoId>,
}

impl LookupTable {
    pub fn is_dynamic(&self) -> bool {
        !matches!(self.validity, LookupValidity::Static)
    }
}

/// Global store for protocols, fields and lookup tables. Built once per
/// protocol-database load and never mutated afterwards.
#[derive(Debug, Default)]
pub struct GlobalSymbols {
    protos: Vec<ProtoSym>,
    proto_by_id: HashMap<u32, ProtoId>,
    proto_by_name: HashMap<String, ProtoId>,
    lookup_tables: Vec<LookupTable>,
    lookup_table_by_name: HashMap<String, LookupTableId>,
    pub startproto: Option<ProtoId>,
    hir_label_counter: u32,
    hir_temp_counter: u32,
}

impl GlobalSymbols {
    /// Builds the symbol table from the database parser's protocol list,
    /// applying the `StoreProtoField` dedup rule to every
    /// field as each protocol is ingested.
    pub fn from_database(
        defs: Vec<ProtoDef>,
        recorder: &mut ErrorRecorder,
    ) -> Result<GlobalSymbols, Fatal> {
        let mut syms = GlobalSymbols::default();
        for def in defs {
            syms.add_proto(def, recorder)?;
        }
        syms.startproto = syms.proto_by_name.get("startproto").copied();
        if syms.startproto.is_none() {
            return Err(Fatal::MissingStartProto);
        }
        Ok(syms)
    }

    fn add_proto(&mut self, def: ProtoDef, recorder: &mut ErrorRecorder) -> Result<(), Fatal> {
        if self.proto_by_id.contains_key(&def.id) {
            return Err(Fatal::DuplicateProtoId(def.id));
        }
        let id = ProtoId(self.protos.len() as u32);
        let mut sym = ProtoSym {
            id,
            name: def.name.clone(),
            fields: Vec::new(),
            field_by_name: HashMap::new(),
            before: def.before,
            encapsulation: def.encapsulation,
            encap_selector: def.encap_selector,
            verify: def.verify,
            preferred_next: def.preferred_next,
            supported: def.supported,
            layer: 0,
            hir: ProtoHir::default(),
        };
        self.protos.push(sym.clone_empty_marker());
        self.proto_by_id.insert(def.id, id);
        self.proto_by_name.insert(def.name.clone(), id);

        for field in def.fields {
            let kind = field.kind;
            let compattable = field.compattable;
            Self::store_proto_field(&mut sym, &field.name, kind, compattable, recorder);
        }

        let mut label_counter = self.hir_label_counter;
        let mut temp_counter = self.hir_temp_counter;
        {
            let mut alloc_label = || {
                let id = LabelId(label_counter);
                label_counter += 1;
                id
            };
            let mut alloc_temp = || {
                let id = TempId(temp_counter);
                temp_counter += 1;
                id
            };
            let mut builder = HirBuilder::new(&mut alloc_label, &mut alloc_temp);
            sym.hir = builder.build(&sym, recorder);
        }
        self.hir_label_counter = label_counter;
        self.hir_temp_counter = temp_counter;

        self.protos[id.index()] = sym;
        Ok(())
    }

    /// `StoreProtoField(p, f)`: returns the canonical field id for `name`
    /// within `proto`, merging with an existing definition of identical
    /// shape or appending an alternate definition otherwise.
    fn store_proto_field(
        proto: &mut ProtoSym,
        name: &str,
        kind: FieldKind,
        compattable: bool,
        recorder: &mut ErrorRecorder,
    ) -> FieldId {
        if let Some(&existing_id) = proto.field_by_name.get(name) {
            let existing = &mut proto.fields[existing_id.index()];
            if existing.kind == kind {
                return existing_id;
            }
            recorder.push(Diagnostic::Pdl {
                proto: proto.name.clone(),
                message: format!(
                    "field '{name}' redefined with a different shape; keeping the first definition and \
                     recording the alternative"
                ),
            });
            existing.alt_defs.push(kind);
            return existing_id;
        }

        let id = FieldId(proto.fields.len() as u32);
        proto.fields.push(FieldSym {
            id,
            proto: proto.id,
            name: name.to_string(),
            flags: FieldFlags::derive(&kind, compattable),
            kind,
            alt_defs: Vec::new(),
        });
        proto.field_by_name.insert(name.to_string(), id);
        id
    }

    pub fn proto(&self, id: ProtoId) -> &ProtoSym {
        &self.protos[id.index()]
    }

    pub fn proto_mut(&mut self, id: ProtoId) -> &mut ProtoSym {
        &mut self.protos[id.index()]
    }

    pub fn proto_by_id(&self, id: u32) -> Option<ProtoId> {
        self.proto_by_id.get(&id).copied()
    }

    /// `FindByName`: returns `None` on a missing protocol, never fatal.
    pub fn proto_by_name(&self, name: &str) -> Option<ProtoId> {
        self.proto_by_name.get(name).copied()
    }

    pub fn protos(&self) -> impl Iterator<Item = &ProtoSym> {
        self.protos.iter()
    }

    pub fn register_lookup_table(&mut self, table: LookupTable) -> LookupTableId {
        if let Some(&id) = self.lookup_table_by_name.get(&table.name) {
            return id;
        }
        let id = LookupTableId(self.lookup_tables.len() as u32);
        let mut table = table;
        table.id = id;
        self.lookup_table_by_name.insert(table.name.clone(), id);
        self.lookup_tables.push(table);
        id
    }

    pub fn lookup_table(&self, id: LookupTableId) -> &LookupTable {
        &self.lookup_tables[id.index()]
    }

    pub fn lookup_table_named(&self, name: &str) -> Option<&LookupTable> {
        self.lookup_table_by_name.get(name).map(|id| self.lookup_table(*id))
    }

    pub fn lookup_tables(&self) -> impl Iterator<Item = &LookupTable> {
        self.lookup_tables.iter()
    }
}

impl ProtoSym {
    // Placeholder pushed into `protos` before fields are filled in, so that
    // `add_proto` can hand out a stable `ProtoId` before the field loop runs.
    fn clone_empty_marker(&self) -> ProtoSym {
        ProtoSym {
            id: self.id,
            name: self.name.clone(),
            fields: Vec::new(),
            field_by_name: HashMap::new(),
            before: None,
            encapsulation: Vec::new(),
            encap_selector: None,
            verify: None,
            preferred_next: Vec::new(),
            supported: self.supported,
            layer: 0,
            hir: ProtoHir::default(),
        }
    }
}
