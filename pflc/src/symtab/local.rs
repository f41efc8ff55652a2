use std::collections::HashMap;

use crate::ids::{ConstId, FieldId, LabelId, LookupTableId, TempId, VarId};

/// A label in the generated code. Code labels carry a stable id and are
/// resolved to an address by the bytecode emitter; linked labels lazily bind
/// to whatever code label comes next (used for fallthrough-style jump
/// targets that are not yet known when the jump is emitted).
#[derive(Debug, Clone)]
pub enum Label {
    Code { id: LabelId, name: String },
    Linked { id: LabelId, target: Option<LabelId> },
}

impl Label {
    pub fn id(&self) -> LabelId {
        match self {
            Label::Code { id, .. } => *id,
            Label::Linked { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldUsage {
    pub used: bool,
    pub used_as_int: bool,
    pub used_as_string: bool,
    pub used_as_array: bool,
    pub multi_proto: bool,
}

/// Where an extracted field's coordinates land in the info partition, and
/// how many instances of it have been seen so far while lowering.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInfo {
    pub position: u32,
    pub instance_count: u32,
}

/// Per-`compile()` mutable state: temporaries, labels, local variables, and
/// the field usage/extraction bookkeeping that must not leak back into the
/// shared [`super::GlobalSymbols`] that other concurrently-running compiles
/// may be reading at the same time.
#[derive(Debug, Default)]
pub struct LocalSymbols {
    temp_counter: u32,
    label_counter: u32,
    labels: Vec<Label>,
    vars: Vec<String>,
    var_by_name: HashMap<String, VarId>,
    int_consts: HashMap<i64, ConstId>,
    str_consts: HashMap<String, ConstId>,
    const_values: Vec<ConstValue>,
    field_usage: HashMap<FieldId, FieldUsage>,
    extraction: HashMap<FieldId, ExtractionInfo>,
    used_lookup_tables: Vec<LookupTableId>,
    regex_entries: Vec<String>,
    regex_entry_by_pattern: HashMap<String, u32>,
    string_match_entries: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub enum ConstValue {
    Int(i64),
    Str(String),
}

impl LocalSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_temp(&mut self) -> TempId {
        let id = TempId(self.temp_counter);
        self.temp_counter += 1;
        id
    }

    pub fn new_code_label(&mut self, name: impl Into<String>) -> LabelId {
        let id = LabelId(self.label_counter);
        self.label_counter += 1;
        self.labels.push(Label::Code { id, name: name.into() });
        id
    }

    pub fn new_linked_label(&mut self) -> LabelId {
        let id = LabelId(self.label_counter);
        self.label_counter += 1;
        self.labels.push(Label::Linked { id, target: None });
        id
    }

    pub fn link_label(&mut self, linked: LabelId, target: LabelId) {
        if let Some(Label::Linked { target: slot, .. }) =
            self.labels.iter_mut().find(|l| l.id() == linked)
        {
            *slot = Some(target);
        }
    }

    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.index()]
    }

    pub fn var(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.var_by_name.get(name) {
            return id;
        }
        let id = VarId(self.vars.len() as u32);
        self.vars.push(name.to_string());
        self.var_by_name.insert(name.to_string(), id);
        id
    }

    pub fn int_const(&mut self, value: i64) -> ConstId {
        if let Some(&id) = self.int_consts.get(&value) {
            return id;
        }
        let id = ConstId(self.const_values.len() as u32);
        self.const_values.push(ConstValue::Int(value));
        self.int_consts.insert(value, id);
        id
    }

    pub fn str_const(&mut self, value: &str) -> ConstId {
        if let Some(id) = self.str_consts.get(value) {
            return *id;
        }
        let id = ConstId(self.const_values.len() as u32);
        self.const_values.push(ConstValue::Str(value.to_string()));
        self.str_consts.insert(value.to_string(), id);
        id
    }

    pub fn const_value(&self, id: ConstId) -> &ConstValue {
        &self.const_values[id.index()]
    }

    pub fn const_values(&self) -> impl Iterator<Item = &ConstValue> {
        self.const_values.iter()
    }

    pub fn usage_mut(&mut self, field: FieldId) -> &mut FieldUsage {
        self.field_usage.entry(field).or_default()
    }

    pub fn usage(&self, field: FieldId) -> FieldUsage {
        self.field_usage.get(&field).copied().unwrap_or_default()
    }

    pub fn set_extraction(&mut self, field: FieldId, info: ExtractionInfo) {
        self.extraction.insert(field, info);
    }

    pub fn extraction(&self, field: FieldId) -> Option<ExtractionInfo> {
        self.extraction.get(&field).copied()
    }

    pub fn extracted_fields(&self) -> impl Iterator<Item = (FieldId, ExtractionInfo)> + '_ {
        self.extraction.iter().map(|(k, v)| (*k, *v))
    }

    pub fn mark_table_used(&mut self, id: LookupTableId) {
        if !self.used_lookup_tables.contains(&id) {
            self.used_lookup_tables.push(id);
        }
    }

    pub fn used_lookup_tables(&self) -> &[LookupTableId] {
        &self.used_lookup_tables
    }

    /// Registers a pattern string with the regex coprocessor table,
    /// returning its (deduplicated) slot index.
    pub fn regex_entry(&mut self, pattern: &str) -> u32 {
        if let Some(&idx) = self.regex_entry_by_pattern.get(pattern) {
            return idx;
        }
        let idx = self.regex_entries.len() as u32;
        self.regex_entries.push(pattern.to_string());
        self.regex_entry_by_pattern.insert(pattern.to_string(), idx);
        idx
    }

    pub fn regex_entries(&self) -> &[String] {
        &self.regex_entries
    }

    pub fn string_match_entry(&mut self, literal: Vec<u8>) -> u32 {
        if let Some(idx) = self.string_match_entries.iter().position(|e| e == &literal) {
            return idx as u32;
        }
        let idx = self.string_match_entries.len() as u32;
        self.string_match_entries.push(literal);
        idx
    }

    pub fn string_match_entries(&self) -> &[Vec<u8>] {
        &self.string_match_entries
    }
}
