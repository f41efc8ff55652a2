//! Symbol Table (component A): the global store for protocols, fields,
//! variables, constants, labels, lookup tables and regex entries.
//!
//! Split the way the lifecycle in the design splits it: [`GlobalSymbols`] is
//! built once per protocol-database load and is never mutated again, so it
//! can be shared across concurrently-running `CompilationUnit`s.
//! Everything a single `compile()` call allocates — temporaries, labels,
//! per-compile field usage flags, extraction bookkeeping — lives in
//! [`local::LocalSymbols`] instead, owned by that `CompilationUnit`.

pub(crate) mod global;
mod local;

pub use global::{
    FieldFlags, FieldSym, GlobalSymbols, LookupKeyValueSlot, LookupTable, LookupValidity,
    ProtoSym,
};
pub use local::{ConstValue, ExtractionInfo, FieldUsage, Label, LocalSymbols};
