//! Newtype handles used throughout the compiler instead of raw pointers.
//!
//! HIR trees are strictly tree-shaped and can own their children directly,
//! but MIR nodes inside a CFG are shared by copy-and-reparent during
//! reassociation, so they live in an arena and are referenced by index
//! (design note: "Cyclic IR graphs").

use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", stringify!($name), self.0)
            }
        }
    };
}

id_type!(ProtoId);
id_type!(FieldId);
id_type!(LookupTableId);
id_type!(VarId);
id_type!(ConstId);
id_type!(LabelId);
id_type!(TempId);
id_type!(MirId);
id_type!(BlockId);
id_type!(RegId);
id_type!(StateId);
