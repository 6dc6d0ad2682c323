//! Module: model
//! Responsibility: static schema knowledge (fields, sentinels, table variants).
//! Does not own: condition compilation or statement assembly.
//! Boundary: leaf layer of the compiler; depends only on `param` and `value`.

pub mod field;
pub mod sentinel;
pub mod table;

pub use field::{FieldDescriptor, FieldRegistry, StorageKind, SyntheticKind};
pub use sentinel::SentinelKind;
pub use table::{TableKind, TableVariant};
