//! Row and identifier primitives shared by every operator.

pub mod context;
pub mod identifiers;
pub mod rows;
pub mod values;

pub use context::ExecutionContext;
pub use identifiers::{FieldIdent, TableIdent};
pub use rows::Row;
pub use values::{group_key, FieldValue};
