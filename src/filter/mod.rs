//! Compiles untrusted nested filter documents into a parameterized SQL
//! predicate plus the values bound to its placeholders.
//!
//! ```text
//! {"#and": {"age": {"operator": "gt", "value": "5", "type": "int"},
//!           "name": {"operator": "like", "value": "a*"}}}
//!   => (age > :p1_1 AND name LIKE :p1_2)   {:p1_1: 5, :p1_2: "a%"}
//! ```
//!
//! The compiler performs no I/O and never inlines a value into the predicate.

pub mod compiler;
pub mod error;
pub mod operator;
pub mod value;

pub use compiler::{CompiledFilter, FilterCompiler, Join, MAX_DEPTH};
pub use error::FilterError;
pub use operator::{CompareOp, Operator, UnaryOp};
pub use value::{BoundParam, ParamKind, ParamValue, ValueType};
