//! Abstract syntax tree for the command language.

pub mod types;

pub use types::*;
