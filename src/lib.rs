//! Clone zod schema trees into standalone TypeScript modules.
//!
//! Build or load a tree of [`ir::SchemaNode`]s, register it under a name in a
//! [`registry::CloneRegistry`], and export: every entry becomes an
//! `export const <name> = <expression>;` line that rebuilds the schema from
//! `zod` alone.
pub mod cli;
pub mod codegen;
pub mod document;
pub mod error;
pub mod ir;
pub mod path_de;
pub mod reconstruct;
pub mod registry;

pub use codegen::{clone_declaration, clone_expression};
pub use error::{CloneError, Result};
pub use ir::SchemaNode;
pub use registry::CloneRegistry;
