//! Named schemas waiting to be cloned into one generated module.
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::codegen::{self, Codegen};
use crate::error::{CloneError, Result};
use crate::ir::SchemaNode;

/// Ordered `name → schema` map plus the fixed prefix written into every
/// export. Not synchronized; wrap it yourself to share across threads.
#[derive(Debug, Clone, Default)]
pub struct CloneRegistry {
    entries: IndexMap<String, Arc<SchemaNode>>,
    prefix: String,
}

impl CloneRegistry {
    pub fn new(prefix: Option<String>) -> Self {
        Self { entries: IndexMap::new(), prefix: prefix.unwrap_or_default() }
    }

    /// Registry whose output carries `prefix` verbatim right after the import.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::new(Some(prefix.into()))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Inserts or replaces `name`. A replaced entry keeps its export slot.
    /// Hands `node` back so call sites can keep using it.
    ///
    /// `name` becomes an exported symbol as-is; nothing checks it.
    pub fn register(&mut self, name: impl Into<String>, node: impl Into<Arc<SchemaNode>>) -> Arc<SchemaNode> {
        let name = name.into();
        let node = node.into();
        if !codegen::is_identifier(&name) {
            tracing::warn!(name = %name, "schema name is not a valid identifier; generated source will not parse");
        }
        let replaced = self.entries.insert(name.clone(), node.clone()).is_some();
        tracing::debug!(name = %name, kind = node.kind(), replaced, "registered schema");
        node
    }

    /// Removes `name` if present.
    pub fn unregister(&mut self, name: &str) {
        if self.entries.shift_remove(name).is_some() {
            tracing::debug!(name, "unregistered schema");
        }
    }

    pub fn clear(&mut self) {
        tracing::debug!(count = self.entries.len(), "cleared registry");
        self.entries.clear();
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SchemaNode>> {
        self.entries.get(name)
    }

    /// Names in export order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whole output unit: import header, prefix, blank line, then one
    /// declaration per entry.
    pub fn render(&self) -> Result<String> {
        let mut cg = Codegen::new();
        for (name, node) in &self.entries {
            cg.emit(node, name)?;
        }
        Ok(format!("{}{}\n\n{}", codegen::IMPORT_HEADER, self.prefix, cg.into_string()))
    }

    /// Renders in memory, then writes `destination` in a single call.
    /// Parent directories are not created.
    pub fn export(&self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let content = self.render()?;
        std::fs::write(destination, &content).map_err(|source| CloneError::Io {
            path: destination.to_path_buf(),
            source,
        })?;
        tracing::info!(
            path = %destination.display(),
            schemas = self.entries.len(),
            bytes = content.len(),
            "exported cloned schemas"
        );
        Ok(())
    }
}
