//! Tag declarations
//!
//! Tags are identity-addressed typed storage cells. The `TagId` is the
//! primary key everywhere in the system; string names are a secondary
//! lookup index for diagnostics and the document format, never the key.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};
use crate::value::{Value, ValueKind};

/// Stable identity of a tag. Index into the program's tag arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(pub u32);

impl TagId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single tag declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDecl {
    pub name: String,
    pub kind: ValueKind,
    /// Value at time zero. Defaults to the kind's zero/false.
    pub initial: Value,
}

/// Arena of tag declarations with a secondary name index.
///
/// Declaration order is identity: `TagId(n)` is the n-th declared tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSet {
    decls: Vec<TagDecl>,
    by_name: IndexMap<String, TagId>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a tag with the kind's default initial value.
    pub fn declare(&mut self, name: &str, kind: ValueKind) -> BuildResult<TagId> {
        self.declare_init(name, kind, kind.default_value())
    }

    /// Declare a tag with an explicit initial value.
    pub fn declare_init(&mut self, name: &str, kind: ValueKind, initial: Value) -> BuildResult<TagId> {
        if self.by_name.contains_key(name) {
            return Err(BuildError::DuplicateTag(name.to_string()));
        }
        if initial.kind() != kind {
            return Err(BuildError::KindMismatch {
                tag: name.to_string(),
                expected: kind,
                found: initial.kind(),
            });
        }
        let id = TagId(self.decls.len() as u32);
        self.decls.push(TagDecl {
            name: name.to_string(),
            kind,
            initial,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn get(&self, id: TagId) -> Option<&TagDecl> {
        self.decls.get(id.index())
    }

    /// Secondary lookup by name.
    pub fn resolve(&self, name: &str) -> Option<TagId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagId, &TagDecl)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (TagId(i as u32), d))
    }

    /// Kind of a declared tag, or an undeclared-tag error.
    pub fn kind_of(&self, id: TagId) -> BuildResult<ValueKind> {
        self.get(id)
            .map(|d| d.kind)
            .ok_or(BuildError::UndeclaredTag(id))
    }
}
