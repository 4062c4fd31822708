//! Selection resolution
//!
//! Turns the catalog's selected streams into two sets:
//!
//! - **emission**: the streams whose records are written out
//! - **traversal**: emission plus every ancestor needed to reach them
//!
//! Ancestors are walked through the dependency table with a cycle check and
//! a depth bound.

use crate::config::Catalog;
use crate::error::{Error, Result};
use crate::streams::DependencyTable;
use std::collections::BTreeSet;
use tracing::debug;

/// Deepest allowed chain below the top-level parent
pub const MAX_DEPTH: usize = 3;

/// Resolved emission and traversal sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Streams whose records are emitted
    pub emit: BTreeSet<String>,
    /// Streams that are fetched (superset of `emit`)
    pub traverse: BTreeSet<String>,
}

impl Selection {
    /// Nothing selected
    pub fn is_empty(&self) -> bool {
        self.emit.is_empty()
    }

    /// Whether records of `stream` are emitted
    pub fn emits(&self, stream: &str) -> bool {
        self.emit.contains(stream)
    }

    /// Whether `stream` is fetched at all
    pub fn traverses(&self, stream: &str) -> bool {
        self.traverse.contains(stream)
    }
}

/// Resolve the streams selected in a catalog
pub fn resolve_catalog(catalog: &Catalog, table: &DependencyTable) -> Result<Selection> {
    resolve(catalog.selected_stream_ids(), table)
}

/// Resolve a set of selected stream names
pub fn resolve<'a, I>(selected: I, table: &DependencyTable) -> Result<Selection>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut selection = Selection::default();

    for stream in selected {
        if !table.contains_key(stream) {
            return Err(Error::StreamNotFound {
                stream: stream.to_string(),
            });
        }
        selection.emit.insert(stream.to_string());

        let mut path = Vec::new();
        collect_ancestors(stream, table, &mut path, &mut selection.traverse)?;
    }

    debug!(
        emit = ?selection.emit,
        traverse = ?selection.traverse,
        "Resolved selection"
    );
    Ok(selection)
}

fn collect_ancestors(
    stream: &str,
    table: &DependencyTable,
    path: &mut Vec<String>,
    out: &mut BTreeSet<String>,
) -> Result<()> {
    if path.iter().any(|p| p == stream) {
        return Err(Error::dependency(format!(
            "cycle through '{stream}': {} -> {stream}",
            path.join(" -> ")
        )));
    }

    let parents = table
        .get(stream)
        .ok_or_else(|| Error::dependency(format!("unknown dependency '{stream}'")))?;

    path.push(stream.to_string());
    if path.len() > MAX_DEPTH + 1 {
        return Err(Error::dependency(format!(
            "dependency chain deeper than {MAX_DEPTH}: {}",
            path.join(" -> ")
        )));
    }

    out.insert(stream.to_string());
    for parent in parents {
        collect_ancestors(parent, table, path, out)?;
    }

    path.pop();
    Ok(())
}
