//! # Static check of the single-owner invariant.
//!
//! ```text
//! verify(root):
//!   walk managed + dependent edges once (visited set)
//!   managers[child] += parent    for every managed edge
//!   managers[child] ∪= {}        for every dependent edge
//!   fail if |managers[t]| > 1            → ManagedByMultipleParents
//!   fail if |managers[t]| = 0, t ≠ root  → NotManaged
//! ```
//! Pure and side-effect free; meant to run once after assembling a tree.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::core::Name;
use crate::error::VerifyError;
use crate::tiles::Tile;

/// Verifies that every non-root tile of a tree has exactly one manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependenciesVerifier;

impl DependenciesVerifier {
    /// Walks the tree rooted at `root`; reports the first violation in name order.
    pub fn verify(root: &Tile) -> Result<(), VerifyError> {
        let mut managers: BTreeMap<Name, BTreeSet<Name>> = BTreeMap::new();
        let mut visited: HashSet<Name> = HashSet::new();
        let mut stack = vec![root.clone()];

        while let Some(tile) = stack.pop() {
            if !visited.insert(tile.name().clone()) {
                continue;
            }
            for child in tile.managed_children() {
                managers
                    .entry(child.name().clone())
                    .or_default()
                    .insert(tile.name().clone());
                stack.push(child.clone());
            }
            for child in tile.dependent_children() {
                managers.entry(child.name().clone()).or_default();
                stack.push(child.clone());
            }
        }

        for (tile, parents) in managers {
            if parents.len() > 1 {
                return Err(VerifyError::ManagedByMultipleParents {
                    tile,
                    parents: parents.into_iter().collect(),
                });
            }
            if parents.is_empty() && &tile != root.name() {
                return Err(VerifyError::NotManaged { tile });
            }
        }
        Ok(())
    }
}
