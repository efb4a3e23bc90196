//! Entity hierarchy resolution.
//!
//! Walks parent links upward from an entity. The walk keeps a visited set
//! seeded with the starting entity, so a data error that introduces a loop
//! ends the walk instead of recursing forever; the loop is reported to the
//! log and the audit sink and the ancestors collected so far are kept.

use crate::audit::{AuditEvent, AuditSink};
use crate::budget::CallBudget;
use crate::error::{Dependency, Result};
use crate::store::HierarchySource;
use crate::types::EntityRef;
use std::collections::HashSet;
use std::sync::Arc;

/// Why an ancestor walk stopped before reaching a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Truncation {
    /// The walk reached an entity already on the path.
    Cycle { revisited: EntityRef },
    /// The walk reached the configured depth limit.
    DepthLimit { max_depth: usize },
    /// A parent link pointed to an entity type that may not parent the child.
    IllegalParent { child: EntityRef, parent: EntityRef },
}

/// Ordered ancestors of an entity, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorChain {
    ancestors: Vec<EntityRef>,
    truncation: Option<Truncation>,
}

impl AncestorChain {
    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> &[EntityRef] {
        &self.ancestors
    }

    /// Returns true when the entity has no known ancestors.
    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty()
    }

    /// Why the walk stopped early, if it did.
    pub fn truncation(&self) -> Option<&Truncation> {
        self.truncation.as_ref()
    }

    /// Consumes the chain and returns the ancestors.
    pub fn into_ancestors(self) -> Vec<EntityRef> {
        self.ancestors
    }
}

/// Cycle-safe ancestor resolver over a [`HierarchySource`].
pub struct HierarchyResolver<H> {
    source: H,
    budget: CallBudget,
    max_depth: usize,
    enforce_parent_types: bool,
    audit: Arc<dyn AuditSink>,
}

impl<H> std::fmt::Debug for HierarchyResolver<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyResolver")
            .field("budget", &self.budget)
            .field("max_depth", &self.max_depth)
            .field("enforce_parent_types", &self.enforce_parent_types)
            .finish_non_exhaustive()
    }
}

impl<H: HierarchySource> HierarchyResolver<H> {
    pub(crate) fn new(
        source: H,
        budget: CallBudget,
        max_depth: usize,
        enforce_parent_types: bool,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            source,
            budget,
            max_depth,
            enforce_parent_types,
            audit,
        }
    }

    /// Returns the underlying hierarchy source.
    pub fn source(&self) -> &H {
        &self.source
    }

    /// Returns the full ancestor chain of `entity`, nearest first.
    ///
    /// Unknown entities and roots yield an empty chain. Only a failing or
    /// slow hierarchy source produces an error.
    pub async fn ancestor_chain(&self, entity: &EntityRef) -> Result<AncestorChain> {
        let mut walk = self.walk(entity);
        while walk.next().await?.is_some() {}
        Ok(walk.finish())
    }

    /// Starts a lazy walk that fetches one parent per step.
    pub fn walk(&self, entity: &EntityRef) -> AncestorWalk<'_, H> {
        AncestorWalk {
            resolver: self,
            start: entity.clone(),
            current: entity.clone(),
            visited: HashSet::from([entity.clone()]),
            chain: AncestorChain::default(),
            done: false,
        }
    }
}

/// Lazy upward walk; see [`HierarchyResolver::walk`].
pub struct AncestorWalk<'a, H> {
    resolver: &'a HierarchyResolver<H>,
    start: EntityRef,
    current: EntityRef,
    visited: HashSet<EntityRef>,
    chain: AncestorChain,
    done: bool,
}

impl<H: HierarchySource> AncestorWalk<'_, H> {
    /// Fetches the next ancestor, or `None` once the walk has ended.
    pub async fn next(&mut self) -> Result<Option<EntityRef>> {
        if self.done {
            return Ok(None);
        }
        if self.chain.ancestors.len() >= self.resolver.max_depth {
            tracing::warn!(
                start = %self.start,
                max_depth = self.resolver.max_depth,
                "ancestor walk truncated at depth limit"
            );
            return Ok(self.stop(Truncation::DepthLimit {
                max_depth: self.resolver.max_depth,
            }));
        }

        let parent = self
            .resolver
            .budget
            .call(
                Dependency::Hierarchy,
                "parent",
                self.resolver.source.parent(&self.current),
            )
            .await;
        let parent = match parent {
            Ok(parent) => parent,
            Err(err) => {
                self.done = true;
                return Err(err);
            }
        };
        let Some(parent) = parent else {
            self.done = true;
            return Ok(None);
        };

        if !self.visited.insert(parent.clone()) {
            tracing::error!(
                start = %self.start,
                revisited = %parent,
                chain_len = self.chain.ancestors.len(),
                "cycle detected in entity hierarchy; treating remaining ancestors as absent"
            );
            self.resolver
                .audit
                .record(AuditEvent::CycleDetected {
                    start: self.start.clone(),
                    revisited: parent.clone(),
                    chain: self.chain.ancestors.clone(),
                })
                .await;
            return Ok(self.stop(Truncation::Cycle { revisited: parent }));
        }

        if self.resolver.enforce_parent_types
            && !self.current.entity_type.accepts_parent(parent.entity_type)
        {
            tracing::warn!(
                child = %self.current,
                %parent,
                "ignoring parent link with disallowed entity type"
            );
            return Ok(self.stop(Truncation::IllegalParent {
                child: self.current.clone(),
                parent,
            }));
        }

        self.chain.ancestors.push(parent.clone());
        self.current = parent.clone();
        Ok(Some(parent))
    }

    /// Ends the walk and returns what was collected.
    pub fn finish(self) -> AncestorChain {
        self.chain
    }

    fn stop(&mut self, truncation: Truncation) -> Option<EntityRef> {
        self.done = true;
        self.chain.truncation = Some(truncation);
        None
    }
}
