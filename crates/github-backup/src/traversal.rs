//! Pre-order walk of the backup tree with budget admission and resume.
//!
//! Every budget-consuming node is admitted the same way: classify it against
//! the resume marker, persist the marker before doing anything risky, charge
//! the budget, then act. The first node the budget cannot cover stops the
//! whole walk with [`Halted`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::artifact::ArtifactWriter;
use crate::budget::Budget;
use crate::checkpoint::{CheckpointId, Query, ResumeKind, ResumeStore};
use crate::error::Result;
use crate::remote::RemoteSource;
use crate::report::{RunEvent, RunReport, RunSink};
use crate::sections::{NodeKind, SectionInfo};

/// Budget ran out at `at`. Not an error: the run finalizes incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halted {
    pub at: CheckpointId,
}

pub type Flow = std::result::Result<(), Halted>;

/// What a scope fetched, seen as the checkpoint segments of its children.
pub trait Listing {
    fn child_segments(&self) -> Vec<String>;
}

/// State shared by every target of one run.
pub struct RunCtx {
    pub budget: Budget,
    pub report: RunReport,
    pub sink: Arc<dyn RunSink>,
}

impl RunCtx {
    pub fn new(budget: Budget, sink: Arc<dyn RunSink>) -> Self {
        Self {
            budget,
            report: RunReport::default(),
            sink,
        }
    }

    pub fn emit(&self, ev: RunEvent) {
        self.sink.emit(ev);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: CheckpointId,
    pub kind: NodeKind,
    pub cost: u32,
    pub label: &'static str,
}

impl Node {
    pub fn of<S: SectionInfo + ?Sized>(section: &S, parent: &CheckpointId) -> Self {
        Self {
            id: parent.child(section.token()),
            kind: section.kind(),
            cost: section.cost(),
            label: section.label(),
        }
    }

    pub fn group(id: CheckpointId, label: &'static str) -> Self {
        Self {
            id,
            kind: NodeKind::Group,
            cost: 0,
            label,
        }
    }

    pub fn scope(id: CheckpointId, cost: u32, label: &'static str) -> Self {
        Self {
            id,
            kind: NodeKind::Scope,
            cost,
            label,
        }
    }

    pub fn step(id: CheckpointId, cost: u32, label: &'static str) -> Self {
        Self {
            id,
            kind: NodeKind::Step,
            cost,
            label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Skip,
    /// Run the node and everything beneath it.
    Full,
    /// Pass through towards the marker.
    Ancestor,
}

pub struct Traversal<'a> {
    ctx: &'a mut RunCtx,
    store: &'a mut ResumeStore,
    remote: &'a dyn RemoteSource,
    writer: &'a mut ArtifactWriter,
}

impl<'a> Traversal<'a> {
    pub fn new(
        ctx: &'a mut RunCtx,
        store: &'a mut ResumeStore,
        remote: &'a dyn RemoteSource,
        writer: &'a mut ArtifactWriter,
    ) -> Self {
        Self {
            ctx,
            store,
            remote,
            writer,
        }
    }

    pub fn remote(&self) -> &'a dyn RemoteSource {
        self.remote
    }

    pub fn writer(&mut self) -> &mut ArtifactWriter {
        &mut *self.writer
    }

    pub fn budget(&self) -> &Budget {
        &self.ctx.budget
    }

    /// Walk a whole target. The root behaves like a group.
    pub fn run(&mut self, body: impl Fn(&mut Self) -> Flow) -> Flow {
        let root = CheckpointId::root();
        match self.enter(&root) {
            Entry::Skip => Ok(()),
            Entry::Full => body(self),
            Entry::Ancestor => {
                body(self)?;
                if self.drop_stale_marker(&root) {
                    body(self)?;
                }
                Ok(())
            }
        }
    }

    /// Structural container. Free, never writes a marker.
    ///
    /// When a resume passes through and no child matches the marker, every
    /// child was skipped: the marker is dropped and the children walked again.
    pub fn group(&mut self, node: Node, body: impl Fn(&mut Self) -> Flow) -> Flow {
        debug_assert_eq!(node.kind, NodeKind::Group);
        match self.enter(&node.id) {
            Entry::Skip => {
                self.skipped(&node);
                Ok(())
            }
            Entry::Full => body(self),
            Entry::Ancestor => {
                body(self)?;
                if self.drop_stale_marker(&node.id) {
                    body(self)?;
                }
                Ok(())
            }
        }
    }

    /// Budget-consuming leaf.
    pub fn step(&mut self, node: Node, action: impl FnOnce(&mut Self) -> Result<()>) -> Flow {
        let entry = match self.enter(&node.id) {
            Entry::Skip => {
                self.skipped(&node);
                return Ok(());
            }
            // A leaf has nothing beneath it for the marker to name.
            Entry::Ancestor => {
                self.drop_stale_marker(&node.id);
                Entry::Full
            }
            Entry::Full => Entry::Full,
        };
        self.admit(&node, entry)?;
        self.ctx.report.executed.push(node.id.clone());
        if let Err(e) = action(self) {
            self.failed(&node, &e.to_string());
        }
        Ok(())
    }

    /// Budget-consuming container: `fetch` obtains what the children are
    /// built from. It runs again when a resume passes through, and a marker
    /// naming a child that is no longer listed is dropped before the walk.
    pub fn scope<T: Listing>(
        &mut self,
        node: Node,
        fetch: impl FnOnce(&mut Self) -> Result<T>,
        body: impl FnOnce(&mut Self, T) -> Flow,
    ) -> Flow {
        let entry = self.enter(&node.id);
        if entry == Entry::Skip {
            self.skipped(&node);
            return Ok(());
        }
        self.admit(&node, entry)?;
        self.ctx.report.listed.push(node.id.clone());
        match fetch(self) {
            Ok(listing) => {
                if entry == Entry::Ancestor {
                    self.drop_unlisted_marker(&node.id, &listing);
                }
                body(self, listing)?
            }
            Err(e) => self.failed(&node, &e.to_string()),
        }
        if entry == Entry::Ancestor {
            self.drop_stale_marker(&node.id);
        }
        Ok(())
    }

    fn enter(&mut self, id: &CheckpointId) -> Entry {
        match self.store.query(id) {
            Query::Skip => Entry::Skip,
            Query::Normal => Entry::Full,
            Query::Resume(ResumeKind::Exact) => {
                info!(id = %id, "resuming at interrupted node");
                Entry::Full
            }
            Query::Resume(ResumeKind::Ancestor) => Entry::Ancestor,
        }
    }

    /// Persist the marker (fresh nodes only), then charge the budget.
    fn admit(&mut self, node: &Node, entry: Entry) -> Flow {
        let resumed_here = self.store.persisted() == Some(&node.id);
        if entry == Entry::Full && !resumed_here {
            self.persist(&node.id);
        }
        if !self.ctx.budget.reserve(node.cost) {
            return Err(self.halt(node));
        }
        debug!(id = %node.id, cost = node.cost, remaining = self.ctx.budget.remaining(), "admitted");
        self.ctx.emit(RunEvent::NodeStarted {
            id: node.id.to_string(),
            label: node.label,
        });
        Ok(())
    }

    fn halt(&mut self, node: &Node) -> Halted {
        // Keep a deeper marker: it is closer to the interrupted work.
        let covered = self
            .store
            .persisted()
            .is_some_and(|p| node.id.is_prefix_of(p));
        if !covered {
            self.persist(&node.id);
        }
        let at = self
            .store
            .persisted()
            .cloned()
            .unwrap_or_else(|| node.id.clone());
        info!(
            id = %node.id,
            resume_point = %at,
            remaining = self.ctx.budget.remaining(),
            "budget exhausted, halting"
        );
        self.ctx.report.halted_at = Some(at.clone());
        self.ctx.emit(RunEvent::Halted {
            id: at.to_string(),
            remaining: self.ctx.budget.remaining(),
        });
        Halted { at }
    }

    fn persist(&mut self, id: &CheckpointId) {
        if let Err(e) = self.store.set(id) {
            warn!(id = %id, "failed to persist resume marker: {e}");
            self.ctx.report.marker_write_failures += 1;
            self.ctx.emit(RunEvent::MarkerWriteFailed {
                id: id.to_string(),
                error: e.to_string(),
            });
        }
    }

    fn drop_unlisted_marker(&mut self, scope: &CheckpointId, listing: &impl Listing) {
        let Some(segment) = self
            .store
            .target()
            .and_then(|t| t.segments().get(scope.depth()))
            .cloned()
        else {
            return;
        };
        if !listing.child_segments().contains(&segment) {
            self.drop_stale_marker(scope);
        }
    }

    /// Discard the marker if it still points beneath `container`. Returns
    /// whether it did.
    fn drop_stale_marker(&mut self, container: &CheckpointId) -> bool {
        let stale = self
            .store
            .target()
            .is_some_and(|t| container.is_ancestor_of(t));
        if !stale {
            return false;
        }
        let Some(target) = self.store.discard_target() else {
            return false;
        };
        warn!(marker = %target, "resume point no longer exists remotely, discarding it");
        self.ctx.emit(RunEvent::MarkerDiscarded {
            id: target.to_string(),
        });
        self.ctx.report.discarded_markers.push(target);
        true
    }

    fn skipped(&mut self, node: &Node) {
        debug!(id = %node.id, "already done, skipping");
        self.ctx.report.skipped.push(node.id.clone());
        self.ctx.emit(RunEvent::NodeSkipped {
            id: node.id.to_string(),
        });
    }

    fn failed(&mut self, node: &Node, error: &str) {
        warn!(id = %node.id, "{} failed: {error}", node.label);
        self.ctx
            .report
            .failures
            .push((node.id.clone(), error.to_string()));
        self.ctx.emit(RunEvent::NodeFailed {
            id: node.id.to_string(),
            error: error.to_string(),
        });
    }
}
