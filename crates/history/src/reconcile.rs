//! Keyed diff between the rendered history and an incoming page.
//!
//! Elements are matched by record id. An element whose status did not change
//! is kept verbatim and only moved when its slot would otherwise be wrong, so
//! re-reconciling an unchanged page produces no work for the render sink.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::record::{Record, RecordId, RecordStatus};
use crate::sink::RenderSink;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Reuse the element as is.
    Keep { id: RecordId },
    Create { record: Record, position: usize },
    /// Regenerate content in place; identity and position are preserved.
    UpdateContent { record: Record },
    Move { id: RecordId, position: usize },
    Remove { id: RecordId },
}

impl Operation {
    pub fn id(&self) -> &RecordId {
        match self {
            Operation::Keep { id } | Operation::Move { id, .. } | Operation::Remove { id } => id,
            Operation::Create { record, .. } | Operation::UpdateContent { record } => &record.id,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Operation::Keep { .. })
    }
}

/// A reported status that would move a rendered record out of a terminal
/// state. Never applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusViolation {
    pub id: RecordId,
    pub rendered: RecordStatus,
    pub reported: RecordStatus,
}

/// Ordered operations for one reconciliation. Removals come first so that
/// `Create` and `Move` positions are absolute indices at the moment they
/// apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub operations: Vec<Operation>,
    pub violations: Vec<StatusViolation>,
}

impl Patch {
    /// True when applying the patch would not touch the render sink.
    pub fn is_noop(&self) -> bool {
        self.operations.iter().all(Operation::is_keep)
    }

    pub fn changes(&self) -> usize {
        self.operations.iter().filter(|op| !op.is_keep()).count()
    }

    pub fn created(&self) -> usize {
        self.count(|op| matches!(op, Operation::Create { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|op| matches!(op, Operation::UpdateContent { .. }))
    }

    pub fn moved(&self) -> usize {
        self.count(|op| matches!(op, Operation::Move { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|op| matches!(op, Operation::Remove { .. }))
    }

    fn count(&self, pred: impl Fn(&Operation) -> bool) -> usize {
        self.operations.iter().filter(|op| pred(op)).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Nothing exists on the backend; the caller should show its placeholder.
    Empty,
    Patched(Patch),
}

impl Reconciliation {
    pub fn patch(&self) -> Option<&Patch> {
        match self {
            Reconciliation::Empty => None,
            Reconciliation::Patched(patch) => Some(patch),
        }
    }
}

/// Diff `incoming` against the rendered order.
///
/// `previous` holds the last status rendered for each id. Only rendered ids
/// within the first `scope` slots are candidates for removal; anything past
/// it belongs to a region another request is responsible for.
pub fn plan(
    previous: &HashMap<RecordId, RecordStatus>,
    rendered: &[RecordId],
    incoming: &[Record],
    scope: usize,
) -> Patch {
    let scope = scope.min(rendered.len());
    let incoming_ids: HashSet<&RecordId> = incoming.iter().map(|r| &r.id).collect();
    let mut patch = Patch::default();

    let removed: HashSet<&RecordId> = rendered[..scope]
        .iter()
        .filter(|id| !incoming_ids.contains(id))
        .collect();
    for id in rendered[..scope].iter().filter(|id| removed.contains(id)) {
        patch.operations.push(Operation::Remove { id: id.clone() });
    }

    let mut slots: Vec<&RecordId> = rendered.iter().filter(|id| !removed.contains(id)).collect();
    let present: HashSet<&RecordId> = slots.iter().copied().collect();
    let mut placed: HashSet<&RecordId> = HashSet::with_capacity(incoming.len());
    let mut cursor = 0;

    for record in incoming {
        if !placed.insert(&record.id) {
            warn!("Record {} appears twice in one page, ignoring repeat", record.id);
            continue;
        }

        if !present.contains(&record.id) {
            let position = cursor.min(slots.len());
            slots.insert(position, &record.id);
            patch.operations.push(Operation::Create {
                record: record.clone(),
                position,
            });
            cursor += 1;
            continue;
        }

        match previous.get(&record.id).copied() {
            Some(known) if known == record.status => {
                patch.operations.push(Operation::Keep {
                    id: record.id.clone(),
                });
            }
            Some(known) if !known.can_transition_to(record.status) => {
                patch.violations.push(StatusViolation {
                    id: record.id.clone(),
                    rendered: known,
                    reported: record.status,
                });
                patch.operations.push(Operation::Keep {
                    id: record.id.clone(),
                });
            }
            _ => patch.operations.push(Operation::UpdateContent {
                record: record.clone(),
            }),
        }

        if slots.get(cursor) != Some(&&record.id) {
            if let Some(current) = slots.iter().position(|id| *id == &record.id) {
                slots.remove(current);
                let position = cursor.min(slots.len());
                slots.insert(position, &record.id);
                patch.operations.push(Operation::Move {
                    id: record.id.clone(),
                    position,
                });
            }
        }
        cursor += 1;
    }

    patch
}

/// Stateless form: statuses come from the previous snapshot and every
/// rendered element is in scope.
pub fn reconcile(previous: &[Record], incoming: &[Record], rendered: &[RecordId]) -> Patch {
    let statuses: HashMap<RecordId, RecordStatus> = previous
        .iter()
        .map(|r| (r.id.clone(), r.status))
        .collect();
    plan(&statuses, rendered, incoming, rendered.len())
}

/// Owns the rendered set and drives a [`RenderSink`] with the operations it
/// plans.
#[derive(Debug)]
pub struct ListReconciler<S> {
    sink: S,
    order: Vec<RecordId>,
    known: HashMap<RecordId, Record>,
    placeholder: bool,
}

impl<S: RenderSink> ListReconciler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            order: Vec::new(),
            known: HashMap::new(),
            placeholder: false,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn rendered_ids(&self) -> &[RecordId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn placeholder_visible(&self) -> bool {
        self.placeholder
    }

    /// Last applied record for a rendered id.
    pub fn record(&self, id: &RecordId) -> Option<&Record> {
        self.known.get(id)
    }

    /// Rendered records in display order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|id| self.known.get(id))
    }

    pub fn pending_count(&self) -> usize {
        self.known.values().filter(|r| r.is_pending()).count()
    }

    /// Reconcile a snapshot that covers the whole rendered set.
    pub fn reconcile(&mut self, incoming: &[Record], known_total: usize) -> Reconciliation {
        let scope = self.order.len();
        self.reconcile_window(incoming, scope, known_total)
    }

    /// Reconcile a snapshot that covers the first `scope` rendered elements.
    pub fn reconcile_window(
        &mut self,
        incoming: &[Record],
        scope: usize,
        known_total: usize,
    ) -> Reconciliation {
        let statuses: HashMap<RecordId, RecordStatus> = self
            .known
            .iter()
            .map(|(id, record)| (id.clone(), record.status))
            .collect();
        let patch = plan(&statuses, &self.order, incoming, scope);
        self.apply(&patch);

        for violation in &patch.violations {
            warn!(
                "Protocol violation: record {} reported {} after {} was rendered",
                violation.id, violation.reported, violation.rendered
            );
        }

        let violated: HashSet<&RecordId> = patch.violations.iter().map(|v| &v.id).collect();
        for record in incoming {
            if !violated.contains(&record.id) && self.known.contains_key(&record.id) {
                self.known.insert(record.id.clone(), record.clone());
            }
        }

        if incoming.is_empty() && known_total == 0 {
            self.set_placeholder(true);
            return Reconciliation::Empty;
        }
        if !self.order.is_empty() {
            self.set_placeholder(false);
        }

        debug!(
            "Reconciled {} records: {} created, {} updated, {} moved, {} removed",
            incoming.len(),
            patch.created(),
            patch.updated(),
            patch.moved(),
            patch.removed()
        );
        Reconciliation::Patched(patch)
    }

    /// Append a page of records past the end of the rendered set. Ids that are
    /// already rendered are skipped.
    pub fn append(&mut self, incoming: &[Record]) -> Patch {
        let mut patch = Patch::default();
        let mut position = self.order.len();
        let mut seen: HashSet<&RecordId> = HashSet::with_capacity(incoming.len());

        for record in incoming {
            if self.known.contains_key(&record.id) || !seen.insert(&record.id) {
                debug!("Record {} is already rendered, not appending", record.id);
                continue;
            }
            patch.operations.push(Operation::Create {
                record: record.clone(),
                position,
            });
            position += 1;
        }

        self.apply(&patch);
        if !self.order.is_empty() {
            self.set_placeholder(false);
        }
        patch
    }

    fn apply(&mut self, patch: &Patch) {
        for op in &patch.operations {
            match op {
                Operation::Keep { .. } => {}
                Operation::Create { record, position } => {
                    let position = (*position).min(self.order.len());
                    self.sink.create(&record.id, record, position);
                    self.order.insert(position, record.id.clone());
                    self.known.insert(record.id.clone(), record.clone());
                }
                Operation::UpdateContent { record } => {
                    self.sink.update_content(&record.id, record);
                    self.known.insert(record.id.clone(), record.clone());
                }
                Operation::Move { id, position } => {
                    if let Some(current) = self.order.iter().position(|x| x == id) {
                        let id = self.order.remove(current);
                        let position = (*position).min(self.order.len());
                        self.sink.move_to(&id, position);
                        self.order.insert(position, id);
                    }
                }
                Operation::Remove { id } => {
                    self.sink.remove(id);
                    self.order.retain(|x| x != id);
                    self.known.remove(id);
                }
            }
        }
    }

    fn set_placeholder(&mut self, visible: bool) {
        if self.placeholder != visible {
            self.placeholder = visible;
            self.sink.set_placeholder(visible);
        }
    }
}
