//! In-place replacement inside a single container
//!
//! The [`Mutator`] rewrites every slot of one container that holds the
//! target by identity, and reports the references it saw in every other slot
//! so the scheduler can visit them next. A slot that refuses the write is
//! reported as a [`MutationError`] and the pass carries on with the rest.

use crate::classify::{Container, ContainerKind};
use crate::error::MutationError;
use hotswap_heap::{Frame, LocalBindings, ObjRef, Object, ObjectId, Record, Value};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::sync::Arc;

/// Location of a rewritten slot inside its holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Value stored under a mapping key
    Entry(Value),
    /// The mapping key itself
    Key,
    /// Sequence position
    Index(usize),
    /// Set membership
    Member,
    /// Record field
    Field(String),
    /// Frame-local binding
    Local(String),
}

/// One slot rewritten from the target to the substitute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Object or frame owning the slot
    pub holder: ObjectId,
    /// Classification of the holder
    pub kind: ContainerKind,
    /// Which slot changed
    pub slot: Slot,
}

/// Everything a single mutation pass produced
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// Slots rewritten
    pub rewrites: Vec<Rewrite>,
    /// Slots that refused the write
    pub failures: Vec<MutationError>,
    /// References found in non-matching slots, to be visited next
    pub children: Vec<ObjRef>,
}

impl RewriteOutcome {
    fn descend(&mut self, value: &Value) {
        if let Value::Ref(obj) = value {
            self.children.push(Arc::clone(obj));
        }
    }
}

/// Tally of a pass, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Slots rewritten
    pub rewritten: usize,
    /// Slots that refused the write
    pub failed: usize,
    /// References queued for visiting
    pub children: usize,
}

impl From<&RewriteOutcome> for PassSummary {
    fn from(outcome: &RewriteOutcome) -> Self {
        Self {
            rewritten: outcome.rewrites.len(),
            failed: outcome.failures.len(),
            children: outcome.children.len(),
        }
    }
}

/// Rewrites references to `target` into references to `substitute`
#[derive(Debug, Clone)]
pub struct Mutator {
    target: ObjRef,
    substitute: ObjRef,
}

impl Mutator {
    /// Create a mutator for one (target, substitute) pair
    #[inline]
    #[must_use]
    pub fn new(target: ObjRef, substitute: ObjRef) -> Self {
        Self { target, substitute }
    }

    /// Object being replaced
    #[inline]
    #[must_use]
    pub fn target(&self) -> &ObjRef {
        &self.target
    }

    /// Object replacing it
    #[inline]
    #[must_use]
    pub fn substitute(&self) -> &ObjRef {
        &self.substitute
    }

    /// Whether the pair is a self-replacement
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        Arc::ptr_eq(&self.target, &self.substitute)
    }

    fn matches(&self, value: &Value) -> bool {
        value.is(&self.target)
    }

    fn replacement(&self) -> Value {
        Value::Ref(Arc::clone(&self.substitute))
    }

    /// Rewrite one heap object in place
    ///
    /// A frozen object is read instead: every slot holding the target is
    /// reported as a failure and the other references are still returned.
    pub fn rewrite_object(&self, obj: &Object) -> RewriteOutcome {
        let mut out = RewriteOutcome::default();
        let holder = obj.id();
        match obj.write() {
            Ok(mut body) => match Container::classify(&mut body) {
                Container::Mapping(map) => self.rewrite_mapping(holder, map, &mut out),
                Container::Sequence(items) => self.rewrite_sequence(holder, items, &mut out),
                Container::Set(members) => self.rewrite_set(holder, members, &mut out),
                Container::Record(record) => self.rewrite_record(holder, record, &mut out),
                Container::Opaque => {}
            },
            Err(_) => self.inspect_frozen(obj, &mut out),
        }
        out
    }

    /// Rewrite the locals of an active frame
    ///
    /// Locals are matched on a snapshot; only the names that matched are
    /// written back, so a local the frame reassigns meanwhile keeps its new
    /// value. The global scope is a shared heap mapping, so it is returned as
    /// the first child to be visited like any other object.
    pub fn rewrite_frame(&self, frame: &Frame) -> RewriteOutcome {
        let mut out = RewriteOutcome::default();
        out.children.push(Arc::clone(frame.globals()));

        let rebound = self.rebind_locals(frame.id(), &frame.local_bindings(), &mut out);
        if !rebound.is_empty() {
            frame.commit_locals(&rebound);
        }
        out
    }

    /// Bindings for the snapshot locals that held the target
    fn rebind_locals(&self, holder: ObjectId, snapshot: &LocalBindings, out: &mut RewriteOutcome) -> LocalBindings {
        let mut rebound = LocalBindings::default();
        for (name, value) in snapshot.iter() {
            if self.matches(value) {
                rebound.rebind(name, self.replacement());
                out.rewrites.push(Rewrite {
                    holder,
                    kind: ContainerKind::Frame,
                    slot: Slot::Local(name.to_string()),
                });
            } else {
                out.descend(value);
            }
        }
        rebound
    }

    fn rewrite_mapping(&self, holder: ObjectId, map: &mut IndexMap<Value, Value>, out: &mut RewriteOutcome) {
        let keys: Vec<Value> = map.keys().cloned().collect();
        for key in keys {
            if let Some(value) = map.get_mut(&key) {
                if self.matches(value) {
                    *value = self.replacement();
                    out.rewrites.push(Rewrite {
                        holder,
                        kind: ContainerKind::Mapping,
                        slot: Slot::Entry(key.clone()),
                    });
                } else {
                    out.descend(value);
                }
            }

            if self.matches(&key) {
                if self.is_identity() {
                    continue;
                }
                if let Some(value) = map.shift_remove(&key) {
                    // last write wins if the substitute is already a key
                    map.insert(self.replacement(), value);
                    out.rewrites.push(Rewrite {
                        holder,
                        kind: ContainerKind::Mapping,
                        slot: Slot::Key,
                    });
                }
            } else {
                out.descend(&key);
            }
        }
    }

    fn rewrite_sequence(&self, holder: ObjectId, items: &mut [Value], out: &mut RewriteOutcome) {
        for (index, item) in items.iter_mut().enumerate() {
            if self.matches(item) {
                *item = self.replacement();
                out.rewrites.push(Rewrite {
                    holder,
                    kind: ContainerKind::Sequence,
                    slot: Slot::Index(index),
                });
            } else {
                out.descend(item);
            }
        }
    }

    fn rewrite_set(&self, holder: ObjectId, members: &mut IndexSet<Value>, out: &mut RewriteOutcome) {
        for member in members.iter().filter(|m| !self.matches(m)) {
            out.descend(member);
        }
        let target = Value::Ref(Arc::clone(&self.target));
        if !self.is_identity() && members.shift_remove(&target) {
            members.insert(self.replacement());
            out.rewrites.push(Rewrite {
                holder,
                kind: ContainerKind::Set,
                slot: Slot::Member,
            });
        }
    }

    fn rewrite_record(&self, holder: ObjectId, record: &mut dyn Record, out: &mut RewriteOutcome) {
        for (name, value) in record.fields() {
            if !self.matches(&value) {
                out.descend(&value);
                continue;
            }
            match record.set_field(&name, self.replacement()) {
                Ok(()) => out.rewrites.push(Rewrite {
                    holder,
                    kind: ContainerKind::Record,
                    slot: Slot::Field(name),
                }),
                Err(source) => out.failures.push(MutationError::Field { holder, source }),
            }
        }
    }

    fn inspect_frozen(&self, obj: &Object, out: &mut RewriteOutcome) {
        let body = obj.read();
        let kind = ContainerKind::from(body.kind());
        if body.holds(&self.target) {
            out.failures.push(MutationError::Frozen { holder: obj.id(), kind });
        }
        out.children.extend(
            body.references()
                .into_iter()
                .filter(|child| !Arc::ptr_eq(child, &self.target)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_heap::{DynRecord, FieldError, Heap};
    use pretty_assertions::assert_eq;

    fn pair(heap: &Heap) -> (ObjRef, ObjRef, Mutator) {
        let target = heap.mapping([(Value::str("old"), Value::str("example"))]);
        let substitute = heap.mapping([(Value::str("new_key"), Value::str("new_value"))]);
        let mutator = Mutator::new(target.clone(), substitute.clone());
        (target, substitute, mutator)
    }

    #[test]
    fn sequence_positions_are_rewritten_in_place() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let other = heap.sequence([]);
        let seq = heap.sequence([
            Value::from(&target),
            Value::str("shared_item"),
            Value::from(&other),
            Value::from(&target),
        ]);

        let out = mutator.rewrite_object(&seq);

        assert!(seq.at(0).unwrap().is(&substitute));
        assert_eq!(seq.at(1), Some(Value::str("shared_item")));
        assert!(seq.at(3).unwrap().is(&substitute));
        let slots: Vec<Slot> = out.rewrites.into_iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![Slot::Index(0), Slot::Index(3)]);
        assert_eq!(out.children.len(), 1);
        assert!(Arc::ptr_eq(&out.children[0], &other));
    }

    #[test]
    fn mapping_values_and_keys_are_rewritten() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let map = heap.mapping([
            (Value::str("nested"), Value::from(&target)),
            (Value::from(&target), Value::Int(7)),
        ]);

        let out = mutator.rewrite_object(&map);

        assert!(map.get(&Value::str("nested")).unwrap().is(&substitute));
        assert_eq!(map.get(&Value::from(&substitute)), Some(Value::Int(7)));
        assert!(!map.contains(&Value::from(&target)));
        assert_eq!(out.rewrites.len(), 2);
        assert!(out.failures.is_empty());
    }

    #[test]
    fn moved_key_overwrites_existing_substitute_key() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let map = heap.mapping([
            (Value::from(&substitute), Value::Int(1)),
            (Value::from(&target), Value::Int(2)),
        ]);

        mutator.rewrite_object(&map);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Value::from(&substitute)), Some(Value::Int(2)));
    }

    #[test]
    fn set_membership_is_swapped() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let set = heap.set([Value::from(&target), Value::Int(1)]);

        let out = mutator.rewrite_object(&set);

        assert!(set.contains(&Value::from(&substitute)));
        assert!(!set.contains(&Value::from(&target)));
        assert_eq!(set.len(), 2);
        assert_eq!(out.rewrites[0].slot, Slot::Member);
    }

    #[test]
    fn set_already_holding_the_substitute_collapses() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let set = heap.set([Value::from(&target), Value::from(&substitute)]);

        mutator.rewrite_object(&set);

        assert_eq!(set.len(), 1);
        assert!(set.contains(&Value::from(&substitute)));
    }

    #[test]
    fn read_only_field_fails_without_stopping_the_record() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let record = heap.record(
            DynRecord::new("Service")
                .with_read_only("config", &target)
                .with_field("cache", &target),
        );

        let out = mutator.rewrite_object(&record);

        assert!(record.field("config").unwrap().is(&target));
        assert!(record.field("cache").unwrap().is(&substitute));
        assert_eq!(
            out.failures,
            vec![MutationError::Field {
                holder: record.id(),
                source: FieldError::ReadOnly("config".into()),
            }]
        );
    }

    #[test]
    fn frozen_container_reports_failure_and_still_yields_children() {
        let heap = Heap::new();
        let (target, _substitute, mutator) = pair(&heap);
        let inner = heap.sequence([]);
        let tuple = heap.sequence([Value::from(&target), Value::from(&inner)]);
        tuple.freeze();

        let out = mutator.rewrite_object(&tuple);

        assert!(tuple.at(0).unwrap().is(&target));
        assert_eq!(
            out.failures,
            vec![MutationError::Frozen {
                holder: tuple.id(),
                kind: ContainerKind::Sequence,
            }]
        );
        assert_eq!(out.children.len(), 1);
        assert!(Arc::ptr_eq(&out.children[0], &inner));
    }

    #[test]
    fn frame_locals_are_committed_and_globals_handed_back() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let globals = heap.mapping([(Value::str("SERVICE"), Value::from(&target))]);
        let frame = Frame::new(
            "handler",
            globals.clone(),
            [("svc", Value::from(&target)), ("n", Value::Int(1))],
        );

        let out = mutator.rewrite_frame(&frame);

        assert!(frame.local("svc").unwrap().is(&substitute));
        assert_eq!(frame.local("n"), Some(Value::Int(1)));
        assert_eq!(out.rewrites[0].slot, Slot::Local("svc".into()));
        assert_eq!(PassSummary::from(&out).rewritten, 1);
        assert!(Arc::ptr_eq(&out.children[0], &globals));

        mutator.rewrite_object(&out.children[0]);
        assert!(frame.global("SERVICE").unwrap().is(&substitute));
    }

    #[test]
    fn locals_reassigned_after_the_snapshot_are_kept() {
        let heap = Heap::new();
        let (target, substitute, mutator) = pair(&heap);
        let frame = Frame::new(
            "handler",
            heap.mapping([]),
            [("svc", Value::from(&target)), ("n", Value::Int(1))],
        );

        let snapshot = frame.local_bindings();
        frame.set_local("n", Value::Int(99));
        let mut out = RewriteOutcome::default();
        let rebound = mutator.rebind_locals(frame.id(), &snapshot, &mut out);
        frame.commit_locals(&rebound);

        assert_eq!(rebound.len(), 1);
        assert_eq!(frame.local("n"), Some(Value::Int(99)));
        assert!(frame.local("svc").unwrap().is(&substitute));
        assert_eq!(out.rewrites.len(), 1);
    }

    #[test]
    fn untouched_frame_is_not_recommitted() {
        let heap = Heap::new();
        let (_target, _substitute, mutator) = pair(&heap);
        let frame = Frame::new("idle", heap.mapping([]), [("n", Value::Int(3))]);

        let out = mutator.rewrite_frame(&frame);

        assert!(out.rewrites.is_empty());
        assert_eq!(frame.local("n"), Some(Value::Int(3)));
    }

    #[test]
    fn self_replacement_leaves_containers_unchanged() {
        let heap = Heap::new();
        let target = heap.sequence([]);
        let mutator = Mutator::new(target.clone(), target.clone());
        let map = heap.mapping([
            (Value::from(&target), Value::Int(1)),
            (Value::str("z"), Value::Int(2)),
        ]);

        mutator.rewrite_object(&map);

        let keys: Vec<Value> = match &*map.read() {
            hotswap_heap::Body::Mapping(m) => m.keys().cloned().collect(),
            _ => unreachable!(),
        };
        assert_eq!(keys, vec![Value::from(&target), Value::str("z")]);
    }

    #[test]
    fn opaque_objects_are_terminal() {
        let heap = Heap::new();
        let (_target, _substitute, mutator) = pair(&heap);
        let out = mutator.rewrite_object(&heap.opaque("socket", 9_u16));
        assert_eq!(PassSummary::from(&out), PassSummary::default());
    }
}
