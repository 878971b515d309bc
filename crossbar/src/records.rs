//! Resolution call-path records and the per-call-tree shared state.
//!
//! One record stack and one resolve context exist per logical resolution call
//! tree, shared across nested resolutions and across containers. The state is
//! thread local and reference counted: the first [`StateGuard::acquire`]
//! constructs it, every nested resolve acquires it again, and the last
//! release resets it. Independent root resolutions therefore never observe
//! each other's frames or caches.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::identifier::ServiceIdentifier;
use crate::registry::Instance;

/// The cycle-relevant subset of the resolve options.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub(crate) struct OptionShape {
    pub(crate) by_ref: bool,
    pub(crate) dynamic: bool,
    pub(crate) multiple: bool,
}

impl OptionShape {
    pub(crate) fn breaks_cycles(&self) -> bool {
        self.by_ref || self.dynamic
    }
}

/// One frame of the resolution call path.
#[derive(Clone, Debug)]
pub(crate) enum ResolveRecord {
    /// A diagnostic note, such as a parent delegation.
    Message(String),
    /// An identifier-resolution attempt.
    Resolve {
        container_id: u64,
        identifier: ServiceIdentifier,
        shape: OptionShape,
    },
}

/// Append-only stack of resolution frames, restored to its prior length when
/// each nested call returns.
#[derive(Default)]
pub(crate) struct RecordStack {
    records: Vec<ResolveRecord>,
}

impl RecordStack {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn push(&mut self, record: ResolveRecord) {
        self.records.push(record);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub(crate) fn extend(&mut self, records: impl IntoIterator<Item = ResolveRecord>) {
        self.records.extend(records);
    }

    pub(crate) fn snapshot(&self) -> Vec<ResolveRecord> {
        self.records.clone()
    }

    /// Compares the most recently pushed frame against its ancestors.
    ///
    /// Two frames collide when they name the same container and identifier
    /// and neither carries `ref`/`dynamic`. The scan walks from the top frame
    /// downward and stops at the first ancestor that itself breaks the chain.
    /// Returns the rendered path with both colliding frames marked.
    pub(crate) fn find_cycle(&self) -> Option<String> {
        let last = self.records.len().checked_sub(1)?;
        let ResolveRecord::Resolve { container_id, identifier, shape } = &self.records[last]
        else {
            return None;
        };
        if shape.breaks_cycles() {
            return None;
        }
        let mut collision = None;
        for (index, record) in self.records[..last].iter().enumerate().rev() {
            let ResolveRecord::Resolve {
                container_id: ancestor_container,
                identifier: ancestor_identifier,
                shape: ancestor_shape,
            } = record
            else {
                continue;
            };
            if ancestor_shape.breaks_cycles() {
                break;
            }
            if ancestor_container == container_id && ancestor_identifier == identifier {
                collision = Some(index);
                break;
            }
        }
        collision.map(|index| self.render_marked(&[index, last]))
    }

    pub(crate) fn render(&self) -> String {
        self.render_marked(&[])
    }

    fn render_marked(&self, marked: &[usize]) -> String {
        let mut parts = Vec::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            let mut part = match record {
                ResolveRecord::Message(message) => format!("({message})"),
                ResolveRecord::Resolve { identifier, shape, .. } => {
                    let mut rendered = String::new();
                    if shape.by_ref {
                        rendered.push_str("[ref] ");
                    }
                    if shape.dynamic {
                        rendered.push_str("[dynamic] ");
                    }
                    rendered.push('"');
                    rendered.push_str(identifier.name());
                    rendered.push('"');
                    rendered
                }
            };
            if marked.contains(&index) {
                part = format!("(*) {part}");
            }
            parts.push(part);
        }
        parts.join(" -> ")
    }
}

/// The shared state of one resolution call tree: the record stack and the
/// resolve context backing resolution-scoped caching.
#[derive(Default)]
pub(crate) struct ResolveState {
    pub(crate) stack: RecordStack,
    context: HashMap<(u64, OptionShape), Instance>,
    refs: usize,
}

impl ResolveState {
    pub(crate) fn context_get(&self, key: &(u64, OptionShape)) -> Option<Instance> {
        self.context.get(key).cloned()
    }

    pub(crate) fn context_insert(&mut self, key: (u64, OptionShape), instance: Instance) {
        self.context.insert(key, instance);
    }
}

thread_local! {
    static STATE: RefCell<Option<ResolveState>> = const { RefCell::new(None) };
}

/// Reference-counted handle on the thread's resolve state.
///
/// Lazily constructs the state on first acquire and resets it when the last
/// guard drops, so re-entrant root resolutions on one thread each start from
/// a clean stack and context.
pub(crate) struct StateGuard {
    _not_send: PhantomData<*const ()>,
}

impl StateGuard {
    pub(crate) fn acquire() -> Self {
        STATE.with(|slot| {
            let mut slot = slot.borrow_mut();
            let state = slot.get_or_insert_with(ResolveState::default);
            state.refs += 1;
        });
        Self { _not_send: PhantomData }
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        STATE.with(|slot| {
            let mut slot = slot.borrow_mut();
            let Some(state) = slot.as_mut() else {
                return;
            };
            state.refs -= 1;
            if state.refs == 0 {
                // The root call must leave a fully unwound stack behind. A
                // leftover frame is an engine bug, not a user error.
                if !state.stack.is_empty() {
                    tracing::error!(
                        depth = state.stack.len(),
                        "resolve record stack was not fully unwound; resetting"
                    );
                }
                *slot = None;
            }
        });
    }
}

/// Runs `f` against the thread's resolve state. A guard must be held.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut ResolveState) -> R) -> R {
    STATE.with(|slot| {
        let mut slot = slot.borrow_mut();
        let state = slot
            .as_mut()
            .expect("resolve state is only accessed while a StateGuard is held");
        f(state)
    })
}
