//! Conditions: events that aggregate child events.
//!
//! A condition is re-evaluated each time one of its children completes. The
//! first time its evaluator holds, it freezes the list of succeeded children
//! and triggers itself with that list as its value; later child completions
//! are ignored.
//!
//! Children are settled one position at a time, in the order they were
//! given, with the evaluator consulted after each. The result lists the
//! succeeded positions in that same order. An event listed twice under `and`
//! therefore appears twice, while under `or` the first position already
//! satisfies the condition.
//!
//! Conditions compose structurally. A condition used as a child contributes
//! itself to its parent's result, never its own children.

use std::{collections::HashSet, fmt, rc::Rc};
use tracing::trace;

use crate::{
    error::{SimulationError, SimulationResult},
    sim::{
        agenda::Tier,
        event::{extract, AnyEvent, Event, EventId, EventKind, EventState, Outcome, Value},
        world::{EnvInner, Environment},
    },
};

/// An event whose value is the frozen list of children that had succeeded when it fired.
pub type Condition = Event<Vec<AnyEvent>>;

type Predicate = Box<dyn Fn(&ConditionView) -> bool>;

pub(crate) enum Evaluator {
    All,
    Any,
    Custom(Predicate),
}

impl Evaluator {
    fn holds(&self, view: &ConditionView) -> bool {
        match self {
            Evaluator::All => view.all_succeeded(),
            Evaluator::Any => view.any_succeeded(),
            Evaluator::Custom(predicate) => predicate(view),
        }
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::All => write!(f, "All"),
            Evaluator::Any => write!(f, "Any"),
            Evaluator::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Bookkeeping of a condition that has not fired yet.
///
/// Children are tracked per position, so an event listed twice is settled
/// twice, one position at a time, with the evaluator consulted in between.
#[derive(Debug)]
pub(crate) struct ConditionState {
    children: Vec<AnyEvent>,
    evaluator: Evaluator,
    settled: Vec<ChildSnapshot>,
}

impl ConditionState {
    fn new(children: Vec<AnyEvent>, evaluator: Evaluator) -> Self {
        let settled = vec![ChildSnapshot::PENDING; children.len()];
        Self {
            children,
            evaluator,
            settled,
        }
    }

    /// Settles the position at `index` and reports whether the evaluator now holds.
    fn settle_position(&mut self, index: usize, state: EventState, value: Option<Value>) -> bool {
        self.settled[index] = ChildSnapshot { state, value };
        self.holds()
    }

    /// Settles every still-pending position held by `child`, stopping at the
    /// first one after which the evaluator holds.
    fn settle(&mut self, child: EventId, state: EventState, value: Option<Value>) -> bool {
        for index in 0..self.children.len() {
            if self.children[index].id != child || self.settled[index].state.is_done() {
                continue;
            }
            if self.settle_position(index, state, value.clone()) {
                return true;
            }
        }
        false
    }

    fn holds(&self) -> bool {
        self.evaluator.holds(&self.view())
    }

    fn view(&self) -> ConditionView {
        ConditionView {
            children: self.settled.clone(),
            fired: self
                .settled
                .iter()
                .filter(|child| child.state == EventState::Succeeded)
                .count(),
        }
    }

    /// Succeeded positions, in the order the children were given.
    fn result(&self) -> Vec<AnyEvent> {
        self.children
            .iter()
            .zip(&self.settled)
            .filter(|(_, child)| child.state == EventState::Succeeded)
            .map(|(event, _)| event.clone())
            .collect()
    }
}

#[derive(Clone)]
struct ChildSnapshot {
    state: EventState,
    value: Option<Value>,
}

impl ChildSnapshot {
    const PENDING: ChildSnapshot = ChildSnapshot {
        state: EventState::Pending,
        value: None,
    };
}

impl fmt::Debug for ChildSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.state)
    }
}

/// Snapshot of a condition's children handed to custom predicates.
///
/// Positions follow the order in which the children were given.
#[derive(Clone)]
pub struct ConditionView {
    children: Vec<ChildSnapshot>,
    fired: usize,
}

impl ConditionView {
    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if the condition has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// State of the child at `index`.
    pub fn state(&self, index: usize) -> Option<EventState> {
        self.children.get(index).map(|child| child.state)
    }

    /// Returns `true` if the child at `index` has succeeded.
    pub fn succeeded(&self, index: usize) -> bool {
        self.state(index) == Some(EventState::Succeeded)
    }

    /// Returns `true` if the child at `index` has failed.
    pub fn failed(&self, index: usize) -> bool {
        self.state(index) == Some(EventState::Failed)
    }

    /// Value of the child at `index`, once it is done and if it is a `T`.
    pub fn value<T: Clone + 'static>(&self, index: usize) -> Option<T> {
        self.children
            .get(index)
            .and_then(|child| child.value.as_ref())
            .and_then(extract::<T>)
    }

    /// Number of entries in the result collected so far.
    pub fn fired(&self) -> usize {
        self.fired
    }

    /// Returns `true` if every child has succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.children
            .iter()
            .all(|child| child.state == EventState::Succeeded)
    }

    /// Returns `true` if at least one child has succeeded.
    pub fn any_succeeded(&self) -> bool {
        self.children
            .iter()
            .any(|child| child.state == EventState::Succeeded)
    }

    /// Returns `true` if at least one child has failed.
    pub fn any_failed(&self) -> bool {
        self.children
            .iter()
            .any(|child| child.state == EventState::Failed)
    }
}

impl fmt::Debug for ConditionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionView")
            .field(
                "states",
                &self.children.iter().map(|c| c.state).collect::<Vec<_>>(),
            )
            .field("fired", &self.fired)
            .finish()
    }
}

impl Environment {
    /// Condition that fires once every child has succeeded.
    ///
    /// # Example
    ///
    /// ```rust
    /// use desim::Environment;
    ///
    /// let env = Environment::new();
    /// let fast = env.timeout(1.0).unwrap();
    /// let slow = env.timeout(2.0).unwrap();
    /// let both = env.all_of([&fast, &slow]).unwrap();
    ///
    /// env.run().unwrap();
    /// assert_eq!(both.value().unwrap(), vec![fast.erase(), slow.erase()]);
    /// ```
    pub fn all_of<I, E>(&self, children: I) -> SimulationResult<Condition>
    where
        I: IntoIterator<Item = E>,
        E: Into<AnyEvent>,
    {
        self.build_condition(children.into_iter().map(Into::into).collect(), Evaluator::All)
    }

    /// Condition that fires once at least one child has succeeded.
    pub fn any_of<I, E>(&self, children: I) -> SimulationResult<Condition>
    where
        I: IntoIterator<Item = E>,
        E: Into<AnyEvent>,
    {
        self.build_condition(children.into_iter().map(Into::into).collect(), Evaluator::Any)
    }

    /// Condition that fires the first time `predicate` holds over its children.
    ///
    /// The predicate is evaluated at construction and after every child
    /// completion, and must not call back into the environment.
    pub fn condition<I, E, P>(&self, children: I, predicate: P) -> SimulationResult<Condition>
    where
        I: IntoIterator<Item = E>,
        E: Into<AnyEvent>,
        P: Fn(&ConditionView) -> bool + 'static,
    {
        self.build_condition(
            children.into_iter().map(Into::into).collect(),
            Evaluator::Custom(Box::new(predicate)),
        )
    }

    pub(crate) fn build_condition(
        &self,
        children: Vec<AnyEvent>,
        evaluator: Evaluator,
    ) -> SimulationResult<Condition> {
        if children.len() < 2 {
            return Err(SimulationError::TooFewChildren(children.len()));
        }
        if children.iter().any(|child| !child.belongs_to(self)) {
            return Err(SimulationError::ForeignEnvironment);
        }

        let (id, done) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.alloc_event(EventKind::Condition);
            let done: Vec<(usize, EventState, Option<Value>)> = children
                .iter()
                .enumerate()
                .filter_map(|(index, child)| {
                    let slot = inner.slot(child.id);
                    slot
                        .is_done()
                        .then(|| (index, slot.state, slot.settled_value()))
                })
                .collect();
            (id, done)
        };

        let mut state = ConditionState::new(children, evaluator);
        let holds = if done.is_empty() {
            state.holds()
        } else {
            done.into_iter()
                .any(|(index, child_state, value)| state.settle_position(index, child_state, value))
        };

        let mut inner = self.inner.borrow_mut();
        if holds {
            let result = state.result();
            trace!(condition = %id, fired = result.len(), "condition holds at construction");
            fire(&mut inner, id, result);
        } else {
            let mut seen = HashSet::new();
            for child in state.children.iter().map(|child| child.id) {
                if !seen.insert(child) {
                    continue;
                }
                let slot = inner.slot_mut(child);
                if !slot.is_done() && !slot.parents.contains(&id) {
                    slot.parents.push(id);
                }
            }
            inner.conditions.insert(id, state);
        }
        drop(inner);

        Ok(Event::new(id, self.downgrade()))
    }

    /// Re-evaluates `condition` after `child` completed.
    pub(crate) fn notify_condition(&self, condition: EventId, child: EventId) {
        let (mut state, child_state, value) = {
            let mut inner = self.inner.borrow_mut();
            let Some(state) = inner.conditions.remove(&condition) else {
                return;
            };
            let slot = inner.slot(child);
            (state, slot.state, slot.settled_value())
        };

        let holds = state.settle(child, child_state, value);

        let mut inner = self.inner.borrow_mut();
        if holds {
            trace!(condition = %condition, child = %child, "condition fired");
            fire(&mut inner, condition, state.result());
        } else {
            inner.conditions.insert(condition, state);
        }
    }
}

fn fire(inner: &mut EnvInner, id: EventId, fired: Vec<AnyEvent>) {
    inner.trigger(id, Outcome::Success, Rc::new(fired), 0.0, Tier::Normal);
}
