use std::slice;

use crate::{MAX_IDLE_STATES, StateDescriptor, StateIndex};

/// Ordered, validated set of idle states available on the platform.
///
/// States are ordered from the shallowest (fastest exit, lowest savings) to the deepest. The
/// order is the order in which the firmware reported the states - the table does not sort
/// them, so inconsistent firmware data is reflected as-is.
///
/// Guarantees:
///
/// * Index 0 is always the built-in polling state.
/// * Every state has an executor.
/// * There are at most [`MAX_IDLE_STATES`] states.
///
/// A table is built once by the [`CatalogBuilder`][crate::CatalogBuilder] and is read-only
/// afterwards, so it can be shared between all processors without synchronization.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StateTable {
    // Never empty: index 0 holds the polling state.
    states: Box<[StateDescriptor]>,
}

impl StateTable {
    /// Creates a table from the states that follow the polling state.
    ///
    /// The caller is responsible for capping and hole-filtering `deeper_states`.
    pub(crate) fn new(deeper_states: Vec<StateDescriptor>) -> Self {
        debug_assert!(deeper_states.len() < MAX_IDLE_STATES.get());
        debug_assert!(deeper_states.iter().all(|s| s.executor().is_some()));

        let states = [StateDescriptor::SNOOZE]
            .into_iter()
            .chain(deeper_states)
            .collect();

        Self { states }
    }

    /// A table that contains only the polling state.
    pub(crate) fn polling_only() -> Self {
        Self::new(Vec::new())
    }

    /// Number of states in the table. Always at least 1.
    #[must_use]
    #[inline]
    #[expect(clippy::len_without_is_empty, reason = "a table is never empty")]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns the state at `index`, if there is one.
    #[must_use]
    #[inline]
    pub fn get(&self, index: StateIndex) -> Option<&StateDescriptor> {
        self.states.get(index)
    }

    /// The polling state at index 0.
    #[must_use]
    #[inline]
    #[expect(
        clippy::indexing_slicing,
        reason = "the polling state is always present"
    )]
    pub fn polling_state(&self) -> &StateDescriptor {
        &self.states[0]
    }

    /// Whether the platform offers anything beyond the polling state.
    ///
    /// With a single state there is nothing to yield to, so adaptive snooze timeouts are off.
    #[must_use]
    #[inline]
    pub fn has_deeper_states(&self) -> bool {
        self.states.len() > 1
    }

    /// Iterates over the states in table order.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, StateDescriptor> {
        self.states.iter()
    }

    /// The states in table order.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[StateDescriptor] {
        &self.states
    }
}

impl<'a> IntoIterator for &'a StateTable {
    type Item = &'a StateDescriptor;
    type IntoIter = slice::Iter<'a, StateDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
