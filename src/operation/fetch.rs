//! Fixed fan-out fetch: a known set of sub-responses, complete when all
//! have arrived in any order.

extern crate alloc;
use alloc::collections::BTreeSet;

/// Identifies one expected reply of a fan-out fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubResponse {
    Steps(u8),
    Sleep(u8),
    Training,
}

#[derive(Debug, Clone)]
pub struct FanOut {
    expected: BTreeSet<SubResponse>,
    received: BTreeSet<SubResponse>,
}

impl FanOut {
    pub fn new(expected: impl IntoIterator<Item = SubResponse>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            received: BTreeSet::new(),
        }
    }

    /// Steps and sleep for today and the two previous days, plus the
    /// training summary.
    pub fn activity_history() -> Self {
        Self::new(
            (0..3)
                .map(SubResponse::Steps)
                .chain((0..3).map(SubResponse::Sleep))
                .chain(core::iter::once(SubResponse::Training)),
        )
    }

    /// Record a reply. Returns `false` for duplicates and unexpected ids.
    pub fn mark(&mut self, id: SubResponse) -> bool {
        self.expected.contains(&id) && self.received.insert(id)
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() == self.expected.len()
    }

    pub fn received(&self) -> usize {
        self.received.len()
    }

    pub fn total(&self) -> usize {
        self.expected.len()
    }

    pub fn percent(&self) -> u8 {
        if self.expected.is_empty() {
            return 100;
        }
        (100 * self.received.len() / self.expected.len()) as u8
    }
}
