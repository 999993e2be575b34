//! Paged fetch: keep asking for the next page until a terminator arrives.
//!
//! Each page starts with a role byte: `0` first, `1` continuation, `2` last.
//! The last page carries no data. A page cap bounds runaway transfers.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::OperationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    First,
    Next,
    Last,
}

impl PageRole {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::First),
            1 => Some(Self::Next),
            2 => Some(Self::Last),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Ask for the next page.
    More,
    /// All pages collected.
    Complete(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct PagedFetch {
    pages: u16,
    max_pages: u16,
    data: Vec<u8>,
}

impl PagedFetch {
    pub fn new(max_pages: u16) -> Self {
        Self {
            pages: 0,
            max_pages,
            data: Vec::new(),
        }
    }

    pub fn pages(&self) -> u16 {
        self.pages
    }

    /// Accept one page (role byte included).
    pub fn accept(&mut self, page: &[u8]) -> Result<PageOutcome, OperationError> {
        let role = page
            .first()
            .copied()
            .and_then(PageRole::from_byte)
            .ok_or(OperationError::UnexpectedPage)?;
        let data = &page[1..];

        let expect_first = self.pages == 0;
        if expect_first != (role == PageRole::First) {
            return Err(OperationError::UnexpectedPage);
        }
        if role == PageRole::Last && !data.is_empty() {
            return Err(OperationError::UnexpectedPage);
        }

        self.pages += 1;
        if self.pages > self.max_pages {
            return Err(OperationError::TooManyPages);
        }

        self.data.extend_from_slice(data);
        if role == PageRole::Last {
            Ok(PageOutcome::Complete(core::mem::take(&mut self.data)))
        } else {
            Ok(PageOutcome::More)
        }
    }
}
