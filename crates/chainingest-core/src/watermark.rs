//! Watermark: the last height the listener has confirmed imported.

use serde::{Deserialize, Serialize};

/// Last confirmed-imported height, owned by a single listener.
///
/// [`Watermark::advance`] never moves it backwards. A restart builds a new
/// watermark below the last stored block instead of lowering this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    height: u64,
}

impl Watermark {
    pub fn new(height: u64) -> Self {
        Self { height }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Move to `height` if it is higher. Returns `true` if it moved.
    pub fn advance(&mut self, height: u64) -> bool {
        if height > self.height {
            self.height = height;
            true
        } else {
            false
        }
    }

    /// Returns `true` if a block at `latest` leaves heights between the
    /// watermark and `latest` unimported.
    pub fn has_gap_to(&self, latest: u64) -> bool {
        latest.saturating_sub(1) > self.height
    }
}
