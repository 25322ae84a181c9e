//! Pure transformations for a download run.
//!
//! Range shaping, failure classification, item-tree planning and the task status board. None
//! of these functions perform network I/O.

mod board;
mod classify;
mod range;
mod tree;

pub use board::{Board, TaskState};
pub use classify::{FailureClass, Verdict, classify, verdict};
pub use range::{RangedRequest, ranged_request};
pub use tree::{Plan, PlannedFile, item_name, plan, sanitize};
