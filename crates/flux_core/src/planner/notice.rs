//! Out-of-band outcome notices for the UI layer.

use crate::model::task::TaskId;
use log::debug;
use tokio::sync::mpsc;

/// Outcome of an optimistic operation that finished after its call returned,
/// or that the UI must surface regardless of the call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A task left local state optimistically.
    TaskRemoved { id: TaskId },
    CreateFailed { provisional_id: TaskId, message: String },
    UpdateFailed { id: TaskId, message: String },
    DeleteFailed { id: TaskId, message: String },
    ReorderPersisted {
        week_offset: i32,
        day_of_week: u8,
        count: usize,
    },
    ReorderFailed {
        week_offset: i32,
        day_of_week: u8,
        message: String,
        /// Whether local order was restored to the pre-burst snapshot.
        rolled_back: bool,
    },
}

pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// Sending half of the notice channel. Notices are dropped once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, NoticeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            debug!("event=notice_dropped module=planner status=ok reason=receiver_closed");
        }
    }
}
