use std::fmt;

use serde::Serialize;

/// Lifecycle of one file.
///
/// ```text
/// waiting -> finding-proxy -> requesting-stream -> downloading -> verifying -> downloaded
///    ^             |                 |                 |             |
///    +-------------+-----------------+-----------------+-------------+
/// ```
///
/// `already-downloaded` and `failed` are terminal like `downloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Waiting,
    FindingProxy,
    RequestingStream,
    Downloading,
    Verifying,
    Downloaded,
    AlreadyDownloaded,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Waiting,
        TaskStatus::FindingProxy,
        TaskStatus::RequestingStream,
        TaskStatus::Downloading,
        TaskStatus::Verifying,
        TaskStatus::Downloaded,
        TaskStatus::AlreadyDownloaded,
        TaskStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Downloaded | TaskStatus::AlreadyDownloaded | TaskStatus::Failed
        )
    }

    /// Whether the task holds a transfer slot.
    pub fn is_transferring(self) -> bool {
        matches!(self, TaskStatus::RequestingStream | TaskStatus::Downloading)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self, next) {
            (Waiting, FindingProxy) => true,
            (FindingProxy, RequestingStream | Waiting) => true,
            // a part file already holding every byte goes straight to verification
            (RequestingStream, Downloading | Waiting | Verifying) => true,
            (Downloading, Waiting | Verifying) => true,
            (Verifying, Downloaded | Waiting) => true,
            (FindingProxy | RequestingStream | Downloading | Verifying, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::FindingProxy => "finding-proxy",
            TaskStatus::RequestingStream => "requesting-stream",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Verifying => "verifying",
            TaskStatus::Downloaded => "downloaded",
            TaskStatus::AlreadyDownloaded => "already-downloaded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
