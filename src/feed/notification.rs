//! Feed status-transition notifications (§6 "Feed notification codes").

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedNotificationCode {
    Connected,
    Disconnected,
    ConnBroken,
    Delayed,
    Live,
    NotSubscribed,
    NotSupportedTimeframe,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedNotification {
    pub code: FeedNotificationCode,
    pub args: Vec<String>,
}

/// A single-producer, single-consumer queue of status transitions.
///
/// Transitions to the same code as the last delivered one are suppressed
/// (§6: "transitions to the same code are suppressed").
#[derive(Debug, Default)]
pub struct NotificationQueue {
    queue: VecDeque<FeedNotification>,
    last_code: Option<FeedNotificationCode>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: FeedNotificationCode, args: Vec<String>) {
        if self.last_code == Some(code) {
            return;
        }
        self.last_code = Some(code);
        self.queue.push_back(FeedNotification { code, args });
    }

    pub fn drain(&mut self) -> Vec<FeedNotification> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_transitions_to_the_same_code_are_suppressed() {
        let mut q = NotificationQueue::new();
        q.push(FeedNotificationCode::Live, vec![]);
        q.push(FeedNotificationCode::Live, vec![]);
        q.push(FeedNotificationCode::Delayed, vec![]);
        assert_eq!(q.drain().len(), 2);
    }
}
