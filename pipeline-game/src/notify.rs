//! Notification surface for player-facing failures.
use std::cell::RefCell;
use std::rc::Rc;

/// Receives messages the presentation layer should surface, e.g. as a toast.
pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Default notifier: forwards messages to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Keeps every message; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Rc<RefCell<Vec<String>>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.messages.borrow().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_clones_share_messages() {
        let notifier = RecordingNotifier::new();
        let observer = notifier.clone();
        notifier.notify("first");
        LogNotifier.notify("ignored by the recorder");
        notifier.notify("second");
        assert_eq!(observer.messages(), vec!["first", "second"]);
        assert_eq!(observer.count(), 2);
    }
}
