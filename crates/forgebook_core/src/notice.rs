//! User-facing notifications emitted by core services.
//!
//! Core never renders UI; it hands `Notice`s to whatever sink the host
//! installs. `sticky` notices must stay visible until dismissed.

use log::{error, info, warn};
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
    /// Long-lived notice that must not auto-dismiss.
    pub sticky: bool,
}

impl Notice {
    pub fn transient(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            sticky: false,
        }
    }

    pub fn sticky(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            sticky: true,
        }
    }
}

/// Receiver for user-facing notifications.
pub trait NoticeSink {
    fn notify(&self, notice: Notice);
}

impl<T: NoticeSink + ?Sized> NoticeSink for &T {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice);
    }
}

/// Forwards notices to the log; the default for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Info | Severity::Success => info!(
                "event=notice module=notice severity={:?} sticky={} message={}",
                notice.severity, notice.sticky, notice.message
            ),
            Severity::Warning => warn!(
                "event=notice module=notice severity=warning sticky={} message={}",
                notice.sticky, notice.message
            ),
            Severity::Error => error!(
                "event=notice module=notice severity=error sticky={} message={}",
                notice.sticky, notice.message
            ),
        }
    }
}

/// Records notices in memory; used by tests and by hosts that poll.
#[derive(Debug, Default)]
pub struct CollectingNoticeSink {
    notices: RefCell<Vec<Notice>>,
}

impl CollectingNoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        self.notices.take()
    }
}

impl NoticeSink for CollectingNoticeSink {
    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}
