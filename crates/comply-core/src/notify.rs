//! Notification center — transient, non-blocking user feedback.
//!
//! Each notice carries its own expiry, so concurrent notices never block
//! or cancel each other. The UI layer renders whatever `active_at`
//! returns and calls `sweep` afterward so expired notices are actually
//! dropped rather than accumulating.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// How long a notice stays visible by default.
pub const DEFAULT_TTL_MS: i64 = 3000;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// One transient notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: String,
    pub message: String,
    pub kind: NoticeKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Collects notices and expires them independently.
#[derive(Debug)]
pub struct Notifier {
    notices: Mutex<Vec<Notice>>,
    ttl: Duration,
}

impl Notifier {
    /// Create a notifier with the default ≈3s lifetime per notice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::milliseconds(DEFAULT_TTL_MS))
    }

    /// Create a notifier with a custom per-notice lifetime.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            notices: Mutex::new(Vec::new()),
            ttl,
        }
    }

    /// Post a notice. Returns its ID.
    pub fn notify(&self, message: impl Into<String>, kind: NoticeKind) -> String {
        self.notify_at(message, kind, Utc::now())
    }

    /// Post a success notice.
    pub fn success(&self, message: impl Into<String>) -> String {
        self.notify(message, NoticeKind::Success)
    }

    /// Post an error notice.
    pub fn error(&self, message: impl Into<String>) -> String {
        self.notify(message, NoticeKind::Error)
    }

    /// Post an informational notice.
    pub fn info(&self, message: impl Into<String>) -> String {
        self.notify(message, NoticeKind::Info)
    }

    fn notify_at(
        &self,
        message: impl Into<String>,
        kind: NoticeKind,
        now: DateTime<Utc>,
    ) -> String {
        let notice = Notice {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
            kind,
            created_at: now,
            expires_at: now + self.ttl,
        };
        let id = notice.id.clone();
        self.lock().push(notice);
        id
    }

    /// Notices still alive at `now`, in posting order.
    #[must_use]
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Notice> {
        self.lock()
            .iter()
            .filter(|n| n.expires_at > now)
            .cloned()
            .collect()
    }

    /// Notices still alive right now.
    #[must_use]
    pub fn active(&self) -> Vec<Notice> {
        self.active_at(Utc::now())
    }

    /// Drop expired notices. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut notices = self.lock();
        let before = notices.len();
        notices.retain(|n| n.expires_at > now);
        before - notices.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notice>> {
        self.notices
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH
    }

    #[test]
    fn notice_auto_dismisses_after_ttl() {
        let notifier = Notifier::new();
        notifier.notify_at("saved", NoticeKind::Success, t0());

        assert_eq!(notifier.active_at(t0() + Duration::seconds(1)).len(), 1);
        assert!(notifier.active_at(t0() + Duration::seconds(4)).is_empty());
    }

    #[test]
    fn concurrent_notices_expire_independently() {
        let notifier = Notifier::new();
        notifier.notify_at("first", NoticeKind::Info, t0());
        notifier.notify_at("second", NoticeKind::Error, t0() + Duration::seconds(2));

        // Both visible while both live.
        let live = notifier.active_at(t0() + Duration::seconds(2));
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].message, "first");
        assert_eq!(live[1].message, "second");

        // The first expires without cancelling the second.
        let live = notifier.active_at(t0() + Duration::seconds(4));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "second");
        assert_eq!(live[0].kind, NoticeKind::Error);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let notifier = Notifier::new();
        notifier.notify_at("old", NoticeKind::Info, t0());
        notifier.notify_at("new", NoticeKind::Info, t0() + Duration::seconds(2));

        let removed = notifier.sweep(t0() + Duration::seconds(4));
        assert_eq!(removed, 1);

        // The survivor is still tracked; nothing leaked, nothing lost.
        let live = notifier.active_at(t0() + Duration::seconds(4));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "new");
    }

    #[test]
    fn sweep_after_expiry_leaves_nothing_behind() {
        let notifier = Notifier::new();
        for i in 0..5 {
            notifier.notify_at(format!("n{i}"), NoticeKind::Success, t0());
        }
        assert_eq!(notifier.sweep(t0() + Duration::seconds(10)), 5);
        assert_eq!(notifier.sweep(t0() + Duration::seconds(10)), 0);
    }

    #[test]
    fn ids_are_unique_and_nonempty() {
        let notifier = Notifier::new();
        let a = notifier.notify("a", NoticeKind::Info);
        let b = notifier.notify("b", NoticeKind::Info);
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn custom_ttl_is_respected() {
        let notifier = Notifier::with_ttl(Duration::seconds(30));
        notifier.notify_at("long-lived", NoticeKind::Info, t0());
        assert_eq!(notifier.active_at(t0() + Duration::seconds(29)).len(), 1);
        assert!(notifier.active_at(t0() + Duration::seconds(31)).is_empty());
    }
}
