use crate::config::PresenceConfig;
use crate::domain::notification::{EventTarget, ServerEvent};
use crate::domain::presence::PresenceStatus;
use crate::services::notification_service::NotificationService;
use dashmap::DashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    sockets: usize,
    online: bool,
    last_seen: Option<OffsetDateTime>,
}

/// In-memory presence state. Every method returns the status to announce when the user
/// changed between online and offline.
#[derive(Debug, Default)]
pub(crate) struct PresenceTracker {
    entries: DashMap<Uuid, Entry>,
}

impl PresenceTracker {
    pub(crate) fn connect(&self, user_id: Uuid, now: OffsetDateTime) -> Option<PresenceStatus> {
        let mut entry = self.entries.entry(user_id).or_default();
        entry.sockets += 1;
        Self::mark_seen(user_id, &mut entry, now)
    }

    pub(crate) fn heartbeat(&self, user_id: Uuid, now: OffsetDateTime) -> Option<PresenceStatus> {
        let mut entry = self.entries.entry(user_id).or_default();
        Self::mark_seen(user_id, &mut entry, now)
    }

    pub(crate) fn disconnect(&self, user_id: Uuid, now: OffsetDateTime) -> Option<PresenceStatus> {
        let mut entry = self.entries.get_mut(&user_id)?;
        entry.sockets = entry.sockets.saturating_sub(1);
        if entry.sockets > 0 || !entry.online {
            return None;
        }
        entry.online = false;
        entry.last_seen = Some(now);
        Some(PresenceStatus { user_id, online: false, last_seen: entry.last_seen })
    }

    /// Marks users offline whose last heartbeat is older than `cutoff`, then forgets
    /// offline users with no sockets who were last seen before `cutoff`.
    pub(crate) fn sweep(&self, cutoff: OffsetDateTime) -> Vec<PresenceStatus> {
        let mut changed = Vec::new();
        for mut item in self.entries.iter_mut() {
            let user_id = *item.key();
            let entry = item.value_mut();
            if entry.online && entry.last_seen.is_none_or(|seen| seen < cutoff) {
                entry.online = false;
                changed.push(PresenceStatus { user_id, online: false, last_seen: entry.last_seen });
            }
        }
        self.entries
            .retain(|_, entry| entry.online || entry.sockets > 0 || entry.last_seen.is_some_and(|seen| seen >= cutoff));
        changed
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn status(&self, user_id: Uuid) -> PresenceStatus {
        self.entries.get(&user_id).map_or(PresenceStatus { user_id, online: false, last_seen: None }, |entry| {
            PresenceStatus { user_id, online: entry.online, last_seen: entry.last_seen }
        })
    }

    fn mark_seen(user_id: Uuid, entry: &mut Entry, now: OffsetDateTime) -> Option<PresenceStatus> {
        entry.last_seen = Some(now);
        if entry.online {
            return None;
        }
        entry.online = true;
        Some(PresenceStatus { user_id, online: true, last_seen: entry.last_seen })
    }
}

#[derive(Clone, Debug)]
pub struct PresenceService {
    tracker: Arc<PresenceTracker>,
    notifier: NotificationService,
    ttl: Duration,
}

impl PresenceService {
    #[must_use]
    pub fn new(notifier: NotificationService, config: &PresenceConfig) -> Self {
        Self {
            tracker: Arc::new(PresenceTracker::default()),
            notifier,
            ttl: Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(i64::MAX)),
        }
    }

    pub async fn connect(&self, user_id: Uuid) {
        let change = self.tracker.connect(user_id, OffsetDateTime::now_utc());
        self.announce(change).await;
    }

    pub async fn heartbeat(&self, user_id: Uuid) {
        let change = self.tracker.heartbeat(user_id, OffsetDateTime::now_utc());
        self.announce(change).await;
    }

    pub async fn disconnect(&self, user_id: Uuid) {
        let change = self.tracker.disconnect(user_id, OffsetDateTime::now_utc());
        self.announce(change).await;
    }

    #[tracing::instrument(skip(self), fields(went_offline = tracing::field::Empty))]
    pub async fn sweep(&self) {
        let changed = self.tracker.sweep(OffsetDateTime::now_utc() - self.ttl);
        if !changed.is_empty() {
            tracing::Span::current().record("went_offline", changed.len());
            tracing::debug!(count = changed.len(), "Presence sweep marked users offline");
        }
        for status in changed {
            self.announce(Some(status)).await;
        }
    }

    #[must_use]
    pub fn status(&self, user_id: Uuid) -> PresenceStatus {
        self.tracker.status(user_id)
    }

    async fn announce(&self, change: Option<PresenceStatus>) {
        if let Some(status) = change {
            self.notifier.notify(EventTarget::Global, ServerEvent::PresenceUpdate(status)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    #[test]
    fn test_first_socket_goes_online() {
        let tracker = PresenceTracker::default();
        let user = Uuid::new_v4();

        let change = tracker.connect(user, at(1)).unwrap();
        assert!(change.online);
        assert!(tracker.connect(user, at(2)).is_none(), "second socket is not a transition");
    }

    #[test]
    fn test_last_socket_goes_offline() {
        let tracker = PresenceTracker::default();
        let user = Uuid::new_v4();
        tracker.connect(user, at(1));
        tracker.connect(user, at(2));

        assert!(tracker.disconnect(user, at(3)).is_none());
        let change = tracker.disconnect(user, at(4)).unwrap();
        assert!(!change.online);
        assert_eq!(change.last_seen, Some(at(4)));
        assert!(!tracker.status(user).online);
    }

    #[test]
    fn test_sweep_expires_silent_users() {
        let tracker = PresenceTracker::default();
        let quiet = Uuid::new_v4();
        let chatty = Uuid::new_v4();
        tracker.connect(quiet, at(10));
        tracker.connect(chatty, at(10));
        tracker.heartbeat(chatty, at(100));

        let changed = tracker.sweep(at(50));

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].user_id, quiet);
        assert!(tracker.status(chatty).online);
        assert!(tracker.heartbeat(quiet, at(120)).is_some(), "heartbeat brings the user back");
    }

    #[test]
    fn test_sweep_forgets_disconnected_users() {
        let tracker = PresenceTracker::default();
        let gone = Uuid::new_v4();
        let recent = Uuid::new_v4();
        let stale_socket = Uuid::new_v4();
        tracker.connect(gone, at(10));
        tracker.disconnect(gone, at(20));
        tracker.connect(recent, at(10));
        tracker.disconnect(recent, at(80));
        tracker.connect(stale_socket, at(10));

        let changed = tracker.sweep(at(50));

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].user_id, stale_socket);
        assert_eq!(tracker.tracked(), 2, "only the long-gone user is dropped");
        assert_eq!(tracker.status(recent).last_seen, Some(at(80)));
        assert!(tracker.status(gone).last_seen.is_none());
    }

    #[test]
    fn test_unknown_user_is_offline() {
        let tracker = PresenceTracker::default();
        let status = tracker.status(Uuid::new_v4());
        assert!(!status.online);
        assert!(status.last_seen.is_none());
    }
}
