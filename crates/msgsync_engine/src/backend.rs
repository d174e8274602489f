//! Backend client abstraction.
//!
//! The engine only needs a handful of read calls: the notification log and
//! full-state snapshots for slow sync. Implementations return raw
//! [`ApiError`]s; the engine converts them at the call site.

use async_trait::async_trait;
use msgsync_core::boundary::{ApiError, ApiResult};
use msgsync_protocol::{
    Connection, ConversationId, ConversationSnapshot, Event, EventId, FeatureConfigEvent, TeamId,
    TeamSnapshot, UserId, UserProfile,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One page of the notification log.
#[derive(Debug, Clone, Default)]
pub struct PendingEventsPage {
    /// Events after the requested id, oldest first.
    pub events: Vec<Event>,
    /// True if more events follow.
    pub has_more: bool,
}

/// Read access to the backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Returns the id of the newest notification, if any.
    async fn fetch_last_event_id(&self) -> ApiResult<Option<EventId>>;

    /// Returns notifications after `since`, or from the start of the log.
    ///
    /// Fails with a 404 when `since` is no longer known to the backend.
    async fn fetch_pending_events(
        &self,
        since: Option<&EventId>,
        limit: u32,
    ) -> ApiResult<PendingEventsPage>;

    /// Returns the self user's profile.
    async fn fetch_self_user(&self) -> ApiResult<UserProfile>;

    /// Returns every connection of the self user.
    async fn fetch_connections(&self) -> ApiResult<Vec<Connection>>;

    /// Returns every conversation the self user is a member of.
    async fn fetch_conversations(&self) -> ApiResult<Vec<ConversationSnapshot>>;

    /// Returns one conversation.
    async fn fetch_conversation(&self, id: &ConversationId) -> ApiResult<ConversationSnapshot>;

    /// Returns the profiles of `ids` that exist.
    async fn fetch_users(&self, ids: &[UserId]) -> ApiResult<Vec<UserProfile>>;

    /// Returns a team.
    async fn fetch_team(&self, id: &TeamId) -> ApiResult<TeamSnapshot>;

    /// Returns the current feature configuration.
    async fn fetch_feature_configs(&self) -> ApiResult<Vec<FeatureConfigEvent>>;
}

/// Backend calls, used to script failures and inspect traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// [`BackendClient::fetch_last_event_id`].
    LastEventId,
    /// [`BackendClient::fetch_pending_events`].
    PendingEvents,
    /// [`BackendClient::fetch_self_user`].
    SelfUser,
    /// [`BackendClient::fetch_connections`].
    Connections,
    /// [`BackendClient::fetch_conversations`].
    Conversations,
    /// [`BackendClient::fetch_conversation`].
    Conversation,
    /// [`BackendClient::fetch_users`].
    Users,
    /// [`BackendClient::fetch_team`].
    Team,
    /// [`BackendClient::fetch_feature_configs`].
    FeatureConfigs,
}

#[derive(Debug)]
struct MockState {
    self_user: UserProfile,
    log: BTreeMap<EventId, Event>,
    connections: Vec<Connection>,
    conversations: BTreeMap<ConversationId, ConversationSnapshot>,
    users: BTreeMap<UserId, UserProfile>,
    teams: BTreeMap<TeamId, TeamSnapshot>,
    feature_configs: Vec<FeatureConfigEvent>,
    failures: Vec<(BackendOp, ApiError)>,
    calls: Vec<BackendOp>,
}

/// An in-memory backend for tests and tools.
///
/// The notification log is ordered by id. A pending fetch with an id the log
/// does not contain answers 404, like the real backend does once a
/// notification was purged.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Creates a backend serving `self_user` with nothing else.
    pub fn new(self_user: UserProfile) -> Self {
        let mut users = BTreeMap::new();
        users.insert(self_user.id.clone(), self_user.clone());
        Self {
            state: Mutex::new(MockState {
                self_user,
                log: BTreeMap::new(),
                connections: Vec::new(),
                conversations: BTreeMap::new(),
                users,
                teams: BTreeMap::new(),
                feature_configs: Vec::new(),
                failures: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Appends events to the notification log.
    pub fn push_events(&self, events: impl IntoIterator<Item = Event>) {
        let mut state = self.state.lock();
        for mut event in events {
            event.processed = false;
            state.log.insert(event.id.clone(), event);
        }
    }

    /// Drops every event up to and including `id` from the log.
    pub fn purge_events_through(&self, id: &EventId) {
        self.state.lock().log.retain(|stored, _| stored > id);
    }

    /// Adds or replaces a conversation.
    pub fn put_conversation(&self, conversation: ConversationSnapshot) {
        self.state
            .lock()
            .conversations
            .insert(conversation.id.clone(), conversation);
    }

    /// Adds or replaces a user profile.
    pub fn put_user(&self, user: UserProfile) {
        self.state.lock().users.insert(user.id.clone(), user);
    }

    /// Adds a connection.
    pub fn put_connection(&self, connection: Connection) {
        self.state.lock().connections.push(connection);
    }

    /// Adds or replaces a team.
    pub fn put_team(&self, team: TeamSnapshot) {
        self.state.lock().teams.insert(team.id.clone(), team);
    }

    /// Sets the feature configuration.
    pub fn set_feature_configs(&self, configs: Vec<FeatureConfigEvent>) {
        self.state.lock().feature_configs = configs;
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: BackendOp, error: ApiError) {
        self.state.lock().failures.push((op, error));
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendOp> {
        self.state.lock().calls.clone()
    }

    /// Returns how many times `op` was called.
    #[must_use]
    pub fn call_count(&self, op: BackendOp) -> usize {
        self.state.lock().calls.iter().filter(|call| **call == op).count()
    }

    fn enter(&self, op: BackendOp) -> ApiResult<parking_lot::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        state.calls.push(op);
        if let Some(index) = state.failures.iter().position(|(failing, _)| *failing == op) {
            let (_, error) = state.failures.remove(index);
            return Err(error);
        }
        Ok(state)
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn fetch_last_event_id(&self) -> ApiResult<Option<EventId>> {
        let state = self.enter(BackendOp::LastEventId)?;
        Ok(state.log.keys().next_back().cloned())
    }

    async fn fetch_pending_events(
        &self,
        since: Option<&EventId>,
        limit: u32,
    ) -> ApiResult<PendingEventsPage> {
        let state = self.enter(BackendOp::PendingEvents)?;
        if let Some(since) = since {
            if !state.log.contains_key(since) {
                return Err(ApiError::not_found("not-found"));
            }
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut after = state
            .log
            .iter()
            .filter(|(id, _)| since.map_or(true, |since| *id > since))
            .map(|(_, event)| event.clone());
        let events: Vec<Event> = after.by_ref().take(limit).collect();
        let has_more = after.next().is_some();
        Ok(PendingEventsPage { events, has_more })
    }

    async fn fetch_self_user(&self) -> ApiResult<UserProfile> {
        let state = self.enter(BackendOp::SelfUser)?;
        Ok(state.self_user.clone())
    }

    async fn fetch_connections(&self) -> ApiResult<Vec<Connection>> {
        let state = self.enter(BackendOp::Connections)?;
        Ok(state.connections.clone())
    }

    async fn fetch_conversations(&self) -> ApiResult<Vec<ConversationSnapshot>> {
        let state = self.enter(BackendOp::Conversations)?;
        Ok(state.conversations.values().cloned().collect())
    }

    async fn fetch_conversation(&self, id: &ConversationId) -> ApiResult<ConversationSnapshot> {
        let state = self.enter(BackendOp::Conversation)?;
        state
            .conversations
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("no-conversation"))
    }

    async fn fetch_users(&self, ids: &[UserId]) -> ApiResult<Vec<UserProfile>> {
        let state = self.enter(BackendOp::Users)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn fetch_team(&self, id: &TeamId) -> ApiResult<TeamSnapshot> {
        let state = self.enter(BackendOp::Team)?;
        state
            .teams
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("no-team"))
    }

    async fn fetch_feature_configs(&self) -> ApiResult<Vec<FeatureConfigEvent>> {
        let state = self.enter(BackendOp::FeatureConfigs)?;
        Ok(state.feature_configs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgsync_protocol::DomainEvent;

    fn profile() -> UserProfile {
        UserProfile {
            id: UserId::new("self", "wire.com"),
            name: "Self".into(),
            handle: None,
            team: None,
            deleted: false,
        }
    }

    fn backend_with_log(ids: &[&str]) -> MockBackend {
        let backend = MockBackend::new(profile());
        backend.push_events(
            ids.iter()
                .map(|id| Event::new(*id, DomainEvent::MissedNotifications)),
        );
        backend
    }

    #[tokio::test]
    async fn pending_events_are_paged() {
        let backend = backend_with_log(&["0001", "0002", "0003"]);
        let first = backend.fetch_pending_events(None, 2).await.unwrap();
        assert_eq!(first.events.len(), 2);
        assert!(first.has_more);

        let since = first.events[1].id.clone();
        let second = backend.fetch_pending_events(Some(&since), 2).await.unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].id.as_str(), "0003");
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn purged_cursor_is_not_found() {
        let backend = backend_with_log(&["0001", "0002"]);
        backend.purge_events_through(&EventId::new("0001"));
        let err = backend
            .fetch_pending_events(Some(&EventId::new("0001")), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest { status: 404, .. }));
    }

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let backend = backend_with_log(&[]);
        backend.fail_next(BackendOp::SelfUser, ApiError::no_network("offline"));
        assert!(backend.fetch_self_user().await.is_err());
        assert!(backend.fetch_self_user().await.is_ok());
        assert_eq!(backend.call_count(BackendOp::SelfUser), 2);
    }
}
