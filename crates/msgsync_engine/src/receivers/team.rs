//! Team event receiver.

use super::{system_message, EventReceiver, FoundExt};
use crate::context::AccountContext;
use async_trait::async_trait;
use msgsync_core::boundary::{ApiResultExt, StoreResultExt};
use msgsync_core::{CoreResult, SystemContent, Team, User};
use msgsync_protocol::{Event, TeamEvent, TeamId, UserId};

/// Applies team events.
#[derive(Debug, Clone)]
pub struct TeamEventReceiver {
    ctx: AccountContext,
}

impl TeamEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext) -> Self {
        Self { ctx }
    }

    async fn on_member_join(&self, envelope: &Event, team: &TeamId, member: &UserId) -> CoreResult<()> {
        let users = &self.ctx.storage.users;
        let previous = users.get_user(member).wrap_storage()?;
        let profile = match previous {
            Some(_) => None,
            None => self
                .ctx
                .backend
                .fetch_users(std::slice::from_ref(member))
                .await
                .wrap_api()?
                .into_iter()
                .next(),
        };
        let mut user = match (previous, profile) {
            (Some(user), _) => user,
            (None, Some(profile)) => User::from_profile(&profile, None),
            (None, None) => {
                self.ctx.logger.skipped(envelope, "member unknown to backend");
                return Ok(());
            }
        };
        user.team = Some(team.clone());
        users.upsert_user(user).wrap_storage()?;
        self.ctx.logger.success(envelope, "");
        Ok(())
    }

    fn on_member_leave(
        &self,
        envelope: &Event,
        team: &TeamId,
        member: &UserId,
        timestamp: &str,
    ) -> CoreResult<()> {
        let known = self
            .ctx
            .storage
            .users
            .update_user(member, &mut |stored| {
                if stored.team.as_ref() == Some(team) {
                    stored.team = None;
                    stored.team_permissions = None;
                }
                stored.deleted = true;
            })
            .wrap_storage()
            .found()?;

        let left = self
            .ctx
            .storage
            .conversations
            .delete_user_from_group_conversations(member)
            .wrap_storage()?;
        for conversation in &left {
            self.ctx
                .storage
                .messages
                .insert_message(system_message(
                    envelope,
                    conversation,
                    member,
                    timestamp,
                    SystemContent::TeamMemberRemoved {
                        member: member.clone(),
                    },
                ))
                .wrap_storage()?;
        }
        self.ctx.logger.success(
            envelope,
            &format!("known={known} conversations={}", left.len()),
        );
        Ok(())
    }
}

#[async_trait]
impl EventReceiver<TeamEvent> for TeamEventReceiver {
    async fn on_event(&self, envelope: &Event, event: &TeamEvent) -> CoreResult<()> {
        match event {
            TeamEvent::Update { team, name, icon } => {
                self.ctx
                    .storage
                    .teams
                    .upsert_team(Team {
                        id: team.clone(),
                        name: name.clone(),
                        icon: icon.clone(),
                    })
                    .wrap_storage()?;
                self.ctx.logger.success(envelope, "");
                Ok(())
            }
            TeamEvent::MemberJoin { team, member } => {
                self.on_member_join(envelope, team, member).await
            }
            TeamEvent::MemberLeave {
                team,
                member,
                timestamp,
            } => self.on_member_leave(envelope, team, member, timestamp),
            TeamEvent::MemberUpdate {
                member,
                permissions,
                ..
            } => {
                let permissions = *permissions;
                let updated = self
                    .ctx
                    .storage
                    .users
                    .update_user(member, &mut |stored| {
                        stored.team_permissions = Some(permissions);
                    })
                    .wrap_storage()
                    .found()?;
                if updated {
                    self.ctx.logger.success(envelope, "");
                } else {
                    self.ctx.logger.skipped(envelope, "member not stored");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::testing::harness;
    use msgsync_core::Conversation;
    use msgsync_protocol::{
        ConversationId, ConversationType, DomainEvent, Member, MemberRole, UserProfile,
    };

    fn env(event: &TeamEvent) -> Event {
        Event::new("0001", DomainEvent::Team(event.clone()))
    }

    #[tokio::test]
    async fn member_join_fetches_profile() {
        let h = harness();
        let carol = UserId::new("carol", "wire.com");
        h.backend.put_user(UserProfile {
            id: carol.clone(),
            name: "Carol".into(),
            handle: Some("carol".into()),
            team: None,
            deleted: false,
        });
        let receiver = TeamEventReceiver::new(h.ctx.clone());
        let event = TeamEvent::MemberJoin {
            team: TeamId::new("t1"),
            member: carol.clone(),
        };
        receiver.on_event(&env(&event), &event).await.unwrap();

        let stored = h.ctx.storage.users.get_user(&carol).unwrap().unwrap();
        assert_eq!(stored.team, Some(TeamId::new("t1")));
        assert_eq!(stored.handle.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn member_leave_removes_from_groups_with_message() {
        let h = harness();
        let carol = UserId::new("carol", "wire.com");
        let group = ConversationId::new("g", "wire.com");
        let mut user = User::new(carol.clone(), "Carol");
        user.team = Some(TeamId::new("t1"));
        h.ctx.storage.users.upsert_user(user).unwrap();
        h.ctx
            .storage
            .conversations
            .upsert_conversation(
                Conversation::new(group.clone(), ConversationType::Group).with_members(vec![
                    Member::new(h.ctx.self_user.clone(), MemberRole::Admin),
                    Member::new(carol.clone(), MemberRole::Member),
                ]),
            )
            .unwrap();
        let receiver = TeamEventReceiver::new(h.ctx.clone());
        let event = TeamEvent::MemberLeave {
            team: TeamId::new("t1"),
            member: carol.clone(),
            timestamp: "2024-01-01T00:00:00Z".into(),
        };

        receiver.on_event(&env(&event), &event).await.unwrap();

        let stored = h.ctx.storage.users.get_user(&carol).unwrap().unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.team, None);
        let messages = h.ctx.storage.messages.messages(&group).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].system_content(),
            Some(&SystemContent::TeamMemberRemoved { member: carol })
        );
    }

    #[tokio::test]
    async fn update_stores_team() {
        let h = harness();
        let receiver = TeamEventReceiver::new(h.ctx.clone());
        let event = TeamEvent::Update {
            team: TeamId::new("t1"),
            name: "Acme".into(),
            icon: "icon-1".into(),
        };
        receiver.on_event(&env(&event), &event).await.unwrap();
        let team = h.ctx.storage.teams.get_team(&TeamId::new("t1")).unwrap().unwrap();
        assert_eq!(team.name, "Acme");
    }
}
