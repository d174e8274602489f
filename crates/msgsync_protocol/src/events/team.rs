//! Team events.

use crate::types::{TeamId, UserId};
use serde::{Deserialize, Serialize};

/// Events about the self user's team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TeamEvent {
    /// Team name or icon changed.
    #[serde(rename = "team.update")]
    Update {
        /// Team id.
        team: TeamId,
        /// New name.
        name: String,
        /// New icon asset id.
        #[serde(default)]
        icon: String,
    },
    /// A user joined the team.
    #[serde(rename = "team.member-join")]
    MemberJoin {
        /// Team id.
        team: TeamId,
        /// Joining user.
        member: UserId,
    },
    /// A user left the team; their account is gone from the team's view.
    #[serde(rename = "team.member-leave")]
    MemberLeave {
        /// Team id.
        team: TeamId,
        /// Leaving user.
        member: UserId,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// A member's team permissions changed.
    #[serde(rename = "team.member-update")]
    MemberUpdate {
        /// Team id.
        team: TeamId,
        /// Updated user.
        member: UserId,
        /// New permission bits.
        permissions: u64,
    },
}

impl TeamEvent {
    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TeamEvent::Update { .. } => "Team.Update",
            TeamEvent::MemberJoin { .. } => "Team.MemberJoin",
            TeamEvent::MemberLeave { .. } => "Team.MemberLeave",
            TeamEvent::MemberUpdate { .. } => "Team.MemberUpdate",
        }
    }
}
