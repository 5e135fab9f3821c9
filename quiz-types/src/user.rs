use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::PlayerId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Role {
    #[default]
    Player,
    Moderator,
    Admin,
}

/// Account-level restrictions carried by a verified token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Restrictions {
    pub chat_ban: bool,
    pub game_ban: bool,
}

/// A verified caller identity. Produced by token verification and never
/// trusted from client payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub id: PlayerId,
    pub display_name: String,
    pub profile_picture: Option<String>,
    pub verified: bool,
    pub role: Role,
    pub restrictions: Restrictions,
}

impl Identity {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            profile_picture: None,
            verified: true,
            role: Role::Player,
            restrictions: Restrictions::default(),
        }
    }

    pub fn with_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }
}
