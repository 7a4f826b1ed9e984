use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;
use utoipa::ToSchema;

/// Role of a user within a team, stored in the team membership
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    EnumIter,
    Display,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Manages the team: every post and every user
    Admin,
    Member,
    /// Read only access
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Ability {
    Create,
    Read,
    Update,
    Delete,
}

impl Role {
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    pub fn abilities(&self) -> &'static [Ability] {
        match self {
            Role::Admin => &[Ability::Create, Ability::Read, Ability::Update, Ability::Delete],
            Role::Member => &[Ability::Read, Ability::Create, Ability::Update],
            Role::Guest => &[Ability::Read],
        }
    }

    pub fn can(&self, ability: Ability) -> bool {
        self.abilities().contains(&ability)
    }
}

/// Actions guarded by the resource policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum Action {
    ViewAny,
    View,
    Create,
    Update,
    Delete,
    Restore,
    ForceDelete,
}

impl Action {
    /// Whether the action changes an existing resource
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            Action::Update | Action::Delete | Action::Restore | Action::ForceDelete
        )
    }

    /// Ability the credentials of a request must carry to perform the action
    pub fn required_ability(&self) -> Ability {
        match self {
            Action::ViewAny | Action::View => Ability::Read,
            Action::Create => Ability::Create,
            Action::Update | Action::Restore => Ability::Update,
            Action::Delete | Action::ForceDelete => Ability::Delete,
        }
    }
}
