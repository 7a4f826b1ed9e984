/// Email address used to authenticate a user
pub type UserIdentity = String;
pub type UserName = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserInfo {
    pub identity: UserIdentity,
    pub name: UserName,
    /// The team the user is working in, used to resolve their role
    pub current_team_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub info: UserInfo,
    pub id: i64,
}

impl std::fmt::Display for UserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.identity, self.name)
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.info, self.id)
    }
}

impl AsRef<UserInfo> for User {
    fn as_ref(&self) -> &UserInfo {
        &self.info
    }
}
