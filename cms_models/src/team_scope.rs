//! Restriction of the team-owned records to the team a caller works in

use database::tables::posts;
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Bool;

/// The set of teams a query is allowed to see
///
/// Every query against a team-owned table takes a scope: reads are filtered with
/// [TeamScope::filter_posts] and inserts are stamped with [TeamScope::stamp].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamScope {
    /// Records of a single team
    Team(i64),
    /// Every record, whatever its team
    AllTeams,
    /// No record at all
    Nothing,
}

impl TeamScope {
    /// Scope of an authenticated caller working in `current_team_id`
    ///
    /// Callers without a team (or unauthenticated) see nothing, they don't get an error.
    pub fn for_caller(current_team_id: Option<i64>) -> Self {
        current_team_id.map_or(TeamScope::Nothing, TeamScope::Team)
    }

    pub fn for_team(team_id: i64) -> Self {
        TeamScope::Team(team_id)
    }

    pub fn without_team_scope() -> Self {
        TeamScope::AllTeams
    }

    pub fn team_id(&self) -> Option<i64> {
        match self {
            TeamScope::Team(team_id) => Some(*team_id),
            TeamScope::AllTeams | TeamScope::Nothing => None,
        }
    }

    /// The team of a new record: an explicit team is kept, otherwise the scope's team if any
    pub fn stamp(&self, team_id: Option<i64>) -> Option<i64> {
        team_id.or(self.team_id())
    }

    /// Whether an already fetched record belongs to the scope
    pub fn matches(&self, team_id: Option<i64>) -> bool {
        match self {
            TeamScope::Team(scope) => team_id == Some(*scope),
            TeamScope::AllTeams => true,
            TeamScope::Nothing => false,
        }
    }

    pub fn filter_posts<'a>(self, query: posts::BoxedQuery<'a, Pg>) -> posts::BoxedQuery<'a, Pg> {
        match self {
            TeamScope::Team(team_id) => query.filter(posts::team_id.eq(team_id)),
            TeamScope::AllTeams => query,
            TeamScope::Nothing => query.filter(dsl::sql::<Bool>("FALSE")),
        }
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn scoped_sql(scope: TeamScope) -> String {
        let query = scope.filter_posts(posts::table.into_boxed());
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn caller_scope() {
        assert_eq!(TeamScope::for_caller(Some(3)), TeamScope::Team(3));
        assert_eq!(TeamScope::for_caller(None), TeamScope::Nothing);
        assert_eq!(TeamScope::without_team_scope(), TeamScope::AllTeams);
    }

    #[rstest]
    #[case::team_fills_empty(TeamScope::Team(3), None, Some(3))]
    #[case::explicit_is_kept(TeamScope::Team(3), Some(7), Some(7))]
    #[case::no_team(TeamScope::Nothing, None, None)]
    #[case::all_teams(TeamScope::AllTeams, None, None)]
    #[case::explicit_without_team(TeamScope::Nothing, Some(7), Some(7))]
    fn stamping(#[case] scope: TeamScope, #[case] explicit: Option<i64>, #[case] expected: Option<i64>) {
        assert_eq!(scope.stamp(explicit), expected);
    }

    #[rstest]
    #[case(TeamScope::Team(3), Some(3), true)]
    #[case(TeamScope::Team(3), Some(4), false)]
    #[case(TeamScope::Team(3), None, false)]
    #[case(TeamScope::AllTeams, None, true)]
    #[case(TeamScope::Nothing, Some(3), false)]
    fn matching(#[case] scope: TeamScope, #[case] team_id: Option<i64>, #[case] expected: bool) {
        assert_eq!(scope.matches(team_id), expected);
    }

    #[test]
    fn team_scope_filters_on_the_team_column() {
        let sql = scoped_sql(TeamScope::Team(3));
        assert!(sql.contains(r#""posts"."team_id" = $1"#), "{sql}");
        assert!(sql.ends_with("-- binds: [3]"), "{sql}");
    }

    #[test]
    fn bypass_and_empty_scopes() {
        assert!(!scoped_sql(TeamScope::AllTeams).contains("WHERE"));
        assert!(scoped_sql(TeamScope::Nothing).contains("FALSE"));
    }
}
