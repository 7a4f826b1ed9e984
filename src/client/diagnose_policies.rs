use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use authz::Action;
use authz::Authorizer;
use authz::policy::Caller;
use authz::policy::post_policy;
use authz::policy::user_policy;
use colored::Colorize as _;
use database::DbConnectionPoolV2;
use strum::IntoEnumIterator as _;

use crate::models::PgAuthDriver;
use crate::views::Regulator;

use super::diagnose::DiagnoseArgs;

/// Author of the sample post not written by the diagnosed user
const SOMEONE_ELSE: i64 = 0;

/// Outcome of every policy action for a caller
#[derive(Debug, PartialEq)]
struct PolicyMatrix {
    /// action, own post, someone else's post, users
    rows: Vec<(Action, [bool; 3])>,
}

impl PolicyMatrix {
    fn evaluate(caller: &Caller) -> Self {
        let rows = Action::iter()
            .map(|action| {
                (
                    action,
                    [
                        !post_policy(action, caller, caller.user_id).denied(),
                        !post_policy(action, caller, SOMEONE_ELSE).denied(),
                        !user_policy(action, caller).denied(),
                    ],
                )
            })
            .collect();
        Self { rows }
    }
}

impl fmt::Display for PolicyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {:<12} {:<10} {:<14} {}", "action", "own post", "others' post", "users")?;
        for (action, outcomes) in &self.rows {
            let [own, others, users] = outcomes.map(|allowed| if allowed { "✓ yes" } else { "✗ no" });
            writeln!(f, "  {:<12} {own:<10} {others:<14} {users}", action.to_string())?;
        }
        Ok(())
    }
}

/// Evaluates the post and user policies for a user and prints what they may do
pub async fn diagnose_policies(
    DiagnoseArgs { email }: DiagnoseArgs,
    db_pool: Arc<DbConnectionPoolV2>,
) -> anyhow::Result<()> {
    let regulator = Regulator::new(PgAuthDriver::new(db_pool));
    let authorizer = Authorizer::try_initialize(email.clone(), &regulator)
        .await
        .map_err(|e| anyhow!("cannot diagnose '{email}': {e}"))?;
    let caller = authorizer.caller();

    println!("{}", "cms-core policies".bold());
    println!("  User: {}", authorizer.user());
    match (authorizer.current_team_id(), caller.role) {
        (Some(team_id), Some(role)) => println!("  Role: {role} in team {team_id}"),
        (Some(team_id), None) => {
            println!("  {}", format!("⚠️  Not a member of team {team_id}").yellow())
        }
        (None, _) => println!("  {}", "⚠️  No current team".yellow()),
    }
    println!();
    print!("{}", PolicyMatrix::evaluate(&caller));
    Ok(())
}
