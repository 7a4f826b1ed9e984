use std::sync::Arc;

use clap::Args;
use cms_models::Membership;
use cms_models::Team;
use cms_models::User;
use colored::Colorize as _;
use database::DbConnectionPoolV2;

use super::AppConfig;
use super::CmsConfig;
use super::app_config::ADMIN_EMAIL;

#[derive(Args, Debug)]
pub struct DiagnoseArgs {
    /// User to inspect
    #[arg(long, default_value = ADMIN_EMAIL)]
    pub email: String,
}

/// Where the teams flag comes from
#[derive(Debug, Clone, Copy, PartialEq)]
struct TeamsFlag {
    env: Option<bool>,
    file: Option<bool>,
    effective: bool,
}

impl TeamsFlag {
    fn resolve(app_config: &AppConfig, file: Option<&CmsConfig>) -> Self {
        Self {
            env: app_config.app_teams,
            file: file.map(|config| config.teams_enabled),
            effective: app_config.teams_enabled(file),
        }
    }

    /// `APP_TEAMS` and the config file disagree, the environment wins
    fn mismatch(&self) -> bool {
        matches!((self.env, self.file), (Some(env), Some(file)) if env != file)
    }
}

fn on_off(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "true",
        Some(false) => "false",
        None => "not set",
    }
}

pub async fn diagnose(
    DiagnoseArgs { email }: DiagnoseArgs,
    app_config: AppConfig,
    db_pool: Arc<DbConnectionPoolV2>,
) -> anyhow::Result<()> {
    println!("{}", "cms-core diagnostics".bold());
    println!();

    println!("1. Configuration file:");
    let config_path = app_config.config_path();
    let file = CmsConfig::load(&config_path)?;
    if file.is_some() {
        println!("  ✅ {} exists", config_path.display());
    } else {
        println!("  🚨 {} not found", config_path.display());
        println!("  Run: cms_core update --force");
    }
    println!();

    println!("2. Teams:");
    let teams = TeamsFlag::resolve(&app_config, file.as_ref());
    println!("  APP_TEAMS: {}", on_off(teams.env));
    println!("  teams_enabled (config file): {}", on_off(teams.file));
    if teams.mismatch() {
        println!(
            "  {}",
            "⚠️  MISMATCH: APP_TEAMS and the config file disagree, APP_TEAMS is used".yellow()
        );
    }
    if teams.effective {
        println!("  ✅ Teams are enabled");
    } else {
        println!("  Teams are disabled, set APP_TEAMS=true to enable them");
    }
    println!();

    println!("3. User {}:", email.bold());
    let conn = &mut db_pool.get().await?;
    let Some(user) = User::retrieve_by_email(conn, &email).await? else {
        println!("  🚨 No such user, run: cms_core create-admin --email {email}");
        return Ok(());
    };
    println!("  ✅ User {}[{}]", user.name.bold(), user.id);
    match user.current_team_id {
        Some(team_id) => {
            let team = Team::retrieve(conn, team_id).await?;
            let role = Membership::role(conn, user.id, team_id).await?;
            let team_name = team.map_or_else(|| "<deleted>".to_owned(), |team| team.name);
            println!("  ✅ Current team: {}[{team_id}]", team_name.bold());
            match role {
                Some(role) => println!("  ✅ Role: {role}"),
                None => println!("  🚨 Not a member of the current team, no role"),
            }
        }
        None => println!("  🚨 No current team set"),
    }
    println!();
    println!("✅ Diagnostics complete");
    Ok(())
}
