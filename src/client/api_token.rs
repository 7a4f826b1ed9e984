use std::sync::Arc;

use anyhow::anyhow;
use authz::Ability;
use clap::Args;
use cms_models::ApiToken;
use cms_models::User;
use colored::Colorize as _;
use database::DbConnectionPoolV2;

use super::app_config::ADMIN_EMAIL;

#[derive(Args, Debug)]
pub struct ApiTokenArgs {
    /// Owner of the token, the default admin when omitted
    #[arg(long)]
    email: Option<String>,
    #[arg(long, default_value = "API Token")]
    name: String,
}

/// Issues a read only token and prints it, it cannot be displayed again
pub async fn issue_api_token(
    ApiTokenArgs { email, name }: ApiTokenArgs,
    db_pool: Arc<DbConnectionPoolV2>,
) -> anyhow::Result<()> {
    let conn = &mut db_pool.get().await?;
    let user = match email {
        Some(email) => User::retrieve_by_email(conn, &email)
            .await?
            .ok_or_else(|| anyhow!("user with email '{email}' not found"))?,
        None => User::retrieve_by_email(conn, ADMIN_EMAIL)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "no email provided and the admin user '{ADMIN_EMAIL}' was not found, use --email"
                )
            })?,
    };

    let (token, plain) =
        ApiToken::issue(conn, user.id, &name, &[Ability::Read.to_string()]).await?;
    tracing::info!(token_id = token.id, user_id = user.id, "API token issued");

    println!("✅ API token {} issued for {}", name.bold(), user.email.bold());
    println!();
    println!("Add this to your .env file:");
    println!("APP_TOKEN={plain}");
    println!();
    println!(
        "{}",
        "⚠️  Save this token now, it won't be displayed again.".yellow()
    );
    Ok(())
}
