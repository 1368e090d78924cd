use anyhow::bail;
use clap::Args;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "Subject (user id) of the token")]
    pub user_id: String,

    #[arg(long, help = "Email claim, used by the admin allowlist")]
    pub email: Option<String>,

    #[arg(long, help = "Lifetime in hours (defaults to SECURITY_JWT_EXPIRY_HOURS)")]
    pub hours: Option<u64>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config().security;
    if security.jwt_secret.is_empty() {
        bail!("SECURITY_JWT_SECRET is not set");
    }

    let hours = args.hours.unwrap_or(security.jwt_expiry_hours);
    let claims = Claims::new(args.user_id, args.email, security, hours);
    let token = generate_jwt(&claims, security)?;

    match output_format {
        OutputFormat::Json => output_success(
            &output_format,
            "Token generated",
            Some(json!({ "token": token, "sub": claims.sub, "exp": claims.exp })),
        ),
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
    }
}
