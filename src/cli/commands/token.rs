use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::cli::OutputFormat;
use crate::config;

#[derive(Args, Debug)]
pub struct TokenArgs {
    #[arg(long, help = "User id to put in the `sub` claim")]
    pub user: Uuid,

    #[arg(long, help = "Email claim")]
    pub email: Option<String>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config::config().security;
    let claims = Claims::new(
        args.user,
        args.email,
        &security.jwt_audience,
        security.jwt_expiry_hours,
    );
    let token = generate_jwt(&claims, &security.jwt_secret)?;

    match output_format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "token": token, "sub": claims.sub, "expires_at": claims.exp })
        ),
        OutputFormat::Text => println!("{}", token),
    }
    Ok(())
}
