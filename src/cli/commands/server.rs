use anyhow::Context;
use clap::Args;
use serde_json::Value;

use crate::cli::utils::{output_error, output_success, print_json};
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct ServerArgs {
    #[arg(long, env = "STOREFRONT_URL", default_value = "http://localhost:3000", help = "Server base URL")]
    pub url: String,
}

impl ServerArgs {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

async fn get_json(url: &str) -> anyhow::Result<(reqwest::StatusCode, Value)> {
    let response = reqwest::get(url).await.with_context(|| format!("failed to reach {}", url))?;
    let status = response.status();
    let body = response.json::<Value>().await.context("response was not JSON")?;
    Ok((status, body))
}

pub async fn health(args: ServerArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let (status, body) = get_json(&args.endpoint("/health")).await?;

    if status.is_success() {
        output_success(&output_format, &format!("{} is healthy", args.url), Some(body))
    } else {
        output_error(&output_format, &format!("{} is degraded ({})", args.url, status), Some("SERVICE_UNAVAILABLE"))?;
        anyhow::bail!("health check failed with status {}", status)
    }
}

pub async fn flags(args: ServerArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let (status, body) = get_json(&args.endpoint("/api/features")).await?;
    if !status.is_success() {
        anyhow::bail!("feature lookup failed with status {}", status);
    }

    match output_format {
        OutputFormat::Json => print_json(&body),
        OutputFormat::Text => {
            let Some(flags) = body.as_object() else {
                anyhow::bail!("unexpected feature payload");
            };
            if flags.is_empty() {
                println!("No feature flags defined");
            }
            for (key, enabled) in flags {
                let mark = if enabled.as_bool().unwrap_or(false) { "on " } else { "off" };
                println!("{}  {}", mark, key);
            }
            Ok(())
        }
    }
}
