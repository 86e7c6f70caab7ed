//! Config command.

use anyhow::Result;

use super::ConfigArgs;
use crate::context::Context;

/// Show the resolved configuration.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.config.clone();
    if !args.show_secrets {
        let redact = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some("<redacted>".to_string());
            }
        };
        redact(&mut config.auth.token);
        redact(&mut config.auth.refresh_token);
    }

    match &ctx.config_path {
        Some(path) => ctx.output.info(&format!("Loaded {}", path.display())),
        None => ctx.output.warn("No config file found; using defaults"),
    }

    if ctx.output.is_json() {
        ctx.output.json(&config);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
