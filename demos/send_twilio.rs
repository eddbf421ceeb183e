//! Send an SMS (or MMS with `--media`) through Twilio.
use sms_core::{SendRequest, SmsClient};
use twilio_notify::config::AppConfig;
use twilio_notify::telemetry;

use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    telemetry::init_tracing(&config.logging);

    let account_sid = arg_or_env("--account-sid", "TWILIO_ACCOUNT_SID");
    let auth_token = arg_or_env("--auth-token", "TWILIO_AUTH_TOKEN");
    let from = arg_or_env("--from", "SMS_FROM");
    let to = arg_or_env("--to", "SMS_TO");
    let text = arg_or_env("--text", "SMS_TEXT");
    let media: Vec<String> = optional_arg("--media").into_iter().collect();

    let client = config
        .twilio
        .client_factory()
        .client(&sms_core::Credentials::new(account_sid, auth_token))?;
    let res = client
        .send(SendRequest {
            to: &to,
            from: &from,
            text: &text,
            media_urls: &media,
        })
        .await?;
    println!(
        "Sent via {} with id {}\nRaw: {}",
        res.provider,
        res.id,
        serde_json::to_string_pretty(&res.raw)?
    );
    Ok(())
}

fn optional_arg(flag: &str) -> Option<String> {
    let args: Vec<String> = env::args().collect();
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).cloned()
}

fn arg_or_env(flag: &str, env_key: &str) -> String {
    optional_arg(flag)
        .or_else(|| env::var(env_key).ok())
        .unwrap_or_else(|| panic!("missing {} (arg {} or env {})", flag, flag, env_key))
}
