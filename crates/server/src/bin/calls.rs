//! Inspect calls recorded by the platform
//!
//! ```text
//! calls list [--limit N]
//! calls get <call_id>
//! ```

use anyhow::{anyhow, bail, Context, Result};

use voice_webhook_config::load_settings;
use voice_webhook_platform::{format_cost, format_duration, CallSummary, PlatformClient, VapiClient};

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, PartialEq)]
enum Command {
    List { limit: usize },
    Get { call_id: String },
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        Some("list") => {
            let mut limit = DEFAULT_LIMIT;
            let mut rest = args[1..].iter();
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--limit" | "-n" => {
                        let value = rest
                            .next()
                            .ok_or_else(|| anyhow!("--limit requires a value"))?;
                        limit = value
                            .parse()
                            .with_context(|| format!("invalid --limit value: {}", value))?;
                    },
                    other => bail!("unexpected argument: {}", other),
                }
            }
            Ok(Command::List { limit })
        },
        Some("get") => match &args[1..] {
            [call_id] => Ok(Command::Get {
                call_id: call_id.clone(),
            }),
            _ => bail!("usage: calls get <call_id>"),
        },
        Some(other) => bail!("unknown command: {}\n{}", other, usage()),
        None => bail!("{}", usage()),
    }
}

fn usage() -> &'static str {
    "usage: calls list [--limit N] | calls get <call_id>"
}

fn print_summary(call: &CallSummary) {
    let assistant = call
        .assistant
        .as_ref()
        .and_then(|a| a.name.as_deref())
        .unwrap_or("N/A");
    println!("Call ID:      {}", call.id);
    println!("Status:       {}", call.status.as_deref().unwrap_or("N/A"));
    println!("Type:         {}", call.call_type.as_deref().unwrap_or("N/A"));
    println!("Assistant:    {}", assistant);
    println!("Duration:     {}", format_duration(call.duration_seconds()));
    println!("Cost:         {}", format_cost(call.cost));
    println!("Ended reason: {}", call.ended_reason.as_deref().unwrap_or("N/A"));
    if let Some(started) = call.started_at {
        println!("Started at:   {}", started.to_rfc3339());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let env = std::env::var("VOICE_WEBHOOK_ENV").ok();
    let settings = load_settings(env.as_deref()).context("failed to load configuration")?;
    let client = VapiClient::new(&settings.platform).context("platform client unavailable")?;

    match command {
        Command::List { limit } => {
            let calls = client.list_calls(limit).await?;
            if calls.is_empty() {
                println!("No calls found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<12} {:<10} {:<10} {}",
                "CALL ID", "STATUS", "DURATION", "COST", "ENDED REASON"
            );
            for call in &calls {
                println!(
                    "{:<38} {:<12} {:<10} {:<10} {}",
                    call.id,
                    call.status.as_deref().unwrap_or("N/A"),
                    format_duration(call.duration_seconds()),
                    format_cost(call.cost),
                    call.ended_reason.as_deref().unwrap_or("N/A"),
                );
            }
            println!("\n{} call(s)", calls.len());
        },
        Command::Get { call_id } => {
            let call = client.get_call(&call_id).await?;
            print_summary(&call);
            if let Some(transcript) = call.transcript.as_deref().filter(|t| !t.is_empty()) {
                println!("\nTranscript:\n{}", transcript);
            }
            if let Some(metadata) = &call.metadata {
                println!("\nMetadata:\n{}", serde_json::to_string_pretty(metadata)?);
            }
        },
    }

    Ok(())
}
