use anyhow::Result;
use insight_poller::{InsightPoller, PollOutcome, DEFAULT_API_URL};

fn usage() {
    eprintln!("Usage:");
    eprintln!("  insight-poll <code> [--url URL]");
    eprintln!();
    eprintln!("Requests the narrative for one indicator and polls every 3s until it");
    eprintln!("is done or failed. URL defaults to $INSIGHT_API_URL or {DEFAULT_API_URL}.");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let url_flag = args.iter().position(|a| a == "--url");

    let base_url = url_flag
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| std::env::var("INSIGHT_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let code = args
        .iter()
        .enumerate()
        .find(|(i, a)| !a.starts_with("--") && url_flag.map_or(true, |f| *i != f + 1))
        .map(|(_, a)| a.clone());

    let Some(code) = code else {
        usage();
        std::process::exit(2);
    };

    match InsightPoller::new(base_url).poll(&code).await? {
        PollOutcome::Done(record) => {
            let body = record.result.unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        PollOutcome::Failed(message) => {
            eprintln!("Insight for {code} failed: {message}");
            std::process::exit(1);
        }
    }
    Ok(())
}
