use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use taskmaster::config::AppConfig;
use taskmaster::session::Session;
use taskmaster::startup;
use taskmaster::traits::ToolContext;

/// One request on the stdio framing: `{id, tool, args}` per line.
#[derive(Debug, Deserialize)]
struct WireRequest {
    id: Value,
    tool: String,
    #[serde(default)]
    args: Value,
}

fn main() -> anyhow::Result<()> {
    // Load environment file.
    // - Default: .env discovered from the working directory and parents.
    // - Override: TASKMASTER_ENV_FILE=/absolute/path/to/envfile
    if let Ok(path) = std::env::var("TASKMASTER_ENV_FILE") {
        if !path.trim().is_empty() {
            if let Err(e) = dotenvy::from_path(&path) {
                eprintln!("Warning: failed to load TASKMASTER_ENV_FILE '{}': {}", path, e);
            }
        } else {
            let _ = dotenvy::dotenv();
        }
    } else {
        let _ = dotenvy::dotenv();
    }

    let config_path = std::env::var("TASKMASTER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("taskmaster.toml"));
    let config = AppConfig::load_or_default(&config_path)?;

    // Tracing. Stdout carries the wire protocol, so logs go to stderr.
    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("taskmasterd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(config))
}

/// Newline-delimited JSON over stdio. Deliberately minimal: the real tool
/// transport lives outside this process; this framing exists so the runtime
/// is drivable end to end.
async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let runtime = startup::bootstrap(&config);
    info!("taskmasterd ready on stdio");

    let session = Session::new("stdio");
    let ctx = ToolContext::new(session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => {
                match runtime
                    .channel
                    .invoke(&request.tool, request.args, &ctx)
                    .await
                {
                    Ok(result) => json!({ "id": request.id, "result": result }),
                    Err(e) => {
                        error!(tool = %request.tool, "Invocation failed: {:#}", e);
                        json!({ "id": request.id, "error": format!("{:#}", e) })
                    }
                }
            }
            Err(e) => json!({ "id": Value::Null, "error": format!("Malformed request: {}", e) }),
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    runtime.reaper.abort();
    info!("stdin closed; shutting down");
    Ok(())
}
