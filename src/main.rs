//! prompt-relay - forward selected text to AI chat sites via CDP.

mod browser;
mod error;
mod models;
mod profiles;
mod server;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::server::RelayServer;
use crate::service::RelayService;

const DEFAULT_SOCKET: &str = "~/.prompt-relay/daemon.sock";

#[derive(Parser)]
#[command(name = "prompt-relay")]
#[command(about = "Deliver prompts to AI chat sites through a shared browser daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output JSON (for scripted consumption)
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay daemon
    Start {
        /// Socket path
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,

        /// Run in foreground
        #[arg(short, long)]
        foreground: bool,

        /// Run the browser headless (target sites need logins, so the
        /// default is a visible browser)
        #[arg(long)]
        headless: bool,
    },

    /// Stop the relay daemon
    Stop {
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },

    /// Check daemon status
    Status {
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },

    /// Send text to a site
    Send {
        /// Site id (see `profile list`)
        site: String,
        /// Text to deliver
        text: String,
        /// Feature template to wrap the text with (ask, explain, ...)
        #[arg(long)]
        feature: Option<String>,
        /// Send the text as-is, skipping the feature template
        #[arg(long)]
        raw: bool,
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },

    /// Interactively pick an element on the site and save its selector
    Detect {
        /// Site id
        site: String,
        /// Which selector to infer: input or submit
        kind: String,
        /// Print the inferred selector without saving it
        #[arg(long)]
        no_save: bool,
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },

    /// Detect a selector without user interaction
    AutoDetect {
        /// Site id
        site: String,
        /// Which selector to infer: input or submit
        kind: String,
        /// Print the inferred selector without saving it
        #[arg(long)]
        no_save: bool,
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },

    /// Site profile management
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List configured sites
    List {
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },
    /// Show the full profile for one site
    Show {
        site: String,
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },
    /// Set a selector by hand
    SetSelector {
        site: String,
        /// input or submit
        kind: String,
        selector: String,
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },
    /// Restore the built-in default profiles
    Reset {
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            socket,
            foreground,
            headless,
        } => cmd_start(socket, foreground, headless),
        Commands::Stop { socket } => cmd_stop(socket),
        Commands::Status { socket } => cmd_status(socket),
        Commands::Send {
            site,
            text,
            feature,
            raw,
            socket,
        } => {
            let mut params = serde_json::json!({"site": site, "text": text});
            if let Some(feature) = feature {
                params["feature"] = serde_json::Value::String(feature);
            }
            if raw {
                params["raw"] = serde_json::Value::Bool(true);
            }
            cmd_call_daemon(&socket, "relay.send", params, cli.json)
        }
        Commands::Detect {
            site,
            kind,
            no_save,
            socket,
        } => {
            let params = serde_json::json!({"site": site, "kind": kind, "save": !no_save});
            cmd_call_daemon(&socket, "detect.selector", params, cli.json)
        }
        Commands::AutoDetect {
            site,
            kind,
            no_save,
            socket,
        } => {
            let params = serde_json::json!({"site": site, "kind": kind, "save": !no_save});
            cmd_call_daemon(&socket, "detect.auto", params, cli.json)
        }
        Commands::Profile { action } => match action {
            ProfileAction::List { socket } => {
                cmd_call_daemon(&socket, "profile.list", serde_json::json!({}), cli.json)
            }
            ProfileAction::Show { site, socket } => cmd_call_daemon(
                &socket,
                "profile.get",
                serde_json::json!({"site": site}),
                cli.json,
            ),
            ProfileAction::SetSelector {
                site,
                kind,
                selector,
                socket,
            } => cmd_call_daemon(
                &socket,
                "profile.set_selector",
                serde_json::json!({"site": site, "kind": kind, "selector": selector}),
                cli.json,
            ),
            ProfileAction::Reset { socket } => {
                cmd_call_daemon(&socket, "profile.reset", serde_json::json!({}), cli.json)
            }
        },
    }
}

fn run_server(socket_path: String, headless: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prompt_relay=debug,chromiumoxide=warn".into()),
        )
        .init();

    let service = RelayService::new(headless).context("Failed to create RelayService")?;
    let server = RelayServer::new(service, &socket_path);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(server.serve())
}

fn cmd_start(socket: String, foreground: bool, headless: bool) -> Result<()> {
    let socket_path = shellexpand::tilde(&socket).to_string();

    if let Some(parent) = Path::new(&socket_path).parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    let pid_file = format!("{}.pid", socket_path);

    println!("Starting prompt-relay daemon...");
    println!("Socket: {}", socket_path);
    println!("Browser: {}", if headless { "headless" } else { "headed" });

    if foreground {
        run_server(socket_path, headless)
    } else {
        use daemonize::Daemonize;

        let daemonize = Daemonize::new()
            .pid_file(&pid_file)
            .working_directory("/tmp");

        match daemonize.start() {
            Ok(_) => run_server(socket_path, headless),
            Err(e) => {
                eprintln!("Failed to daemonize: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cmd_stop(socket: String) -> Result<()> {
    let socket_path = shellexpand::tilde(&socket).to_string();
    let pid_file = format!("{}.pid", socket_path);

    let pid_str = std::fs::read_to_string(&pid_file)
        .context("Failed to read PID file - daemon may not be running")?;
    let pid: i32 = pid_str.trim().parse().context("Invalid PID in file")?;

    println!("Stopping prompt-relay daemon (PID: {})...", pid);

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }

    std::thread::sleep(std::time::Duration::from_millis(500));

    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(&pid_file);

    println!("Daemon stopped.");
    Ok(())
}

fn cmd_status(socket: String) -> Result<()> {
    let socket_path = shellexpand::tilde(&socket).to_string();

    if !Path::new(&socket_path).exists() {
        println!("Status: NOT RUNNING");
        println!("Socket {} does not exist", socket_path);
        return Ok(());
    }

    match UnixStream::connect(&socket_path) {
        Ok(mut stream) => {
            let request = r#"{"id":"status","v":1,"method":"health","params":{}}"#;
            writeln!(stream, "{}", request)?;
            stream.flush()?;

            let mut reader = BufReader::new(stream);
            let mut response = String::new();
            reader.read_line(&mut response)?;

            println!("Status: RUNNING");
            println!("Socket: {}", socket_path);
            println!("Health: {}", response.trim());
        }
        Err(e) => {
            println!("Status: NOT RESPONDING");
            println!("Socket exists but connection failed: {}", e);
        }
    }

    Ok(())
}

fn cmd_call_daemon(
    socket: &str,
    method: &str,
    params: serde_json::Value,
    json_output: bool,
) -> Result<()> {
    let socket_path = shellexpand::tilde(socket).to_string();

    let mut stream = UnixStream::connect(&socket_path)
        .context("Failed to connect to daemon. Is it running? Try: prompt-relay start")?;

    let request = serde_json::json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "v": 1,
        "method": method,
        "params": params,
    });

    writeln!(stream, "{}", request)?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response)?;

    if json_output {
        println!("{}", response.trim());
    } else {
        // Pretty print for humans
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&response) {
            if let Some(result) = parsed.get("result") {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else if let Some(error) = parsed.get("error") {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            } else {
                println!("{}", serde_json::to_string_pretty(&parsed)?);
            }
        } else {
            println!("{}", response.trim());
        }
    }

    Ok(())
}
