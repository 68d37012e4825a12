use std::{env, env::VarError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    /// Run one scheduled job once, then exit
    RunJob(String),
    Help,
}

/// The server takes no options; the only sub-command is `run-job <name>`. Anything else prints the help.
pub fn handle_command_line_args() -> Command {
    let command = parse_args(env::args().skip(1));
    if command == Command::Help {
        display_readme();
        display_envs();
    }
    command
}

pub fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Command {
    match (args.next().as_deref(), args.next(), args.next()) {
        (None, _, _) => Command::Serve,
        (Some("run-job"), Some(name), None) => Command::RunJob(name),
        _ => Command::Help,
    }
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "MPG_HOST",
        "MPG_PORT",
        "MPG_DATABASE_URL",
        "MPG_ORDER_TTL_MINUTES",
        "MPG_RECONCILE_GRACE_MINUTES",
        "MPG_ALIPAY_RECONCILE_SECS",
        "MPG_WX_RECONCILE_SECS",
        "MPG_JANITOR_RETENTION_DAYS",
        "MPG_JANITOR_HOUR",
        "MPG_LOCK_LEASE_SECS",
        "MPG_PROVIDER_TIMEOUT_SECS",
        "MPG_CLOSE_RETRY_ATTEMPTS",
        "MPG_RECEIPT_WEBHOOK_URL",
        "MPG_USE_X_FORWARDED_FOR",
        "MPG_ALIPAY_APP_ID",
        "MPG_ALIPAY_GATEWAY_URL",
        "MPG_ALIPAY_NOTIFY_URL",
        "MPG_WX_APP_ID",
        "MPG_WX_MCH_ID",
        "MPG_WX_NOTIFY_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
