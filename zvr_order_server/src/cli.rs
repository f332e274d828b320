use std::{env, env::VarError};

/// The server has no command line interface. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets (ZVR_ADMIN_API_KEY, ZVR_MIDTRANS_SERVER_KEY and the gateway API keys) are never printed
    const DISPLAY_ENVS: [&str; 23] = [
        "RUST_LOG",
        "ZVR_HOST",
        "ZVR_PORT",
        "ZVR_DATABASE_URL",
        "ZVR_ORDER_TTL_HOURS",
        "ZVR_EXPIRY_BATCH_SIZE",
        "ZVR_PAYMENT_STALE_MINUTES",
        "ZVR_PAYMENT_EXPIRY_GRACE_MINUTES",
        "ZVR_RECONCILE_WINDOW_START_HOUR",
        "ZVR_RECONCILE_WINDOW_END_HOUR",
        "ZVR_CHARGE_TIMEOUT_SECS",
        "ZVR_REFUND_TIMEOUT_SECS",
        "ZVR_STATUS_TIMEOUT_SECS",
        "ZVR_TAX_RATE_BPS",
        "ZVR_DISABLE_WORKERS",
        "ZVR_MIDTRANS_BASE_URL",
        "ZVR_MIDTRANS_IS_PRODUCTION",
        "ZVR_SHIPPING_BASE_URL",
        "ZVR_MAILER_BASE_URL",
        "ZVR_MAILER_SENDER",
        "ZVR_SHIPPING_API_KEY_SET",
        "ZVR_MAILER_API_KEY_SET",
        "ZVR_MIDTRANS_SERVER_KEY_SET",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match name.strip_suffix("_SET") {
            Some(secret) => if env::var(secret).is_ok() { "Set" } else { "Not set" }.to_string(),
            None => match env::var(name) {
                Ok(s) => s,
                Err(VarError::NotPresent) => "Not set".into(),
                Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
            },
        };
        println!("  {name:<35} {val:<15}");
    })
}
