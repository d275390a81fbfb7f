use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("helpdesk-export")
        .about("Bulk export helpdesk records as NDJSON")
        .arg(
            Arg::new("resource")
                .long("resource")
                .num_args(1)
                .help("tickets | comments | users | organizations | groups | group-memberships | identities | suspended-tickets"),
        )
        .arg(
            Arg::new("start-time")
                .long("start-time")
                .num_args(1)
                .help("Unix seconds or RFC 3339 timestamp for the first page of the incremental ticket export (default 0)"),
        )
        .arg(
            Arg::new("page-size")
                .long("page-size")
                .num_args(1)
                .help("Page size for cursor-paginated resources (default 100)"),
        )
        .arg(
            Arg::new("ticket-id")
                .long("ticket-id")
                .num_args(1)
                .help("Ticket whose comments to export (required for comments)"),
        )
        .arg(
            Arg::new("user-id")
                .long("user-id")
                .num_args(1)
                .help("User whose identities to export (required for identities)"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .num_args(1)
                .help("Stop the export after this many records"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Respect explicit level, else default to info, allow env override via RUST_LOG
    if let Some(lvl) = level {
        std::env::set_var("RUST_LOG", lvl);
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
