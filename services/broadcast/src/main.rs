use broadcast::{BroadcastConfig, DEFAULT_GREETING, DEFAULT_PORT};
use clap::{Arg, Command};
use tracing::{error, info};

fn validate_port_value(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| "Invalid port number".to_owned())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "broadcast starting");

    let matches = Command::new("Courier Broadcast")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Channel-broadcast messaging server")
        .arg(
            Arg::new("port")
                .help("The port to listen on")
                .short('p')
                .long("port")
                .value_parser(validate_port_value)
                .default_value("7788"),
        )
        .arg(
            Arg::new("greeting")
                .help("Text of the welcome frame pushed to every client")
                .long("greeting")
                .default_value(DEFAULT_GREETING),
        )
        .get_matches();

    let config = BroadcastConfig {
        bind_port: *matches.get_one::<u16>("port").unwrap_or(&DEFAULT_PORT),
        greeting: matches
            .get_one::<String>("greeting")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GREETING.to_owned()),
    };

    if let Err(e) = broadcast::run(config).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
