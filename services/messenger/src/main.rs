use clap::{Arg, Command};
use messenger::{DEFAULT_GREETING, DEFAULT_PORT, MessengerConfig};
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

    info!(version = env!("CARGO_PKG_VERSION"), "messenger starting");

    let matches = Command::new("Courier Messenger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Direct-messaging server")
        .arg(
            Arg::new("port")
                .help("The port to listen on")
                .short('p')
                .long("port")
                .value_parser(validate_port_value)
                .default_value("7777"),
        )
        .arg(
            Arg::new("greeting")
                .help("Text of the welcome frame pushed to every client")
                .long("greeting")
                .default_value(DEFAULT_GREETING),
        )
        .get_matches();

    let config = MessengerConfig {
        bind_port: *matches.get_one::<u16>("port").unwrap_or(&DEFAULT_PORT),
        greeting: matches
            .get_one::<String>("greeting")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GREETING.to_owned()),
    };

    if let Err(e) = messenger::run(config).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
