use std::{error::Error, process, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use desklink::{
    config::Config,
    protocol::Command,
    remote,
    signal,
    state::StateValue,
    target::ConnectionTarget,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the computer running the media server
    #[arg(value_hint = ValueHint::Hostname, env = "DESKLINK_HOST")]
    host: String,

    /// Port of the server's HTTP liveness check
    #[arg(long, env = "DESKLINK_HTTP_PORT", default_value_t = Config::DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Port of the server's websocket
    #[arg(long, env = "DESKLINK_WEBSOCKET_PORT", default_value_t = Config::DEFAULT_WEBSOCKET_PORT)]
    websocket_port: u16,

    /// Seconds to wait before reconnecting after the connection drops
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    retry_interval: u64,

    /// Give up on a connection attempt after this many seconds
    ///
    /// By default an attempt waits for as long as the network lets it.
    #[arg(long, value_name = "SECONDS")]
    connect_timeout: Option<u64>,

    /// Connect without checking the HTTP port first
    #[arg(long, default_value_t = false)]
    no_probe: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

fn config(args: &Args) -> Config {
    let mut config = Config::new();
    config.http_port = args.http_port;
    config.websocket_port = args.websocket_port;
    config.retry_interval = Duration::from_secs(args.retry_interval);
    config.connect_timeout = args.connect_timeout.map(Duration::from_secs);
    config
}

/// Starts connecting to the server, probing its HTTP port first unless
/// disabled.
///
/// A failure is logged and not fatal: the binary keeps running so that the
/// user can retry with SIGHUP. Returns whether the client started.
async fn connect(client: &remote::Client, args: &Args) -> bool {
    let result = if args.no_probe {
        ConnectionTarget::new(&args.host, args.websocket_port.to_string())
            .map(|target| client.start(target))
    } else {
        client.connect(&args.host).await
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            error!("cannot connect to {}: {e}", args.host);
            info!("send SIGHUP to try again");
            false
        }
    }
}

/// Handles one line of user input.
async fn handle_line(client: &remote::Client, line: &str) {
    let result = match line {
        "" => return,
        "toggle" => client.toggle().await,
        "status" => {
            info!("{}", client.status());
            if let Some(track) = client.track() {
                info!("{track}");
            }
            return;
        }
        other => match other.parse::<Command>() {
            Ok(command) => client.send_command(command).await,
            Err(e) => Err(e),
        },
    };

    // Dropped commands are logged by the client itself.
    if let Err(e) = result {
        debug!("{e}");
    }
}

/// Main application loop.
///
/// Runs until a shutdown signal arrives. Connection problems are never fatal:
/// the client keeps reconnecting in the background.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let client = remote::Client::new(config(&args))?;
    let _subscription = client.subscribe(|_, value| match value {
        StateValue::Connection(status) => info!("{status}"),
        StateValue::Track(track) => info!("now playing: {track}"),
    });

    connect(&client, &args).await;

    let mut signals = signal::Handler::new()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            // Prioritize signals.
            biased;

            signal = signals.recv() => {
                client.stop().await;
                if signal.is_shutdown() {
                    info!("shutting down gracefully on {signal}");
                    break Ok(());
                }

                info!("reconnecting on {signal}");
                connect(&client, &args).await;
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&client, line.trim()).await,
                Ok(None) => {
                    debug!("end of input, only signals are handled from now on");
                    stdin_open = false;
                }
                Err(e) => {
                    error!("error reading input: {e}");
                    stdin_open = false;
                }
            },
        }
    }
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");
    info!(
        "commands: {}, toggle, status",
        Command::ALL.map(|command| command.as_str()).join(", ")
    );

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
