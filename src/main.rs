use clap::{Parser, Subcommand};
use imgrelay::client::Client;
use imgrelay::config::{self, ServerConfig};
use imgrelay::imaging::RustBackend;
use imgrelay::output;
use imgrelay::protocol::Instruction;
use imgrelay::registry::OperationRegistry;
use imgrelay::server::Server;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imgrelay")]
#[command(about = "TCP image transformation server")]
#[command(long_about = "\
TCP image transformation server

Clients send an operation, a parameter, and an encoded image. The server
validates the operation, applies it, and sends back the re-encoded result.
Invalid requests are answered by closing the connection.

Wire format, per connection:

  client → server   u32be len | operation | u32be len | parameter
  client → server   image bytes, ended by half-close
  server → client   result bytes, ended by close

Run 'imgrelay operations' to list operations and parameter types.
Run 'imgrelay gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept connections and transform images
    Serve(ServeArgs),
    /// Send one image to a server and save the result
    Send(SendArgs),
    /// List supported operations and their parameter types
    Operations,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Config file (optional; stock defaults otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(long)]
    bind: Option<IpAddr>,

    /// TCP port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Concurrent sessions (overrides config)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(clap::Args)]
struct SendArgs {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Operation name, e.g. resize or colour
    #[arg(long)]
    op: String,

    /// Operation parameter, e.g. 0.5 or grey
    #[arg(long)]
    param: String,

    /// Largest fragment written to the server
    #[arg(long, default_value_t = imgrelay::protocol::DEFAULT_FRAGMENT_SIZE)]
    fragment_size: usize,

    /// Image to send
    input: PathBuf,

    /// Where to write the result
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = serve_config(&args)?;
            init_tracing(&config.logging.level);
            init_thread_pool(&config);

            let backend = RustBackend::with_encoding(config.encode_params())
                .with_max_pixels(config.output.max_pixels);
            let server = Server::bind(&config, backend)?;
            output::print_serve_banner(server.local_addr(), server.workers(), &config);
            server.run()?;
        }
        Command::Send(args) => {
            init_tracing("warn");
            let payload = std::fs::read(&args.input)?;
            let instruction = Instruction::new(args.op, args.param);
            let response = Client::new()
                .with_fragment_size(args.fragment_size)
                .send(args.server.as_str(), &instruction, &payload)?;
            std::fs::write(&args.output, &response)?;
            output::print_send_result(&instruction, &args.output, payload.len(), response.len());
        }
        Command::Operations => {
            output::print_operations(&OperationRegistry::standard());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file, then apply command-line overrides and re-validate.
fn serve_config(args: &ServeArgs) -> Result<ServerConfig, config::ConfigError> {
    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind.to_string();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(workers) = args.workers {
        config.workers.count = Some(workers);
    }
    config.validate()?;
    Ok(config)
}

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Size rayon's global pool to the worker count, clamped to the cores.
///
/// Pixel loops inside one session run on rayon; capping it keeps a busy
/// server from oversubscribing the cores.
fn init_thread_pool(config: &ServerConfig) {
    let threads = config::pixel_threads(&config.workers);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
