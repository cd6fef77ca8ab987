//! Fake TV Emulator Binary
//!
//! Serves the fake TV protocol until `quit` is typed or SIGINT/SIGTERM arrives.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use imitar::devices::FakeTv;
use imitar::{Server, StopSignal};

/// Fake networked TV
#[derive(Parser, Debug)]
#[command(name = "fake-tv")]
#[command(about = "Emulates a networked TV over TCP")]
#[command(version)]
struct Args {
    /// Port to bind the TCP service to
    #[arg(default_value = "5000")]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Seconds the TV ignores input after power-on before dropping clients
    #[arg(short, long, default_value = "3")]
    boot_delay: u64,

    /// Number of clients served at once
    #[arg(short, long, default_value = "4")]
    workers: usize,
}

fn main() {
    let args = Args::parse();
    imitar::init_logging(args.debug);

    let tv = Arc::new(FakeTv::new(Duration::from_secs(args.boot_delay)));

    let mut config = FakeTv::server_config(args.port);
    config.debug_logging = args.debug;
    config.worker_pool_size = args.workers;

    let mut server = match Server::start(config, Arc::clone(&tv)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    tv.attach(server.handle());

    tracing::info!("{} started on {}", FakeTv::welcome_message(), server.local_addr());
    if args.debug {
        tracing::debug!("Debug mode enabled");
    }

    let stop = match imitar::stop_signal() {
        Ok(stop) => stop,
        Err(e) => {
            tracing::error!("Failed to install signal handler: {}", e);
            server.shutdown();
            std::process::exit(1);
        }
    };

    let operator = stop.clone();
    let spawned = thread::Builder::new()
        .name("fake-tv-stdin".to_string())
        .spawn(move || read_operator_input(operator));
    if let Err(e) = spawned {
        tracing::warn!("No operator input: {}", e);
    }

    // Until quit is typed or a termination signal arrives
    stop.wait();
    server.shutdown();
}

/// Wait for `quit` on stdin; a closed stdin keeps the emulator serving
fn read_operator_input(stop: StopSignal) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" => {
                stop.trigger();
                return;
            }
            Ok(_) => println!("Type 'quit' to stop the emulator"),
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                return;
            }
        }
    }
}
