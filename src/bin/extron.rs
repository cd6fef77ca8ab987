//! Extron MPS 601 Emulator Binary
//!
//! Serves the switcher protocol and takes front-panel actions from stdin:
//! - `c <io> <0|1>`: plug or unplug input 0-5 (6 is the output)
//! - `s <input>`: switch to input 1-6
//! - `quit`: stop
//!
//! SIGINT and SIGTERM also stop it, closing every client first.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use imitar::devices::ExtronMps601;
use imitar::{Server, StopSignal};

/// Extron MPS 601 emulator
#[derive(Parser, Debug)]
#[command(name = "extron-mps601")]
#[command(about = "Emulates an Extron MPS 601 switcher over TCP")]
#[command(version)]
struct Args {
    /// Port to bind the TCP service to
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Operator command read from stdin
#[derive(Debug, PartialEq)]
enum PanelAction {
    Connection { index: usize, connected: bool },
    Switch { input: usize },
    Quit,
}

fn parse_action(line: &str) -> Result<PanelAction, String> {
    let options: Vec<&str> = line.split_whitespace().collect();
    match options.as_slice() {
        ["quit"] => Ok(PanelAction::Quit),
        ["c", index, status] => {
            let index = index.parse().map_err(|_| format!("bad index {:?}", index))?;
            let status: u8 = status.parse().map_err(|_| format!("bad status {:?}", status))?;
            Ok(PanelAction::Connection {
                index,
                connected: status != 0,
            })
        }
        ["c", ..] => Err("The connection command takes two args".to_string()),
        ["s", input] => {
            let input = input.parse().map_err(|_| format!("bad input {:?}", input))?;
            Ok(PanelAction::Switch { input })
        }
        ["s", ..] => Err("The switch command takes one arg".to_string()),
        _ => Err("Commands: c <io> <0|1>, s <input>, quit".to_string()),
    }
}

fn main() {
    let args = Args::parse();
    imitar::init_logging(args.debug);

    let switcher = Arc::new(ExtronMps601::new());

    let mut config = ExtronMps601::server_config(args.port);
    config.debug_logging = args.debug;

    let mut server = match Server::start(config, Arc::clone(&switcher)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    switcher.attach(server.handle());

    tracing::info!("ExtronMps601Emulator v{} started on {}", imitar::VERSION, server.local_addr());

    let stop = match imitar::stop_signal() {
        Ok(stop) => stop,
        Err(e) => {
            tracing::error!("Failed to install signal handler: {}", e);
            server.shutdown();
            std::process::exit(1);
        }
    };

    let panel = {
        let stop = stop.clone();
        let switcher = Arc::clone(&switcher);
        thread::Builder::new()
            .name("extron-front-panel".to_string())
            .spawn(move || read_panel_actions(&switcher, &stop))
    };
    if let Err(e) = panel {
        tracing::warn!("No front-panel input: {}", e);
    }

    // Until quit is typed or a termination signal arrives
    stop.wait();
    server.shutdown();
}

/// Apply front-panel actions typed on stdin until `quit`
fn read_panel_actions(switcher: &ExtronMps601, stop: &StopSignal) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                return;
            }
        };

        let result = match parse_action(&line) {
            Ok(PanelAction::Quit) => {
                stop.trigger();
                return;
            }
            Ok(PanelAction::Connection { index, connected }) => {
                switcher.set_connection_status(index, connected)
            }
            Ok(PanelAction::Switch { input }) => switcher.set_input(input),
            Err(usage) => {
                println!("{}", usage);
                continue;
            }
        };

        if let Err(e) = result {
            println!("{}", e);
        }
    }
}
