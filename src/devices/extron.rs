//! Extron MPS 601 presentation switcher
//!
//! Six inputs, one output, SIS-style commands:
//! - `<n>!` selects input `n` (`In<n> All`), `E06` while auto switching
//! - `<ESC><n>AUSW` sets the auto switch mode, `<ESC>AUSW` reads it
//! - `0LS` reports signal presence on every input and the output
//! - `<ESC><n>CV` sets verbose mode, `<ESC>CV` reads it
//!
//! Anything else answers `E10`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::error::{ImitarError, Result};
use crate::framing::Framing;
use crate::network::ServerHandle;
use crate::protocol::{Message, MessageHandler, Response};
use super::{message_text, Transport};

pub const INPUT_COUNT: usize = 6;

#[derive(Debug)]
struct SwitcherState {
    /// Signal presence for inputs 1-6, then the output
    connection_state: [u8; INPUT_COUNT + 1],
    active_input: usize,
    auto_switch_mode: u8,
}

impl SwitcherState {
    fn signal_report(&self) -> String {
        let inputs: Vec<String> = self.connection_state[..INPUT_COUNT]
            .iter()
            .map(|state| state.to_string())
            .collect();
        format!("{}*{}", inputs.join(" "), self.connection_state[INPUT_COUNT])
    }
}

/// Emulated Extron MPS 601
pub struct ExtronMps601 {
    state: Mutex<SwitcherState>,
    transport: Arc<Transport>,
}

impl ExtronMps601 {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SwitcherState {
                connection_state: [1; INPUT_COUNT + 1],
                active_input: 1,
                auto_switch_mode: 0,
            }),
            transport: Arc::new(Transport::default()),
        }
    }

    /// Server configuration this device speaks
    pub fn server_config(port: u16) -> ServerConfig {
        ServerConfig::builder()
            .port(port)
            .framing(Framing::crlf_ascii())
            .build()
    }

    /// Attach the running server, needed for operator-driven broadcasts
    pub fn attach(&self, handle: ServerHandle) {
        self.transport.attach(handle);
    }

    pub fn active_input(&self) -> usize {
        self.state.lock().active_input
    }

    /// Plug or unplug a signal and tell every client
    ///
    /// `index` 0-5 are inputs 1-6, 6 is the output.
    pub fn set_connection_status(&self, index: usize, connected: bool) -> Result<()> {
        if index > INPUT_COUNT {
            return Err(ImitarError::handler(format!(
                "connection index {} out of range 0-{}",
                index, INPUT_COUNT
            )));
        }

        let report = {
            let mut state = self.state.lock();
            state.connection_state[index] = connected as u8;
            format!("Sig {}", state.signal_report())
        };
        tracing::debug!("Set connection status: {}, {}", index, connected as u8);
        self.transport.broadcast(report)
    }

    /// Switch input from the front panel and tell every client
    pub fn set_input(&self, input: usize) -> Result<()> {
        if !(1..=INPUT_COUNT).contains(&input) {
            return Err(ImitarError::handler(format!(
                "input {} out of range 1-{}",
                input, INPUT_COUNT
            )));
        }
        self.state.lock().active_input = input;
        self.transport.broadcast(format!("In{} All", input))
    }

    fn handle_input(state: &mut SwitcherState, message: &str) -> Response {
        match message.chars().next().and_then(|c| c.to_digit(10)) {
            Some(input) if state.auto_switch_mode == 0 => {
                state.active_input = input as usize;
                Response::broadcast(format!("In{} All", input))
            }
            Some(_) => Response::reply("E06"),
            None => Response::reply(state.active_input.to_string()),
        }
    }

    fn handle_auto_switch(state: &mut SwitcherState, message: &str) -> Response {
        match message.chars().nth(1) {
            Some('A') => Response::reply(state.auto_switch_mode.to_string()),
            Some(c) => match c.to_digit(10) {
                Some(mode @ 1..=2) => {
                    state.auto_switch_mode = mode as u8;
                    Response::broadcast(format!("Ausw{}", mode))
                }
                _ => Response::reply("E13"),
            },
            None => Response::reply("E13"),
        }
    }

    /// Verbose mode is reported as always on; it is per-connection on the
    /// real unit and connections have no session state here.
    fn handle_verbose_mode(message: &str) -> Response {
        match message.chars().nth(1).filter(|c| c.is_ascii_digit()) {
            Some(mode) => Response::broadcast(format!("Vrb{}", mode)),
            None => Response::reply("1"),
        }
    }
}

impl Default for ExtronMps601 {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for ExtronMps601 {
    fn handle_message(&self, message: Message) -> Result<Option<Response>> {
        let text = message_text(&message);
        tracing::info!("Message received: {:?}", text);

        let mut state = self.state.lock();
        let response = if text.contains("AUSW") {
            Self::handle_auto_switch(&mut state, &text)
        } else if text.contains('!') {
            Self::handle_input(&mut state, &text)
        } else if text.contains("0LS") {
            Response::reply(state.signal_report())
        } else if text.contains("CV") {
            Self::handle_verbose_mode(&text)
        } else {
            Response::reply("E10")
        };

        tracing::info!("Sending response: {:?}", response.payload);
        Ok(Some(response))
    }
}
