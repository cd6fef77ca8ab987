//! Fake networked TV
//!
//! Line protocol, CRLF terminated ASCII:
//! ```text
//! POWR <0|1|?>     VOLM <0-100|?>     MUTE <0|1|?>     INPT <name|?>
//! ```
//! Queries answer the originator only, changes are broadcast. Bad commands
//! and values answer `ERR`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::framing::Framing;
use crate::network::ServerHandle;
use crate::protocol::{Message, MessageHandler, Response};
use super::{message_text, Transport};

pub const FAKE_TV_VERSION: &str = "1.0.0";

const INPUTS: [&str; 4] = ["HDMI_1", "HDMI_2", "VGA", "DVI"];

#[derive(Debug)]
struct TvState {
    power: bool,
    volume: u8,
    mute: bool,
    input: String,

    /// Set between power-on and the simulated reboot disconnect
    booting: bool,
}

/// Emulated TV
///
/// Powering on broadcasts `POWR 1`, ignores every message for `boot_delay`
/// and then drops all clients, like sets whose network stack restarts
/// during power-up.
pub struct FakeTv {
    state: Arc<Mutex<TvState>>,
    transport: Arc<Transport>,
    boot_delay: Duration,
}

impl FakeTv {
    pub fn new(boot_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TvState {
                power: false,
                volume: 0,
                mute: false,
                input: INPUTS[0].to_string(),
                booting: false,
            })),
            transport: Arc::new(Transport::default()),
            boot_delay,
        }
    }

    /// Server configuration this device speaks
    pub fn server_config(port: u16) -> ServerConfig {
        ServerConfig::builder()
            .port(port)
            .framing(Framing::crlf_ascii())
            .welcome_message(Self::welcome_message())
            .build()
    }

    pub fn welcome_message() -> String {
        format!("FakeTvServer v{}", FAKE_TV_VERSION)
    }

    /// Attach the running server, needed for power-on broadcasts
    pub fn attach(&self, handle: ServerHandle) {
        self.transport.attach(handle);
    }

    pub fn is_powered(&self) -> bool {
        self.state.lock().power
    }

    pub fn is_booting(&self) -> bool {
        self.state.lock().booting
    }

    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    fn handle_power(&self, state: &mut TvState, value: &str) -> Option<Response> {
        let requested = match value {
            "?" => return Some(Response::reply(power_reply(state.power))),
            "0" => false,
            "1" => true,
            _ => return Some(Response::reply("ERR")),
        };

        let was_on = state.power;
        state.power = requested;

        if !was_on && requested {
            state.booting = true;
            if let Err(e) = self.transport.broadcast(power_reply(true)) {
                tracing::warn!("Could not broadcast power on: {}", e);
            }
            self.schedule_reboot();
            return None;
        }

        Some(Response::broadcast(power_reply(state.power)))
    }

    fn handle_volume(&self, state: &mut TvState, value: &str) -> Option<Response> {
        if value == "?" {
            return Some(Response::reply(format!("VOLM {}", state.volume)));
        }
        match value.parse::<u8>() {
            Ok(volume) if volume <= 100 => {
                state.volume = volume;
                Some(Response::broadcast(format!("VOLM {}", volume)))
            }
            _ => Some(Response::reply("ERR")),
        }
    }

    fn handle_mute(&self, state: &mut TvState, value: &str) -> Option<Response> {
        match value {
            "?" => Some(Response::reply(format!("MUTE {}", state.mute as u8))),
            "0" | "1" => {
                state.mute = value == "1";
                Some(Response::broadcast(format!("MUTE {}", value)))
            }
            _ => Some(Response::reply("ERR")),
        }
    }

    fn handle_input(&self, state: &mut TvState, value: &str) -> Option<Response> {
        if value == "?" {
            return Some(Response::reply(format!("INPT {}", state.input)));
        }
        if !INPUTS.contains(&value) {
            return Some(Response::reply("ERR"));
        }
        state.input = value.to_string();
        Some(Response::broadcast(format!("INPT {}", state.input)))
    }

    /// End the boot phase after `boot_delay` and drop every client
    fn schedule_reboot(&self) {
        let state = Arc::clone(&self.state);
        let transport = Arc::clone(&self.transport);
        let delay = self.boot_delay;

        thread::spawn(move || {
            thread::sleep(delay);
            state.lock().booting = false;
            transport.close_all_clients();
        });
    }
}

impl Default for FakeTv {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl MessageHandler for FakeTv {
    fn handle_message(&self, message: Message) -> Result<Option<Response>> {
        let text = message_text(&message);
        tracing::info!("Message received: {:?}", text);

        let mut state = self.state.lock();
        if state.booting {
            return Ok(None);
        }

        let (command, value) = match text.split_once(' ') {
            Some((command, value)) if !value.contains(' ') => (command, value),
            Some(_) => (text.as_str(), ""),
            None => (text.as_str(), ""),
        };

        let response = match command {
            "POWR" => self.handle_power(&mut state, value),
            "VOLM" => self.handle_volume(&mut state, value),
            "MUTE" => self.handle_mute(&mut state, value),
            "INPT" => self.handle_input(&mut state, value),
            _ => Some(Response::reply("ERR")),
        };

        if let Some(response) = &response {
            tracing::info!("Sending response: {:?}", response.payload);
        }
        Ok(response)
    }
}

fn power_reply(power: bool) -> String {
    format!("POWR {}", power as u8)
}
