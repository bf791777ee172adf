//! Configuration for the image transfer engine, loaded from an optional
//! TOML file. Mirrors the `[MODEM_PARAMETERS]` / `[TRANSMISSION_PARAMETERS]`
//! / `[IMAGE_PARAMETERS]` sections of `ImageTx`'s `.ini`-style config file,
//! reshaped into one TOML document.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ModemParameters {
    pub rx_gain: u8,
    pub agc: bool,
    pub tx_gain: u8,
    pub bit_spread: u8,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TransmissionParameters {
    pub cam_modem_id: u8,
    pub hard_ack: bool,
    pub payload_length: usize,
    pub ack_timeout_ms: u64,
    pub num_retransmissions: u32,
    pub logging: bool,
}

impl TransmissionParameters {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ImageParameters {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub progressive: bool,
    pub use_flash: bool,
    pub use_camera: bool,
}

impl ImageParameters {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Config {
    pub modem: ModemParameters,
    pub transmission: TransmissionParameters,
    pub image: ImageParameters,
}

impl Config {
    /// Parses a config document already read into memory.
    pub fn from_toml_str(text: &str) -> Result<Config> {
        toml::from_str(text).map_err(|e| Error::Image(e.to_string()))
    }

    /// Reads and parses a config file from disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Config::from_toml_str(&text)
    }

    /// Alias for [`Config::from_toml_file`], kept for callers that prefer
    /// the shorter name.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        Config::from_toml_file(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            modem: ModemParameters {
                rx_gain: 0,
                agc: true,
                tx_gain: 0,
                bit_spread: 8,
            },
            transmission: TransmissionParameters {
                cam_modem_id: 0xFF,
                hard_ack: false,
                payload_length: 20,
                ack_timeout_ms: 2000,
                num_retransmissions: 5,
                logging: true,
            },
            image: ImageParameters {
                width: 160,
                height: 120,
                quality: 25,
                progressive: true,
                use_flash: false,
                use_camera: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_retransmission_budget() {
        let cfg = Config::default();
        assert!(cfg.transmission.num_retransmissions > 0);
        assert_eq!(cfg.transmission.ack_timeout(), Duration::from_secs(2));
    }
}
