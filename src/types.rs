// src/types.rs
use crate::error::{StripeError, Result};
use std::fmt;
use std::str::FromStr;

/// Extended Block Mode descriptor byte.
///
/// Only `END_OF_DATA` changes how a stripe is handled. The remaining GridFTP
/// descriptor bits are named so that decoded headers can be inspected, but
/// they carry no behavior here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockFlags(u8);

impl BlockFlags {
    pub const SENDER_CLOSES: u8 = 1 << 2;
    pub const END_OF_DATA: u8 = 1 << 3;
    pub const SUSPECT_ERRORS: u8 = 1 << 5;
    pub const EOD_COUNT: u8 = 1 << 6;

    pub fn new(flags: u8) -> Self {
        BlockFlags(flags)
    }

    pub fn empty() -> Self {
        BlockFlags(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_end_of_data(&self) -> bool {
        self.contains(Self::END_OF_DATA)
    }

    pub fn set_end_of_data(&mut self, value: bool) {
        if value {
            self.0 |= Self::END_OF_DATA;
        } else {
            self.0 &= !Self::END_OF_DATA;
        }
    }

    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag;
    }
}

/// Stripe layout negotiated for a striped transfer.
///
/// Values normally come from the control channel's `OPTS RETR` option
/// string, e.g. `Parallelism=4;BlockSize=65536;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeOptions {
    /// Number of stripes (parallel data connections)
    pub parallelism: usize,
    /// Largest payload carried by a single segment
    pub block_size: usize,
}

impl StripeOptions {
    pub fn new(parallelism: usize, block_size: usize) -> Result<Self> {
        let options = StripeOptions { parallelism, block_size };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism < 1 {
            return Err(StripeError::InvalidConfig("parallelism must be at least 1".into()));
        }
        if self.block_size < 1 {
            return Err(StripeError::InvalidConfig("block size must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for StripeOptions {
    /// What a server assumes after `MODE E` until `OPTS RETR` says otherwise.
    fn default() -> Self {
        StripeOptions {
            parallelism: 4,
            block_size: 500,
        }
    }
}

impl FromStr for StripeOptions {
    type Err = StripeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut options = StripeOptions::default();

        for part in s.trim().trim_end_matches(';').split(';') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| StripeError::InvalidConfig(format!("malformed option '{}'", part)))?;
            let value = value.trim();

            match key.trim().to_ascii_uppercase().as_str() {
                "PARALLELISM" => options.parallelism = parse_count("Parallelism", value)?,
                "BLOCKSIZE" => options.block_size = parse_count("BlockSize", value)?,
                "STRIPELAYOUT" => {
                    if !value.eq_ignore_ascii_case("blocked") {
                        return Err(StripeError::InvalidConfig(format!(
                            "unsupported stripe layout '{}' (only Blocked)",
                            value
                        )));
                    }
                }
                _ => {}
            }
        }

        options.validate()?;
        Ok(options)
    }
}

impl fmt::Display for StripeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parallelism={};BlockSize={};", self.parallelism, self.block_size)
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(StripeError::InvalidConfig(format!("{} must be a positive integer, got '{}'", name, value))),
    }
}
