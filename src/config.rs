//! Session configuration from the process environment.

use serde::{Deserialize, Serialize};

/// Environment variable selecting the platform index.
pub const PLATFORM_ENV: &str = "RUSTY_EXECUTOR_PLATFORM";
/// Environment variable selecting the device index within the platform.
pub const DEVICE_ENV: &str = "RUSTY_EXECUTOR_DEVICE";

/// Which platform and device a session binds to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub platform: usize,
    pub device: usize,
}

impl SessionConfig {
    pub fn new(platform: usize, device: usize) -> Self {
        Self { platform, device }
    }

    /// Read [`PLATFORM_ENV`] and [`DEVICE_ENV`]. Missing or unparseable values fall
    /// back to index 0; unparseable ones are logged.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            platform: parse_index(&lookup, PLATFORM_ENV, "platform"),
            device: parse_index(&lookup, DEVICE_ENV, "device"),
        }
    }
}

fn parse_index<F>(lookup: &F, key: &str, what: &str) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return 0;
    };
    match raw.trim().parse::<usize>() {
        Ok(index) => index,
        Err(_) => {
            tracing::warn!(
                "invalid {what} id {raw:?} in {key}, using default (0)"
            );
            0
        }
    }
}
