// Run configuration. Everything comes from the environment (optionally
// seeded from a `.env` file by the binary); nothing is read from disk here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PosterError, Result};

pub const DEFAULT_VK_API_URL: &str = "https://api.vk.com/method";
pub const DEFAULT_VK_API_VERSION: &str = "5.131";
pub const DEFAULT_XKCD_API_URL: &str = "https://xkcd.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for a single run.
#[derive(Clone)]
pub struct Config {
    pub access_token: String,
    pub group_id: u64,
    pub api_version: String,
    pub vk_api_url: String,
    pub xkcd_api_url: String,
    /// Upper bound for the random comic id. `None` means ask the provider.
    pub max_comic_id: Option<u32>,
    pub scratch_dir: PathBuf,
    pub timeout: Duration,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values
    /// are treated as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| PosterError::Config(format!("{key} is not set")))
        };

        let access_token = require("VK_ACCESS_TOKEN")?;
        let group_id = parse_positive::<u64>("VK_GROUP_ID", &require("VK_GROUP_ID")?)?;

        let max_comic_id = get("XKCD_MAX_COMIC_ID")
            .map(|raw| parse_positive::<u32>("XKCD_MAX_COMIC_ID", &raw))
            .transpose()?;
        let timeout_secs = get("HTTP_TIMEOUT_SECS")
            .map(|raw| parse_positive::<u64>("HTTP_TIMEOUT_SECS", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Config {
            access_token,
            group_id,
            api_version: get("VK_API_VERSION").unwrap_or_else(|| DEFAULT_VK_API_VERSION.into()),
            vk_api_url: trim_base(get("VK_API_URL").unwrap_or_else(|| DEFAULT_VK_API_URL.into())),
            xkcd_api_url: trim_base(
                get("XKCD_API_URL").unwrap_or_else(|| DEFAULT_XKCD_API_URL.into()),
            ),
            max_comic_id,
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_scratch_dir),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_token", &"<redacted>")
            .field("group_id", &self.group_id)
            .field("api_version", &self.api_version)
            .field("vk_api_url", &self.vk_api_url)
            .field("xkcd_api_url", &self.xkcd_api_url)
            .field("max_comic_id", &self.max_comic_id)
            .field("scratch_dir", &self.scratch_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `<user cache dir>/xkcd-vk-poster`, falling back to the system temp dir.
pub fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(env!("CARGO_PKG_NAME")))
        .unwrap_or_else(std::env::temp_dir)
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(PosterError::Config(format!(
            "{key} must be a positive integer, got {raw:?}"
        ))),
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
