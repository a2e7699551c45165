use anyhow::{Context, Result};
use std::time::Duration;

/// Family A: Piped API mirrors.
pub const DEFAULT_PIPED_INSTANCES: &[&str] = &[
    "https://pipedapi.kavin.rocks",
    "https://pipedapi.tokhmi.xyz",
    "https://pipedapi.moomoo.me",
    "https://pipedapi.syncpundit.io",
    "https://api-piped.mha.fi",
    "https://pipedapi.rivo.lol",
];

/// Family B: Cobalt API mirrors.
pub const DEFAULT_COBALT_INSTANCES: &[&str] = &[
    "https://api.cobalt.tools",
    "https://cobalt-api.hyper.lol",
    "https://api.cobalt.lol",
    "https://cobalt.api.timelessnesses.me",
];

/// Family C: Invidious mirrors.
pub const DEFAULT_INVIDIOUS_INSTANCES: &[&str] = &[
    "https://api.invidious.io",
    "https://invidious.flokinet.to",
    "https://invidious.nerdvpn.de",
];

pub const DEFAULT_TEMP_VOICE_CATEGORY: &str = "Temp Channels";
pub const DEFAULT_TEMP_VOICE_CREATOR: &str = "➕ Create Voice";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Hard ceiling for playlist loads.
pub const PLAYLIST_HARD_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Canales de voz temporales
    pub temp_voice_category: String,
    pub temp_voice_creator: String,

    // Cola y reproducción
    pub default_volume: u8,
    pub max_playlist_size: usize,
    pub history_size: usize,
    pub max_play_retries: u32,
    pub reconnect_window: Duration,

    // Resolución de audio
    pub probe_timeout: Duration,
    pub piped_instances: Vec<String>,
    pub cobalt_instances: Vec<String>,
    pub invidious_instances: Vec<String>,
    pub user_agent: String,

    // Binarios externos
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no configurado")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Canales de voz temporales
            temp_voice_category: std::env::var("TEMP_VOICE_CATEGORY")
                .unwrap_or_else(|_| DEFAULT_TEMP_VOICE_CATEGORY.to_string()),
            temp_voice_creator: std::env::var("TEMP_VOICE_CREATOR")
                .unwrap_or_else(|_| DEFAULT_TEMP_VOICE_CREATOR.to_string()),

            // Cola y reproducción
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| PLAYLIST_HARD_LIMIT.to_string())
                .parse()
                .context("MAX_PLAYLIST_SIZE inválido")?,
            history_size: std::env::var("HISTORY_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("HISTORY_SIZE inválido")?,
            max_play_retries: std::env::var("MAX_PLAY_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("MAX_PLAY_RETRIES inválido")?,
            reconnect_window: duration_var("RECONNECT_WINDOW", "5s")?,

            // Resolución de audio
            probe_timeout: duration_var("PROBE_TIMEOUT", "18s")?,
            piped_instances: instances_var("PIPED_INSTANCES", DEFAULT_PIPED_INSTANCES),
            cobalt_instances: instances_var("COBALT_INSTANCES", DEFAULT_COBALT_INSTANCES),
            invidious_instances: instances_var("INVIDIOUS_INSTANCES", DEFAULT_INVIDIOUS_INSTANCES),
            user_agent: std::env::var("USER_AGENT").unwrap_or_else(|_| USER_AGENT.to_string()),

            // Binarios externos
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Playlist size must be between 1 and 50
    /// - Every proxy family needs at least one instance
    /// - Timeouts must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.max_playlist_size == 0 || self.max_playlist_size > PLAYLIST_HARD_LIMIT {
            anyhow::bail!(
                "Max playlist size must be between 1 and {}, got: {}",
                PLAYLIST_HARD_LIMIT,
                self.max_playlist_size
            );
        }

        if self.history_size == 0 {
            anyhow::bail!("History size must be greater than 0");
        }

        if self.piped_instances.is_empty()
            || self.cobalt_instances.is_empty()
            || self.invidious_instances.is_empty()
        {
            anyhow::bail!("Every proxy family needs at least one instance");
        }

        if self.probe_timeout.is_zero() || self.reconnect_window.is_zero() {
            anyhow::bail!("Timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}, temp voice '{}' / '{}'\n  \
            Playback: {}% vol, history {}, {} retries, reconnect {:?}\n  \
            Sources: {} piped, {} cobalt, {} invidious, probe timeout {:?}\n  \
            Limits: {} playlist tracks\n  \
            Binaries: {} / {}",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.temp_voice_category,
            self.temp_voice_creator,
            self.default_volume,
            self.history_size,
            self.max_play_retries,
            self.reconnect_window,
            self.piped_instances.len(),
            self.cobalt_instances.len(),
            self.invidious_instances.len(),
            self.probe_timeout,
            self.max_playlist_size,
            self.ffmpeg_path,
            self.ytdlp_path,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            temp_voice_category: DEFAULT_TEMP_VOICE_CATEGORY.to_string(),
            temp_voice_creator: DEFAULT_TEMP_VOICE_CREATOR.to_string(),

            default_volume: 100,
            max_playlist_size: PLAYLIST_HARD_LIMIT,
            history_size: 50,
            max_play_retries: 2,
            reconnect_window: Duration::from_secs(5),

            probe_timeout: Duration::from_secs(18),
            piped_instances: to_owned_list(DEFAULT_PIPED_INSTANCES),
            cobalt_instances: to_owned_list(DEFAULT_COBALT_INSTANCES),
            invidious_instances: to_owned_list(DEFAULT_INVIDIOUS_INSTANCES),
            user_agent: USER_AGENT.to_string(),

            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

fn duration_var(name: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim()).with_context(|| format!("{} inválido: {}", name, raw))
}

fn instances_var(name: &str, defaults: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_instance_list(&raw),
        _ => to_owned_list(defaults),
    }
}

/// Splits a comma-separated list of base URLs, dropping blanks and trailing slashes.
fn parse_instance_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = Config {
            default_volume: 101,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_playlist_size: 51,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            cobalt_instances: Vec::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn instance_list_parsing_trims_entries() {
        assert_eq!(
            parse_instance_list(" https://a.example/ ,, https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn summary_never_contains_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
