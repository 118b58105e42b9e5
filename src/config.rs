use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::engine::PlaybackPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Panel
    pub panel_refresh_secs: u64,
    pub queue_display_limit: usize,

    // Cola
    pub max_queue_size: usize,
    pub advance_delay_ms: u64,
    pub max_consecutive_failures: u32,
    pub failure_window_secs: u64,

    // Fuentes
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN no está definido"))?,
            application_id: std::env::var("APPLICATION_ID")
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID no está definido"))?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Panel
            panel_refresh_secs: std::env::var("PANEL_REFRESH_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            queue_display_limit: std::env::var("QUEUE_DISPLAY_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Cola
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            advance_delay_ms: std::env::var("ADVANCE_DELAY_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()?,
            max_consecutive_failures: std::env::var("MAX_CONSECUTIVE_FAILURES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            failure_window_secs: std::env::var("FAILURE_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            // Fuentes
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The panel refresh period must be at least one second
    /// - Queue and display limits must be greater than zero
    /// - At least one failure must be tolerated before halting a queue
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if self.panel_refresh_secs == 0 {
            anyhow::bail!("Panel refresh period must be at least 1 second");
        }

        if self.queue_display_limit == 0 {
            anyhow::bail!("Queue display limit must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        if self.failure_window_secs == 0 {
            anyhow::bail!("Failure window must be greater than 0");
        }

        Ok(())
    }

    pub fn panel_refresh_period(&self) -> Duration {
        Duration::from_secs(self.panel_refresh_secs)
    }

    /// Reglas del motor de cola derivadas de la configuración.
    pub fn policy(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            max_queue_size: self.max_queue_size,
            advance_delay: Duration::from_millis(self.advance_delay_ms),
            max_consecutive_failures: self.max_consecutive_failures,
            failure_window: Duration::from_secs(self.failure_window_secs),
            queue_display_limit: self.queue_display_limit,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Panel: refresco cada {}, {} canciones visibles\n  \
            Cola: máximo {}, reintento tras {}, parada tras {} fallos en {}\n  \
            Fuentes: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            humantime::format_duration(self.panel_refresh_period()),
            self.queue_display_limit,
            self.max_queue_size,
            humantime::format_duration(Duration::from_millis(self.advance_delay_ms)),
            self.max_consecutive_failures,
            humantime::format_duration(Duration::from_secs(self.failure_window_secs)),
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
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            panel_refresh_secs: 5,
            queue_display_limit: 10,

            max_queue_size: 1000,
            advance_delay_ms: 1500,
            max_consecutive_failures: 3,
            failure_window_secs: 60,

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
