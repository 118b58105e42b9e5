use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_playlist_url, is_url, Resolution, ResolvedSource, SourceResolver, StreamLocator};
use crate::{
    error::PlayerError,
    ui::embeds::{format_duration, truncate_chars},
};

/// Longitud máxima del detalle de error que se muestra al usuario.
const MAX_ERROR_DETAIL: usize = 150;
/// Entradas que se leen como máximo de una playlist.
const MAX_PLAYLIST_ENTRIES: usize = 100;

/// Resolver basado en `yt-dlp`. Acepta términos de búsqueda, enlaces y
/// enlaces de playlist.
pub struct YtDlpResolver {
    binary: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    /// Las entradas de `--flat-playlist` solo traen `url`.
    url: Option<String>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<YtDlpInfo>>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Comprueba que el binario existe y responde (usado por `--health-check`).
    pub async fn verify(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con error", self.binary);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn target(query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    /// Ejecuta yt-dlp y devuelve su stdout, o el fallo ya clasificado.
    async fn run(&self, args: &[&str], query: &str) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló para '{}': {}", query, stderr.trim());
            return Err(PlayerError::Resolve(describe_failure(&stderr)).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Option<Resolution>> {
        let _permit = self.rate_limiter.acquire().await?;

        if is_playlist_url(query) {
            let target = query.trim();
            info!("🧾 Resolviendo playlist: {}", target);

            let limit = MAX_PLAYLIST_ENTRIES.to_string();
            let stdout = self
                .run(
                    &[
                        "--flat-playlist",
                        "--dump-single-json",
                        "--no-warnings",
                        "--playlist-end",
                        limit.as_str(),
                        target,
                    ],
                    query,
                )
                .await?;
            return parse_playlist(&stdout);
        }

        let target = Self::target(query);
        info!("🔍 Resolviendo: {}", target);

        let stdout = self
            .run(
                &[
                    "--no-playlist",
                    "--dump-json",
                    "--skip-download",
                    "--no-warnings",
                    target.as_str(),
                ],
                query,
            )
            .await?;

        let resolved = parse_first(&stdout)?;
        if resolved.is_none() {
            debug!("📭 Sin resultados para '{}'", query);
        }
        Ok(resolved.map(Resolution::Single))
    }
}

/// Toma la primera línea JSON de la salida de yt-dlp.
fn parse_first(stdout: &str) -> Result<Option<ResolvedSource>> {
    let Some(line) = stdout.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Ok(None);
    };

    let info: YtDlpInfo =
        serde_json::from_str(line).context("Error al parsear respuesta de yt-dlp")?;
    Ok(source_from(info))
}

/// Lee la salida de `--flat-playlist --dump-single-json`.
fn parse_playlist(stdout: &str) -> Result<Option<Resolution>> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(None);
    }

    let playlist: YtDlpPlaylist =
        serde_json::from_str(stdout).context("Error al parsear playlist de yt-dlp")?;

    let entries: Vec<ResolvedSource> = playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(source_from)
        .collect();
    if entries.is_empty() {
        return Ok(None);
    }

    let name = playlist
        .title
        .unwrap_or_else(|| "Playlist sin nombre".to_string());
    debug!("🧾 Playlist '{}' con {} entradas", name, entries.len());
    Ok(Some(Resolution::Playlist { name, entries }))
}

fn source_from(info: YtDlpInfo) -> Option<ResolvedSource> {
    let title = info.title?;
    // Marcadores de yt-dlp para entradas sin acceso.
    if matches!(title.as_str(), "[Private video]" | "[Deleted video]") {
        return None;
    }
    let page = info.webpage_url.or(info.original_url).or(info.url)?;

    let duration = info
        .duration
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64);

    let duration_display = match (info.is_live.unwrap_or(false), duration) {
        (true, _) => "🔴 En vivo".to_string(),
        (false, Some(duration)) => format_duration(duration),
        (false, None) => "Desconocida".to_string(),
    };

    Some(ResolvedSource {
        title,
        duration,
        duration_display,
        locator: StreamLocator::new(page),
        thumbnail: info.thumbnail,
    })
}

/// Traduce el stderr de yt-dlp a una causa legible.
fn describe_failure(stderr: &str) -> String {
    let lower = stderr.to_lowercase();

    if lower.contains("private video") {
        "el video es privado".to_string()
    } else if lower.contains("copyright") {
        "el video fue bloqueado por derechos de autor".to_string()
    } else if lower.contains("confirm your age") || lower.contains("age-restricted") {
        "el video tiene restricción de edad".to_string()
    } else if lower.contains("not available in your country") || lower.contains("geo-restricted") {
        "el video no está disponible en esta región".to_string()
    } else if lower.contains("video unavailable") || lower.contains("unavailable") {
        "el video no está disponible".to_string()
    } else {
        let detail = stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("error desconocido");
        truncate_chars(detail, MAX_ERROR_DETAIL)
    }
}
