//! # Sources Module
//!
//! Resolución de peticiones de usuario (texto libre o enlace) a algo que el
//! transporte de audio sabe reproducir.
//!
//! El motor de cola solo conoce el trait [`SourceResolver`]; la implementación
//! de producción es [`youtube::YtDlpResolver`], que delega en `yt-dlp`.

pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use std::{fmt, time::Duration};

pub use youtube::YtDlpResolver;

/// Resuelve una búsqueda o URL a una canción o a una lista de canciones.
///
/// `Ok(None)` significa "no encontrado" y no es un error: el router lo
/// informa al usuario sin tocar la cola.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Option<Resolution>>;
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Single(ResolvedSource),
    /// Entradas en el orden de la lista; nunca vacía.
    Playlist {
        name: String,
        entries: Vec<ResolvedSource>,
    },
}

/// Localizador opaco que el transporte convierte en un stream de audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamLocator(String);

impl StreamLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Enlaces directos a ficheros de audio; el resto pasa por yt-dlp.
    pub fn is_direct_audio(&self) -> bool {
        let lower = self.0.to_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or(&lower);
        [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"]
            .iter()
            .any(|ext| path.ends_with(ext))
    }
}

impl fmt::Display for StreamLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resultado de una resolución exitosa.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub title: String,
    pub duration: Option<Duration>,
    pub duration_display: String,
    pub locator: StreamLocator,
    pub thumbnail: Option<String>,
}

/// Enlaces a una lista completa (`/playlist?list=` o `list=` sin `v=`).
pub fn is_playlist_url(query: &str) -> bool {
    let Ok(parsed) = url::Url::parse(query.trim()) else {
        return false;
    };
    let mut has_list = false;
    let mut has_video = false;
    for (key, _) in parsed.query_pairs() {
        match key.as_ref() {
            "list" => has_list = true,
            "v" => has_video = true,
            _ => {}
        }
    }
    has_list && (parsed.path().ends_with("/playlist") || !has_video)
}

/// Distingue enlaces de términos de búsqueda.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query.trim())
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_links_and_search_terms() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("  http://example.com/song.mp3 "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/song.mp3"));
    }

    #[test]
    fn detects_playlist_links() {
        assert!(is_playlist_url(
            "https://www.youtube.com/playlist?list=PL1234"
        ));
        assert!(is_playlist_url("https://music.youtube.com/browse?list=OLAK5"));
        assert!(!is_playlist_url(
            "https://www.youtube.com/watch?v=abc&list=PL1234"
        ));
        assert!(!is_playlist_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(!is_playlist_url("lofi playlist"));
    }

    #[test]
    fn direct_audio_ignores_query_string() {
        assert!(StreamLocator::new("https://cdn.example.com/a.MP3?sig=1").is_direct_audio());
        assert!(!StreamLocator::new("https://youtu.be/dQw4w9WgXcQ").is_direct_audio());
    }
}
