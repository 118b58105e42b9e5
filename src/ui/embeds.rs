use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;
use tokio::time::Instant;

use super::buttons::{self, ControlButton};
use crate::audio::{
    engine::Notice,
    queue::{QueueListing, Session, Song},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Celdas de la barra de progreso.
pub const PROGRESS_CELLS: usize = 20;
/// Longitud máxima del título de la siguiente canción.
const NEXT_TITLE_MAX: usize = 40;

/// Datos de entrada del panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub current: Song,
    pub next: Option<Song>,
    /// Canciones restantes, incluida la actual.
    pub remaining: usize,
    pub paused: bool,
    pub elapsed: Duration,
}

impl PanelView {
    pub fn from_session(session: &Session, now: Instant) -> Self {
        Self {
            current: session.current().clone(),
            next: session.upcoming().first().cloned(),
            remaining: session.remaining(),
            paused: session.is_paused(),
            elapsed: session.elapsed(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Contenido renderizable (embed + botones) sin depender de serenity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelContent {
    pub title: String,
    pub description: String,
    pub colour: u32,
    pub fields: Vec<PanelField>,
    pub thumbnail: Option<String>,
    pub footer: Option<String>,
    pub controls: Vec<Vec<ControlButton>>,
}

impl PanelContent {
    fn new(title: impl Into<String>, description: impl Into<String>, colour: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            colour,
            fields: Vec::new(),
            thumbnail: None,
            footer: None,
            controls: Vec::new(),
        }
    }

    fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(PanelField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    pub fn to_embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::default()
            .title(&self.title)
            .description(&self.description)
            .colour(self.colour)
            .timestamp(Timestamp::now());

        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }

        if let Some(thumbnail) = &self.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }

        if let Some(footer) = &self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }

        embed
    }

    pub fn to_components(&self) -> Vec<serenity::builder::CreateActionRow> {
        buttons::to_action_rows(&self.controls)
    }
}

/// Renderiza el panel de control. Función pura.
pub fn render_panel(view: &PanelView) -> PanelContent {
    let song = &view.current;
    let (status, colour) = if view.paused {
        ("⏸️ Pausado", colors::NEUTRAL_GRAY)
    } else {
        ("▶️ Reproduciendo", colors::SUCCESS_GREEN)
    };

    let progress = format!(
        "{} {} {}",
        format_time(view.elapsed),
        progress_bar(view.elapsed, song.duration, PROGRESS_CELLS),
        song.duration_display
    );

    let mut panel = PanelContent::new(
        "🎶 Panel de Control",
        format!("**Sonando:** {}", song.title),
        colour.0,
    )
    .field("⏱️ Duración:", &song.duration_display, true)
    .field("👤 Solicitado por:", &song.requested_by, true)
    .field("📊 Estado:", status, true)
    .field("🎵 Progreso", progress, false)
    .field(
        "📝 Canciones en cola",
        view.remaining.saturating_sub(1).to_string(),
        true,
    );

    if let (Some(next), true) = (&view.next, view.remaining > 1) {
        panel = panel.field(
            "⏭️ Sigue:",
            format!(
                "**{}**\n👤 pedida por: {}",
                truncate_title(&next.title, NEXT_TITLE_MAX),
                next.requested_by
            ),
            true,
        );
    }

    panel.thumbnail = song.thumbnail.clone();
    panel.controls = buttons::panel_controls(view.paused);
    panel
}

/// Barra de progreso de ancho fijo.
///
/// Sin duración conocida (o cero) devuelve la barra vacía.
pub fn progress_bar(elapsed: Duration, total: Option<Duration>, cells: usize) -> String {
    let total = match total {
        Some(total) if !total.is_zero() => total,
        _ => return "▬".repeat(cells),
    };

    let ratio = (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
    let filled = ((ratio * cells as f64).round() as usize).min(cells);

    format!("{}{}", "🟩".repeat(filled), "⬜".repeat(cells - filled))
}

/// `m:ss`, como el contador de la barra de progreso.
pub fn format_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Primeros `max` caracteres (no bytes) de `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() > max {
        format!("{}...", truncate_chars(title, max))
    } else {
        title.to_string()
    }
}

/// Embed privado del botón "Ver Cola".
pub fn render_queue(listing: &QueueListing) -> PanelContent {
    let description = listing
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let marker = if i == 0 {
                "▶️".to_string()
            } else {
                format!("{}.", i)
            };
            format!("{} **{}** `{}`", marker, entry.title, entry.duration_display)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let footer = if listing.total > listing.entries.len() {
        format!(
            "Mostrando {} de {} canciones",
            listing.entries.len(),
            listing.total
        )
    } else {
        format!("Total: {} canción(es)", listing.total)
    };

    let mut content = PanelContent::new(
        "📜 Cola de Reproducción",
        description,
        colors::INFO_BLUE.0,
    );
    content.footer = Some(footer);
    content
}

/// Texto de los avisos del canal.
pub fn render_notice(notice: &Notice) -> String {
    match notice {
        Notice::NowPlaying { title, duration } => {
            format!("🎶 Reproduciendo: **{}** `{}`", title, duration)
        }
        Notice::Added { title, position } => {
            format!("➕ Añadida a la cola: **{}** (posición {})", title, position)
        }
        Notice::PlaylistAdded { name, count } => {
            format!("🧾 Playlist añadida: **{}** ({} canciones)", name, count)
        }
        Notice::QueueFinished => "✅ Cola terminada".to_string(),
        Notice::ChannelEmpty => "📭 Canal de voz vacío, parando música...".to_string(),
        Notice::Disconnected => "🔌 Desconectado del canal de voz".to_string(),
        Notice::PlaybackError { title, detail } => format!(
            "⚠️ Error con **{}**: `{}`",
            title,
            truncate_chars(detail, 150)
        ),
        Notice::Halted { failures } => format!(
            "🛑 Cola detenida: {} canciones fallaron seguidas.",
            failures
        ),
    }
}

/// Datos del comando `/status`.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub user_voice_channel: Option<String>,
    pub queue_active: bool,
    pub playing: bool,
    pub paused: bool,
    pub songs: usize,
    pub current_title: Option<String>,
}

pub fn render_status(report: &StatusReport) -> String {
    let check = |value: bool| if value { "✅" } else { "❌" };

    let mut status = String::from("📊 **Estado del Bot**\n");
    status.push_str("🤖 Bot conectado: ✅\n");
    status.push_str(&format!(
        "👤 Usuario en canal de voz: {}\n",
        report
            .user_voice_channel
            .as_ref()
            .map_or_else(|| "❌".to_string(), |name| format!("✅ {}", name))
    ));
    status.push_str(&format!("🎵 Cola activa: {}\n", check(report.queue_active)));

    if report.queue_active {
        status.push_str(&format!("🎶 Reproduciendo: {}\n", check(report.playing)));
        status.push_str(&format!("⏸️ Pausado: {}\n", check(report.paused)));
        status.push_str(&format!("📝 Canciones en cola: {}\n", report.songs));
        if let Some(title) = &report.current_title {
            status.push_str(&format!("🎵 Canción actual: {}\n", title));
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::queue::QueueEntry, testing::song};
    use pretty_assertions::assert_eq;

    fn view(paused: bool, next: Option<Song>, remaining: usize) -> PanelView {
        let mut current = song("Current");
        current.duration = Some(Duration::from_secs(200));
        current.duration_display = "3:20".into();
        PanelView {
            current,
            next,
            remaining,
            paused,
            elapsed: Duration::from_secs(50),
        }
    }

    #[test]
    fn progress_bar_rounds_to_nearest_cell() {
        let total = Some(Duration::from_secs(100));
        assert_eq!(
            progress_bar(Duration::from_secs(0), total, 4),
            "⬜⬜⬜⬜"
        );
        assert_eq!(
            progress_bar(Duration::from_secs(37), total, 4),
            "🟩⬜⬜⬜"
        );
        assert_eq!(
            progress_bar(Duration::from_secs(38), total, 4),
            "🟩🟩⬜⬜"
        );
    }

    #[test]
    fn progress_bar_clamps_overrun() {
        assert_eq!(
            progress_bar(Duration::from_secs(500), Some(Duration::from_secs(100)), 3),
            "🟩🟩🟩"
        );
    }

    #[test]
    fn unknown_or_zero_duration_renders_empty_bar() {
        assert_eq!(progress_bar(Duration::from_secs(10), None, 5), "▬▬▬▬▬");
        assert_eq!(
            progress_bar(Duration::from_secs(10), Some(Duration::ZERO), 5),
            "▬▬▬▬▬"
        );
    }

    #[test]
    fn long_next_title_is_truncated() {
        let title = "a".repeat(45);
        assert_eq!(truncate_title(&title, 40), format!("{}...", "a".repeat(40)));
        assert_eq!(truncate_title("short", 40), "short");
        // Cuenta caracteres, no bytes.
        assert_eq!(truncate_title(&"ñ".repeat(40), 40), "ñ".repeat(40));
    }

    #[test]
    fn truncate_chars_respects_multibyte_text() {
        assert_eq!(truncate_chars("canción", 6), "canció");
        assert_eq!(truncate_chars("🎵🎶", 1), "🎵");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }

    #[test]
    fn playlist_notice_counts_songs() {
        let notice = Notice::PlaylistAdded {
            name: "Lofi".into(),
            count: 12,
        };
        assert_eq!(
            render_notice(&notice),
            "🧾 Playlist añadida: **Lofi** (12 canciones)"
        );
    }

    #[test]
    fn panel_shows_state_and_progress() {
        let panel = render_panel(&view(false, None, 1));

        assert_eq!(panel.description, "**Sonando:** Current");
        assert_eq!(panel.field_value("📊 Estado:"), Some("▶️ Reproduciendo"));
        assert_eq!(panel.field_value("👤 Solicitado por:"), Some("tester"));
        assert_eq!(panel.field_value("📝 Canciones en cola"), Some("0"));
        assert_eq!(panel.field_value("⏭️ Sigue:"), None);
        assert_eq!(
            panel.field_value("🎵 Progreso"),
            Some(format!("0:50 {}{} 3:20", "🟩".repeat(5), "⬜".repeat(15)).as_str())
        );
    }

    #[test]
    fn paused_panel_changes_status_and_button() {
        let panel = render_panel(&view(true, None, 1));

        assert_eq!(panel.field_value("📊 Estado:"), Some("⏸️ Pausado"));
        assert_eq!(panel.controls[0][0].label, "▶️ Reanudar");
        assert_eq!(panel.colour, colors::NEUTRAL_GRAY.0);
    }

    #[test]
    fn panel_shows_next_song() {
        let mut next = song(&"b".repeat(50));
        next.requested_by = "ana".into();
        let panel = render_panel(&view(false, Some(next), 3));

        assert_eq!(panel.field_value("📝 Canciones en cola"), Some("2"));
        assert_eq!(
            panel.field_value("⏭️ Sigue:"),
            Some(format!("**{}...**\n👤 pedida por: ana", "b".repeat(40)).as_str())
        );
    }

    #[test]
    fn render_is_deterministic() {
        let input = view(false, Some(song("B")), 2);
        assert_eq!(render_panel(&input), render_panel(&input));
    }

    #[test]
    fn queue_listing_marks_current_and_caps_footer() {
        let listing = QueueListing {
            entries: vec![
                QueueEntry {
                    title: "A".into(),
                    duration_display: "1:00".into(),
                },
                QueueEntry {
                    title: "B".into(),
                    duration_display: "2:00".into(),
                },
            ],
            total: 12,
        };
        let content = render_queue(&listing);

        assert_eq!(content.description, "▶️ **A** `1:00`\n1. **B** `2:00`");
        assert_eq!(content.footer.as_deref(), Some("Mostrando 2 de 12 canciones"));
        assert!(content.controls.is_empty());
    }

    #[test]
    fn status_lists_queue_details_only_when_active() {
        let idle = render_status(&StatusReport::default());
        assert!(idle.contains("🎵 Cola activa: ❌"));
        assert!(!idle.contains("Pausado"));

        let active = render_status(&StatusReport {
            user_voice_channel: Some("General".into()),
            queue_active: true,
            playing: true,
            paused: false,
            songs: 3,
            current_title: Some("A".into()),
        });
        assert!(active.contains("👤 Usuario en canal de voz: ✅ General"));
        assert!(active.contains("📝 Canciones en cola: 3"));
        assert!(active.contains("🎵 Canción actual: A"));
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
    }
}
