use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE_RESUME: &str = "music_pause_resume";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const QUEUE: &str = "music_queue";
    pub const CLEAR_QUEUE: &str = "music_clear_queue";
}

/// Acciones de los botones del panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    PauseResume,
    Skip,
    Stop,
    ViewQueue,
    ClearQueue,
}

impl ControlAction {
    pub fn custom_id(self) -> &'static str {
        match self {
            ControlAction::PauseResume => button_ids::PAUSE_RESUME,
            ControlAction::Skip => button_ids::SKIP,
            ControlAction::Stop => button_ids::STOP,
            ControlAction::ViewQueue => button_ids::QUEUE,
            ControlAction::ClearQueue => button_ids::CLEAR_QUEUE,
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        match id {
            button_ids::PAUSE_RESUME => Some(ControlAction::PauseResume),
            button_ids::SKIP => Some(ControlAction::Skip),
            button_ids::STOP => Some(ControlAction::Stop),
            button_ids::QUEUE => Some(ControlAction::ViewQueue),
            button_ids::CLEAR_QUEUE => Some(ControlAction::ClearQueue),
            _ => None,
        }
    }
}

/// Estilo visual de un botón, independiente de serenity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

impl From<ControlStyle> for ButtonStyle {
    fn from(style: ControlStyle) -> Self {
        match style {
            ControlStyle::Primary => ButtonStyle::Primary,
            ControlStyle::Secondary => ButtonStyle::Secondary,
            ControlStyle::Success => ButtonStyle::Success,
            ControlStyle::Danger => ButtonStyle::Danger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlButton {
    pub action: ControlAction,
    pub label: &'static str,
    pub style: ControlStyle,
}

impl ControlButton {
    fn new(action: ControlAction, label: &'static str, style: ControlStyle) -> Self {
        Self {
            action,
            label,
            style,
        }
    }
}

/// Botones del panel de control.
///
/// El botón de pausa cambia de texto y de estilo según el estado: en pausa
/// ofrece "Reanudar" en verde, sonando ofrece "Pausar" en gris.
pub fn panel_controls(paused: bool) -> Vec<Vec<ControlButton>> {
    let pause_resume = if paused {
        ControlButton::new(
            ControlAction::PauseResume,
            "▶️ Reanudar",
            ControlStyle::Success,
        )
    } else {
        ControlButton::new(
            ControlAction::PauseResume,
            "⏸️ Pausar",
            ControlStyle::Secondary,
        )
    };

    let row1 = vec![
        pause_resume,
        ControlButton::new(ControlAction::Skip, "⏭️ Saltar", ControlStyle::Primary),
        ControlButton::new(ControlAction::Stop, "🛑 Detener", ControlStyle::Danger),
    ];

    let row2 = vec![
        ControlButton::new(
            ControlAction::ViewQueue,
            "📜 Ver Cola",
            ControlStyle::Secondary,
        ),
        ControlButton::new(
            ControlAction::ClearQueue,
            "🗑️ Limpiar Cola",
            ControlStyle::Danger,
        ),
    ];

    vec![row1, row2]
}

/// Convierte las filas de botones a componentes de Discord.
pub fn to_action_rows(rows: &[Vec<ControlButton>]) -> Vec<CreateActionRow> {
    rows.iter()
        .map(|row| {
            CreateActionRow::Buttons(
                row.iter()
                    .map(|button| {
                        CreateButton::new(button.action.custom_id())
                            .label(button.label)
                            .style(button.style.into())
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pause_button_reflects_state() {
        let playing = &panel_controls(false)[0][0];
        assert_eq!(playing.label, "⏸️ Pausar");
        assert_eq!(playing.style, ControlStyle::Secondary);

        let paused = &panel_controls(true)[0][0];
        assert_eq!(paused.label, "▶️ Reanudar");
        assert_eq!(paused.style, ControlStyle::Success);
    }

    #[test]
    fn exposes_all_five_controls() {
        let actions: Vec<ControlAction> = panel_controls(false)
            .into_iter()
            .flatten()
            .map(|button| button.action)
            .collect();

        assert_eq!(
            actions,
            vec![
                ControlAction::PauseResume,
                ControlAction::Skip,
                ControlAction::Stop,
                ControlAction::ViewQueue,
                ControlAction::ClearQueue,
            ]
        );
    }

    #[test]
    fn custom_ids_round_trip() {
        for action in panel_controls(true).into_iter().flatten().map(|b| b.action) {
            assert_eq!(ControlAction::from_custom_id(action.custom_id()), Some(action));
        }
        assert_eq!(ControlAction::from_custom_id("music_volume_up"), None);
    }
}
