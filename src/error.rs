use thiserror::Error;

/// Errores del motor de reproducción.
///
/// El texto de cada variante es el mensaje que se muestra al usuario, así que
/// los handlers pueden responder con `err.to_string()` directamente.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("❌ No hay música reproduciéndose.")]
    NothingPlaying,

    #[error("⏸️ La música ya está pausada.")]
    AlreadyPaused,

    #[error("▶️ La música no está pausada.")]
    NotPaused,

    #[error("❌ No hay canciones en cola para limpiar.")]
    NothingToClear,

    #[error("❌ La cola está llena (máximo {0} canciones).")]
    QueueFull(usize),

    #[error("❌ Debes estar en un canal de voz.")]
    NotInVoice,

    #[error("❌ No tengo permisos para conectar o hablar en este canal de voz.")]
    MissingVoicePermissions,

    #[error("❌ No se encontró nada para: **{0}**")]
    NotFound(String),

    #[error("⚠️ No se pudo obtener la canción: {0}")]
    Resolve(String),

    #[error("❌ No pude conectarme al canal de voz.")]
    Connect,
}

impl PlayerError {
    /// Peticiones de control inválidas: se informan al usuario pero no son bugs.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PlayerError::NothingPlaying
                | PlayerError::AlreadyPaused
                | PlayerError::NotPaused
                | PlayerError::NothingToClear
                | PlayerError::QueueFull(_)
                | PlayerError::NotInVoice
                | PlayerError::MissingVoicePermissions
                | PlayerError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_rejections_are_not_failures() {
        assert!(PlayerError::NothingPlaying.is_rejection());
        assert!(PlayerError::NothingToClear.is_rejection());
        assert!(!PlayerError::Connect.is_rejection());
        assert!(!PlayerError::Resolve("privado".into()).is_rejection());
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            PlayerError::NotFound("lofi".into()).to_string(),
            "❌ No se encontró nada para: **lofi**"
        );
    }
}
