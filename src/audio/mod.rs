//! # Audio Module
//!
//! Per-guild playback queue and the runtime that drives it.
//!
//! ## Architecture
//!
//! ### [`engine`] - Queue state machine
//! - Pure `step(session, event, ctx) -> Transition`
//! - Emits [`engine::Effect`]s instead of doing I/O
//! - Stale signals and timers are recognised by their [`queue::PlayToken`]
//!
//! ### [`player`] - Runtime shell
//! - Serializes events per guild and executes the effects of each transition
//! - Routes transport signals and delayed advances back into the engine
//!
//! ### [`registry`] - Process-wide state
//! - Sessions, live panel messages and refresh loops, keyed by guild
//!
//! ### [`transport`] - Voice output
//! - [`transport::AudioTransport`] trait with a songbird implementation
//!
//! ## Lifecycle
//!
//! A guild is idle until its first enqueue creates a session. The session
//! lives while there is a current song; stopping, exhausting the queue,
//! repeated failures, an empty voice channel or a disconnect all remove it
//! together with its panel, refresh loop and voice connection.

pub mod engine;
pub mod player;
pub mod queue;
pub mod registry;
pub mod transport;
