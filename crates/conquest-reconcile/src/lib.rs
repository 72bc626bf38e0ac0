//! Conquest Reconcile - client-side snapshot reconciliation engine
//!
//! Turns the server's opaque full-state pushes into an ordered, animated
//! replay of what happened since the last push, then commits the new state.
//! The pipeline is:
//!
//! - [`detector`] infers discrete moves from two snapshots
//! - [`sequencer`] runs timed animation tasks strictly one after another
//! - [`replay`] turns each move into sounds, highlights and animations
//! - [`banner`] tracks whose-turn banners and interaction gating
//! - [`updater`] orchestrates all of the above per received snapshot

pub mod banner;
pub mod config;
pub mod detector;
pub mod effects;
pub mod error;
pub mod events;
pub mod replay;
pub mod sequencer;
pub mod updater;

pub use banner::{BannerCoordinator, BannerState};
pub use config::ReconcileConfig;
pub use detector::{detect, Move};
pub use effects::{HighlightKind, NoopHooks, ReplayEffects, SessionHooks, SoundCue};
pub use error::{ReconcileError, TaskCancelled};
pub use events::ReconcileEvent;
pub use replay::MoveReplayer;
pub use sequencer::{AnimationTask, TaskHandle, TaskSequencer};
pub use updater::{Reconciler, ReconcilerHandle};
