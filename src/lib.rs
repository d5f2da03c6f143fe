//! Holdtype: Push-to-talk speech-to-text for Wayland
//!
//! The library provides the building blocks of the daemon:
//! - Hotkey detection via evdev (kernel-level, works on all compositors)
//! - Audio capture via cpal as sequence-numbered sample blocks
//! - Transcription using whisper.cpp (fast, local, offline)
//! - A pipeline coordinator enforcing the session lifecycle
//! - Text delivery via wtype with a clipboard fallback
//!
//! # Architecture
//!
//! ```text
//!   hotkey watcher (evdev)          signals (SIGUSR1/SIGUSR2)
//!          │ press/release                  │
//!          └──────────────┬─────────────────┘
//!                         ▼ triggers
//!               ┌───────────────────┐
//!               │    coordinator    │  owns all pipeline state
//!               └───────────────────┘
//!        open/close │           │ dispatch
//!                   ▼           ▼
//!          ┌──────────────┐  ┌──────────────┐
//!          │ audio source │  │ speech engine│
//!          │    (cpal)    │  │ (whisper-rs) │
//!          └──────────────┘  └──────────────┘
//!                   │ blocks        │ results
//!                   └──────┬────────┘
//!                          ▼ ordered events (broadcast)
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!     ┌──────────────┐           ┌──────────────┐
//!     │  text sinks  │           │  state file  │
//!     │ wtype/wlcopy │           │   (Waybar)   │
//!     └──────────────┘           └──────────────┘
//! ```
//!
//! One session records at a time; every started session ends in exactly
//! one published outcome, and outcomes reach subscribers in session
//! order even when transcription finishes out of order.

pub mod audio;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod hotkey;
pub mod output;
pub mod pipeline;
pub mod session;

pub use cli::{Cli, Commands, RecordAction};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{HoldtypeError, Result};
