//! Reel - Deterministic HTTP record-replay cassettes for tests
//!
//! Reel lets test code replace live network calls with previously captured
//! interactions. An HTTP-client adapter builds a [`http::Request`] before
//! sending, asks the active [`cassette::Cassette`] whether it
//! `can_play_response_for` it, and either replays the stored
//! [`http::Response`] or performs the real call and `append`s the result.
//! The [`config::Recorder`] facade resolves defaults, registers custom
//! matchers, serializers and persisters, and produces configured cassettes.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod config;
pub mod error;
pub mod filters;
pub mod fingerprint;
pub mod http;
pub mod matching;
pub mod migration;
pub mod storage;

pub use error::{ReelError, Result};
