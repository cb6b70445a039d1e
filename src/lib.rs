//! # livehub
//!
//! Tracks which YouTube channels are live right now, fed by PubSubHubbub
//! push notifications and reconciled against the YouTube Data API.
//!
//! ## Architecture
//!
//! ```text
//! Hub ── POST ──▶ Server → Normalizer → Ingest queue ─┐
//!                                                    ├─▶ Store ──▶ /isLive
//! Scheduler → renewal / cleanup ─┐                   │
//! get_streams → channel sync → stream sync ──────────┘
//! ```
//!
//! - [`hub`]: subscribe/unsubscribe requests against the WebSub hub
//! - [`normalizer`]: parses Atom deliveries into feed entries
//! - [`pubsub`]: renewal, ingestion and the two reconciliation passes
//! - [`store`]: SQLite persistence with claim-based work partitioning
//! - [`server`]: axum webhook and read API
//!
//! ## Quick Start
//!
//! ```bash
//! # Track a channel and subscribe it on the hub
//! livehub add UCxxxxxxxxxxxxxxxxxxxxxx
//!
//! # Reconcile and print live streams
//! livehub sync UCxxxxxxxxxxxxxxxxxxxxxx
//!
//! # Run the webhook server and recurring sweeps
//! livehub serve
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store and
/// the [`PubSub`](pubsub::PubSub) service with its YouTube and hub clients.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/livehub/config.toml`.
pub mod config;

/// Long-running service: server, ingestion worker and scheduler.
pub mod daemon;

/// Core domain models.
///
/// - [`Channel`](domain::Channel): a tracked channel and its lease/sync state
/// - [`Feed`](domain::Feed): one video or broadcast with its live classification
/// - [`FeedEntry`](domain::FeedEntry): an entry parsed from a hub delivery
pub mod domain;

/// Bounded-concurrency fan-out over a set of keys.
pub mod fetcher;

/// WebSub hub client and topic URLs.
pub mod hub;

/// Atom delivery parsing.
pub mod normalizer;

/// YouTube Data API client.
pub mod platform;

/// Subscription renewal, delivery ingestion and reconciliation.
pub mod pubsub;

/// HTTP callback and read API.
pub mod server;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
