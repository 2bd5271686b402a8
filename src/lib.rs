//! # Guildledger - persistent game economy for chat-driven campaigns
//!
//! Guildledger keeps the shared-world economy of a tabletop campaign that is
//! played over chat. Players own characters that gather items, currency and
//! experience through timed activities, trade with each other and pool
//! resources into multi-phase group projects.
//!
//! ## Features
//!
//! - **Characters**: owner-locked characters with an ordered item ledger, currency, experience and honor.
//! - **Timed actions**: scavenging, crafting, disassembly and project labor, finished by restart-safe sweeps.
//! - **Trading**: free-text proposals settled atomically across both characters.
//! - **Group projects**: phase-by-phase resource and labor goals with a completion reward.
//! - **Persistence**: Sled-backed records with schema versions and atomic multi-record batches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use guildledger::economy::{Catalog, Economy, EconomyStore, Invoker, LogNotifier, StaticIdentity};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(EconomyStore::open("data/economy")?);
//!     let catalog = Arc::new(Catalog::load_dir("data")?);
//!     let identity = Arc::new(StaticIdentity::new(Vec::new(), Vec::new(), false));
//!     let economy = Economy::new(store, catalog, Arc::new(LogNotifier), identity);
//!
//!     let me = Invoker::new("42", "alice");
//!     println!("{}", guildledger::economy::execute(&economy, &me, "!life Taco").await);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`economy`] - records, ledger, timed actions, trades, projects, sweeps and the command surface
//! - [`config`] - configuration loading and defaults
//! - [`logutil`] - log sanitizing helpers

pub mod config;
pub mod economy;
pub mod logutil;
