//! Game economy core: characters and their inventories, timed actions,
//! trades, group projects and donations over a Sled-backed store.
//!
//! Every mutation runs read, validate, mutate, persist under per-record
//! locks. Chat integration happens through the traits in [`port`].

pub mod catalog;
pub mod characters;
pub mod commands;
pub mod engine;
pub mod errors;
pub mod inventory;
pub mod ledger;
pub mod locks;
pub mod port;
pub mod projects;
pub mod scheduler;
pub mod storage;
pub mod tasks;
pub mod trading;
pub mod types;

pub use catalog::{Catalog, ProjectTemplate, Recipe};
pub use characters::CharacterSummary;
pub use commands::{execute, execute_lines, parse_command, EconomyCommand, Invoker};
pub use engine::{Economy, Rules};
pub use errors::EconomyError;
pub use inventory::DonationReceipt;
pub use ledger::{adjust, holds, resolve_wildcard, transfer, Bucket};
pub use locks::RecordLocks;
pub use port::{GameEvent, IdentityPort, LogNotifier, Notifier, StaticIdentity};
pub use projects::{check_phase_completion, ProjectView, ResourceProgress};
pub use scheduler::{start_sweeps, SweepConfig, SweepHandle, SweepKind, SweepStats};
pub use storage::{EconomyStore, EconomyStoreBuilder, StoreBatch};
pub use tasks::{roll_scavenge, ScavengePlan, SweepReport};
pub use trading::{parse_trade_args, TradeTerms};
pub use types::*;
