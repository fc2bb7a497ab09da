//! # seed-core
//!
//! A coordinate-addressed content store for an autonomous agent, with
//! semantic-number compaction of its numbered logs and a bounded tool loop
//! that lets a language model read and write the store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seed_core::config::{BackendConfig, SeedSettings};
//! use seed_core::seed::{ChatOptions, ChatTurn, Seed};
//!
//! # async fn demo() -> seed_core::error::SeedResult<()> {
//! let seed = Seed::open(SeedSettings::load("seed.toml".as_ref())?)?;
//! seed.first_boot_setup().await?;
//! seed.save_config(&BackendConfig::claude("sk-ant-...")).await?;
//!
//! seed.run_boot().await?;
//! let reply = seed
//!     .handle_chat(vec![ChatTurn::user("What do you remember?")], ChatOptions::default())
//!     .await?;
//! println!("{} ({})", reply.text, reply.model);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`temporal`] | Timestamp to compact temporal coordinate |
//! | [`store`] | SQLite handle and the `(s, t, i)` coordinate table |
//! | [`memory`] | Memory and changelog logs with rollups at levels 1-4, crystallization |
//! | [`provider`] | Backend trait with hosted and OpenAI-style local adapters |
//! | [`tool`] | Tool trait, registry and the built-in store/log/web/clock tools |
//! | [`executor`] | Name-based dispatch that never fails, status labels |
//! | [`agent`] | Bounded generate/execute loop |
//! | [`shell`] | Extract, validate and wrap the model-authored UI component |
//! | [`boot`] | Boot state machine and boot sequence |
//! | [`config`] | TOML settings and the stored backend record |
//! | [`prompt`] | System prompt and seed files on disk |
//! | [`seed`] | Facade tying it together |
//! | [`error`] | Error types with thiserror |
//!
//! ## Numbered logs
//!
//! Raw entries never land on a multiple of ten. Slot `10` rolls up `1..=9`,
//! slot `100` rolls up `10, 20, ..., 90`, and so on up to level 4, so a log
//! can be read at any zoom level without replaying its full history.

pub mod agent;
pub mod boot;
pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod prompt;
pub mod provider;
pub mod seed;
pub mod shell;
pub mod store;
pub mod temporal;
pub mod tool;
pub mod types;

pub use error::{SeedError, SeedResult};
pub use seed::Seed;
pub use types::*;
