//! Curevia Core - answer resolution for the Curevia site assistant
//!
//! Takes one visitor utterance plus session context and produces one reply,
//! trying the cheapest deterministic strategy first:
//!
//! 1. **Safety filter** (`safety`): personal identity numbers and clinical
//!    content are refused before anything else sees them
//! 2. **Tools** (`tools`): net salary calculator and navigation intents
//! 3. **Quick answers** (`quick_answers`): ordered regex table
//! 4. **Knowledge cache** (`knowledge`): cosine similarity over previously
//!    answered questions, with trending promotion
//! 5. **Generative fallback** (`fallback`, `providers`): streamed completion
//!    with a hard timeout, composed (`composer`) and written back to the cache
//!
//! # Quick Start
//!
//! ```no_run
//! use curevia_core::{Pipeline, ResolveRequest, ResolverConfig, SessionId};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let pipeline = Pipeline::from_config(ResolverConfig::load(None)?).await?;
//! let request = ResolveRequest::new("Jag fakturerar 100000 kr exkl moms", SessionId::new());
//! let reply = pipeline.resolve(&request).await?;
//! println!("{} ({})", reply.reply, reply.source);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod composer;
pub mod config;
pub mod error;
pub mod fallback;
pub mod i18n;
pub mod intent;
pub mod knowledge;
pub mod language;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod quick_answers;
pub mod rate_limit;
pub mod reply;
pub mod safety;
pub mod seed;
pub mod session;
pub mod storage;
pub mod tools;

pub use config::{Links, ResolverConfig};
pub use error::{CacheError, ProviderError, ResolveError, Result, SessionStoreError};
pub use intent::{classify_intent, Intent};
pub use knowledge::{KnowledgeCache, KnowledgeEntry};
pub use language::Language;
pub use pipeline::{GenerationPlan, Pipeline, Prepared, ResolveRequest, ResolverMetadata};
pub use rate_limit::RateLimiter;
pub use reply::{Action, Reply, ReplySource, StreamFrame};
pub use session::{SessionId, SessionManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
