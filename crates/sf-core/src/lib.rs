//! Domain model and storage abstraction for the skinforge generator.
//!
//! This crate defines the two persistent aggregates the generator works
//! with, credentialed worker [`Account`]s and generated [`Skin`] records,
//! together with the repository traits the rest of the workspace consumes,
//! in-memory repository implementations for tests and embedding, and the
//! id obfuscation cipher that turns internal sequence values into
//! non-guessable public identifiers.
//!
//! Storage technology is deliberately out of scope: the selection and
//! scoring logic elsewhere in the workspace only ever talks to the
//! [`AccountRepository`] / [`SkinRepository`] traits.

pub mod id;
pub mod memory;
pub mod models;
pub mod notify;
pub mod repo;

pub use id::{IdAllocator, IdError, ObfuscatedIdCipher};
pub use memory::{MemoryAccountRepository, MemorySkinRepository, MemoryStatsRepository};
pub use models::account::{Account, AccountKind, SecurityAnswer, TokenSource};
pub use models::options::{ClientInfo, GenerateOptions, ModelChoice, SkinVisibility};
pub use models::skin::{GenerateKind, Skin, SkinInfo, SkinModel, TextureInfo};
pub use notify::{LogNotifier, Notifier};
pub use repo::{AccountRepository, RepoError, SkinRepository, StatsRepository};
