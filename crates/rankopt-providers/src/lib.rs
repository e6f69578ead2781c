//! External collaborators of the optimization scheduler.
//!
//! The scheduler never talks to the ranking provider or a text model
//! directly. It holds three narrow handles:
//! - [`RankOracle`]: where does an entity sit in the top-K for a query
//! - [`MetadataGenerator`]: propose better title/tags/description
//! - [`MetadataApplier`]: write metadata back to the provider
//!
//! Real clients live with the process that assembles the scheduler. The
//! [`mock`] module carries deterministic in-process fakes.

pub mod applier;
pub mod error;
pub mod generator;
pub mod mock;
pub mod oracle;

pub use applier::{Ack, MetadataApplier};
pub use error::ProviderError;
pub use generator::{MetadataGenerator, MetadataProposal, RankingContext};
pub use mock::{MockGenerator, RecordingApplier, ScriptedRankOracle};
pub use oracle::{RankLookup, RankOracle, DEFAULT_TOP_K};

pub use secrecy::SecretString;
