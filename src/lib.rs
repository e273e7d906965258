// Loft Ledger - Core Library
// Record keeping for pigeon breeders: pedigrees, pairings, race circuits, sales

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod import;
pub mod pedigree;
pub mod ring_match;
pub mod validation;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{load_config, Config, ConfigError};
pub use db::{open_database, setup_database};
pub use entities::{
    Bloodline, Circuit, Clutch, ColorTag, Gender, Organization, Page, Pairing, Pigeon,
    PigeonInput, PigeonStatus, PigeonSummary, PigeonView, RaceResult, Sale, Season, SeasonRace,
    User,
};
pub use error::{LoftError, Result, ValidationErrors};
pub use import::{import_csv, ImportReport};
pub use pedigree::{build_tree, AncestorSource, PedigreeNode, MAX_GENERATIONS};
pub use ring_match::{normalize, RingCheck, RingMatcher, RingRecord, SimilarMatch};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
