//! Compilation pipelines between circuit representations.
//!
//! Translators declare edges between circuit kinds; the [`world::WorldMap`]
//! collects those edges into a multigraph, and [`sample`] turns its paths
//! into concrete [`conversion::Conversion`]s with sampled flag combinations.

pub mod conversion;
pub mod error;
pub mod options;
pub mod sample;
pub mod translator;
pub mod translators;
pub mod world;

pub use conversion::{Conversion, StrategyFile, StrategyStep};
pub use error::PipelineError;
pub use options::CmdlineOption;
pub use sample::{ValidationGroup, sample_compilation_space};
pub use translator::{Policy, Translator, TranslatorInstance, registry};
pub use world::WorldMap;
