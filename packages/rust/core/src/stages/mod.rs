//! Stage implementations plugged into the stage executor.

mod acquire;
mod discover;
mod extract;
mod package;
mod synthesize;

pub use acquire::AcquireHandler;
pub use discover::{DiscoveryReport, SeedContext, classify, run_discovery};
pub use extract::ExtractHandler;
pub use package::PackageHandler;
pub use synthesize::SynthesizeHandler;
