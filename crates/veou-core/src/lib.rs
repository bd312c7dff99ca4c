pub mod aggregator;
pub mod annotations;
pub mod catalog;
pub mod config;
pub mod fingerprint;
pub mod orchestrator;
pub mod places;
pub mod prompt;
pub mod query;
pub mod session;
pub mod summarizer;
pub mod summary;

pub use aggregator::*;
pub use annotations::*;
pub use catalog::*;
pub use config::*;
pub use fingerprint::*;
pub use orchestrator::*;
pub use places::*;
pub use prompt::*;
pub use query::*;
pub use session::*;
pub use summarizer::*;
pub use summary::*;
