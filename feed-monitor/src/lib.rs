pub mod types;
pub mod traits;
pub mod query;
pub mod registry;
pub mod tip;
pub mod repair;
pub mod parser;
pub mod operator;
pub mod monitor;

pub use types::*;
pub use traits::FetchOperator;
pub use query::build_query;
pub use registry::TargetRegistry;
pub use tip::TipWindow;
pub use repair::{TipRepairer, TipStatus};
pub use parser::ListingParser;
pub use operator::{HttpOperator, MockOperator, ScrapeCall};
pub use monitor::{CycleReport, Monitor, MonitorHandle, MonitorStreams, PollState};
