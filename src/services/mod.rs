pub mod log_buffer;
pub mod log_hub;
pub mod registry;
pub mod script_resolver;
pub mod stats_collector;
pub mod supervisor;

pub use log_hub::{LogHub, Subscription};
pub use registry::ProcessRegistry;
pub use script_resolver::ScriptResolver;
pub use stats_collector::StatsCollector;
pub use supervisor::Supervisor;
