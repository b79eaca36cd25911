pub mod log;
pub mod process;
pub mod stats;

pub use log::{LogEntry, LogType, StreamEvent};
pub use process::{
    OsType, ProcessInfo, ProcessPhase, StartOutcome, StatusReport, SupervisorState,
};
pub use stats::ProcessStats;
