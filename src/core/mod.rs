//! Process supervision and the command channel.

pub mod binary;
pub mod channel;
pub mod clock;
pub mod commands;
pub mod error;
pub mod model;
pub mod retry;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use binary::{ensure_executable, is_executable};
pub use channel::{ChannelTimings, CommandChannel, Completion, Exchange};
pub use clock::{Clock, SystemClock};
pub use commands::{CommandKind, CommandLine, mask_secret};
pub use error::{BridgeError, BridgeResult};
pub use model::{
    AiGeneration, CommandOutcome, DependencyPolicy, Execution, ExecutionKind, GeneratedKind,
    NewTask, OutcomeStatus, SYSTEM_METRICS, Schedule, SystemMetric, Task, TaskId, TaskUpdate,
    UpdateOutcome,
};
pub use retry::RetryPolicy;
pub use supervisor::SessionSupervisor;
pub use transport::{Launcher, PtyLauncher, PtyTransport, ReadEvent, Transport};
