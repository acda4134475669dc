pub mod machine;
pub mod state;
pub mod timer;

pub use machine::ConsensusMachine;
pub use state::{ConsensusState, LogEntry, Role};
