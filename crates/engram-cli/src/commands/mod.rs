pub mod compact;
pub mod graph;
pub mod memory;
pub mod stats;

pub use compact::CompactCommand;
pub use graph::GraphCommand;
pub use memory::MemoryCommand;
pub use stats::StatsCommand;
