pub mod commands;
pub mod error;
pub mod output;

pub use commands::{CompactCommand, GraphCommand, MemoryCommand, StatsCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, parse_uuid, truncate_string};
