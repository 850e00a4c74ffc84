use clap::Parser;
use engram::MemoryManager;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct CompactCommand {
    #[clap(
        long,
        short,
        help = "Number of memories to keep. Defaults to the configured maximum."
    )]
    pub target: Option<usize>,
}

impl CompactCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let report = manager.compress_memories(self.target).await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Table => {
                println!("Compaction Results");
                println!("==================\n");
                println!("Before:  {}", report.original_size);
                println!("After:   {}", report.new_size);
                println!(
                    "Removed: {} ({:.1}%)",
                    report.removed,
                    report.ratio * 100.0
                );
            }
        }

        Ok(())
    }
}
