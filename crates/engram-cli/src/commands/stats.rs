use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::MemoryManager;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let stats = manager.get_memory_stats().await;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            OutputFormat::Table => {
                println!("Engram Statistics");
                println!("=================\n");

                let mut by_type = Table::new();
                by_type
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Type", "Count"]);
                for (memory_type, count) in &stats.by_type {
                    by_type.add_row([memory_type.as_str(), &count.to_string()]);
                }
                println!("{by_type}\n");

                let bands = stats.importance_bands;
                let mut importance = Table::new();
                importance
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Importance", "Count"]);
                importance.add_row(["High (> 0.7)", &bands.high.to_string()]);
                importance.add_row(["Medium (0.4 - 0.7]", &bands.medium.to_string()]);
                importance.add_row(["Low (<= 0.4)", &bands.low.to_string()]);
                println!("{importance}\n");

                println!("Total: {} memories", stats.total);
                println!("Indexed: {}", stats.index_size);
                println!("Average importance: {:.3}", stats.avg_importance);
                println!("Graph nodes: {}", stats.knowledge_graph_nodes);
                println!("Last compaction: {}", format_timestamp(&stats.last_compaction));
            }
        }

        Ok(())
    }
}
