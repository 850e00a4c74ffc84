use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::MemoryManager;
use uuid::Uuid;

use crate::error::CliResult;
use crate::output::{OutputFormat, parse_uuid, truncate_string};

#[derive(Parser)]
pub struct GraphCommand {
    #[clap(subcommand)]
    pub command: GraphSubcommand,
}

#[derive(Subcommand)]
pub enum GraphSubcommand {
    #[clap(about = "Link memories that share concepts")]
    Build(BuildArgs),

    #[clap(about = "Delete every stored graph node")]
    Drop,
}

#[derive(Parser)]
pub struct BuildArgs {
    #[clap(help = "Topic; also the search query when no ids are given")]
    pub topic: String,

    #[clap(long = "id", help = "Memory ID to include (repeatable)")]
    pub ids: Vec<String>,

    #[clap(long, short, help = "Maximum number of nodes")]
    pub max_nodes: Option<usize>,
}

impl GraphCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            GraphSubcommand::Build(args) => Self::build(manager, args, format).await,
            GraphSubcommand::Drop => Self::drop_all(manager, format).await,
        }
    }

    async fn build(manager: &MemoryManager, args: &BuildArgs, format: OutputFormat) -> CliResult<()> {
        let ids = args
            .ids
            .iter()
            .map(|raw| parse_uuid(raw))
            .collect::<CliResult<Vec<Uuid>>>()?;

        let graph = manager
            .create_knowledge_graph(&args.topic, Some(ids.as_slice()), args.max_nodes)
            .await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&graph)?);
            }
            OutputFormat::Table => {
                println!("Knowledge Graph: {}", graph.topic);
                println!("ID: {}\n", graph.graph_id);

                if graph.node_map.is_empty() {
                    println!("No memories matched.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Memory ID", "Content", "Concepts", "Links"]);

                for node in graph.node_map.values() {
                    table.add_row([
                        memory_id(&node.id).to_string(),
                        truncate_string(&node.content, 40),
                        node.properties.concepts.join(", "),
                        node.connections.len().to_string(),
                    ]);
                }

                println!("{table}\n");
                println!(
                    "Total: {} nodes, {} connections",
                    graph.nodes, graph.connections
                );
            }
        }

        Ok(())
    }

    async fn drop_all(manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let removed = manager.drop_knowledge_graph().await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "removed": removed });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Removed {removed} graph nodes.");
            }
        }

        Ok(())
    }
}

/// The entry id behind a `memory_<uuid>` node id
fn memory_id(node_id: &str) -> &str {
    node_id.strip_prefix("memory_").unwrap_or(node_id)
}
