use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::memory::{MemoryEntry, MemoryManager, MemoryType, Metadata, NewMemory, SearchQuery};
use engram::TimeRange;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, parse_uuid, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "Store a new memory")]
    Add(AddArgs),

    #[clap(about = "Find memories similar to a query")]
    Search(SearchArgs),

    #[clap(about = "List memories, newest first")]
    List(ListArgs),

    #[clap(about = "Show memory details")]
    Show(ShowArgs),
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Memory content text")]
    pub text: String,

    #[clap(
        long,
        short,
        default_value = "fact",
        help = "Memory type (fact, conversation, task, knowledge, experience, or any tag)"
    )]
    pub r#type: String,

    #[clap(long, help = "Explicit importance in [0, 1]; scored automatically if omitted")]
    pub importance: Option<f64>,

    #[clap(long = "tag", help = "Tag to attach (repeatable)")]
    pub tags: Vec<String>,

    #[clap(long, help = "Metadata as a JSON object, e.g. '{\"priority\":\"high\"}'")]
    pub metadata: Option<String>,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Query text")]
    pub query: String,

    #[clap(long, short, help = "Maximum number of results")]
    pub limit: Option<usize>,

    #[clap(long, help = "Minimum cosine similarity")]
    pub min_similarity: Option<f32>,

    #[clap(long = "type", short, help = "Restrict to this memory type (repeatable)")]
    pub types: Vec<String>,

    #[clap(long, help = "Only memories created at or after this RFC 3339 time")]
    pub since: Option<DateTime<Utc>>,

    #[clap(long, help = "Only memories created at or before this RFC 3339 time")]
    pub until: Option<DateTime<Utc>>,
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of memories to display"
    )]
    pub limit: usize,

    #[clap(long, short, help = "Filter by memory type")]
    pub r#type: Option<String>,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,
}

impl MemoryCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::Add(args) => Self::add(manager, args, format).await,
            MemorySubcommand::Search(args) => Self::search(manager, args, format).await,
            MemorySubcommand::List(args) => Self::list(manager, args, format).await,
            MemorySubcommand::Show(args) => Self::show(manager, args, format).await,
        }
    }

    async fn add(manager: &MemoryManager, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        let mut memory = NewMemory::new(args.text.as_str(), args.r#type.as_str())
            .with_tags(args.tags.clone());
        if let Some(raw) = &args.metadata {
            memory = memory.with_metadata(parse_metadata(raw)?);
        }
        if let Some(importance) = args.importance {
            memory = memory.with_importance(importance);
        }

        let id = manager.store_memory(memory).await?;
        let importance = manager
            .get_memory(id)
            .await
            .map(|entry| entry.importance)
            .unwrap_or_default();

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": id.to_string(),
                    "importance": importance,
                    "created": true,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Memory created successfully.");
                println!("ID: {id}");
                println!("Importance: {importance:.2}");
            }
        }

        Ok(())
    }

    async fn search(
        manager: &MemoryManager,
        args: &SearchArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let mut query = SearchQuery::new(args.query.as_str());
        if let Some(limit) = args.limit {
            query = query.with_limit(limit);
        }
        if let Some(min_similarity) = args.min_similarity {
            query = query.with_min_similarity(min_similarity);
        }
        if !args.types.is_empty() {
            query = query.with_memory_types(
                args.types
                    .iter()
                    .map(|t| MemoryType::from(t.as_str()))
                    .collect(),
            );
        }
        if args.since.is_some() || args.until.is_some() {
            let start = args.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
            let end = args.until.unwrap_or_else(Utc::now);
            query = query.with_time_range(TimeRange::new(start, end)?);
        }

        let results = manager.search_memories(query).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "rank": r.rank,
                            "similarity_score": r.similarity_score,
                            "entry": without_embedding(&r.entry),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if results.is_empty() {
                    println!("No matching memories.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Rank", "Score", "ID", "Content", "Type", "Importance"]);

                for result in &results {
                    table.add_row([
                        result.rank.to_string(),
                        format!("{:.3}", result.similarity_score),
                        truncate_string(&result.entry.id.to_string(), 8),
                        truncate_string(&result.entry.content, 50),
                        result.entry.memory_type.to_string(),
                        format!("{:.2}", result.entry.importance),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn list(manager: &MemoryManager, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let mut memories = manager.list_memories().await;

        if let Some(tag) = args.r#type.as_deref() {
            let wanted = MemoryType::from(tag);
            memories.retain(|m| m.memory_type == wanted);
        }
        memories.truncate(args.limit);

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = memories
                    .iter()
                    .map(|m| {
                        serde_json::json!({
                            "id": m.id.to_string(),
                            "content": &m.content,
                            "type": m.memory_type.as_str(),
                            "importance": m.importance,
                            "access_count": m.access_count(),
                            "timestamp": m.timestamp.to_rfc3339(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if memories.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Content", "Type", "Importance", "Accessed", "Created"]);

                for memory in &memories {
                    table.add_row([
                        truncate_string(&memory.id.to_string(), 8),
                        truncate_string(&memory.content, 50),
                        memory.memory_type.to_string(),
                        format!("{:.2}", memory.importance),
                        memory.access_count().to_string(),
                        format_timestamp(&memory.timestamp),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} memories", memories.len());
            }
        }

        Ok(())
    }

    async fn show(manager: &MemoryManager, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let id = parse_uuid(&args.id)?;

        let memory = manager
            .get_memory(id)
            .await
            .ok_or_else(|| format!("Memory not found: {}", args.id))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&without_embedding(&memory))?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID", &memory.id.to_string()]);
                table.add_row(["Content", &memory.content]);
                table.add_row(["Type", memory.memory_type.as_str()]);
                table.add_row(["Importance", &format!("{:.4}", memory.importance)]);
                table.add_row(["Created", &memory.timestamp.to_rfc3339()]);
                table.add_row(["Access Count", &memory.access_count().to_string()]);
                table.add_row(["Tags", &memory.tags.join(", ")]);
                table.add_row([
                    "Metadata",
                    &serde_json::to_string(&memory.metadata)?,
                ]);
                table.add_row([
                    "Embedding Size",
                    &memory
                        .embedding
                        .as_ref()
                        .map_or_else(|| "-".to_string(), |v| v.len().to_string()),
                ]);

                println!("{table}");
            }
        }

        Ok(())
    }
}

fn parse_metadata(raw: &str) -> CliResult<Metadata> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(format!("Metadata must be a JSON object, got {other}").into()),
    }
}

/// Entry as JSON with the raw vector replaced by its length
fn without_embedding(memory: &MemoryEntry) -> serde_json::Value {
    let mut shown = memory.clone();
    let embedding_size = shown.embedding.take().map(|v| v.len());
    let mut value = serde_json::to_value(&shown).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.insert("embedding_size".to_string(), serde_json::json!(embedding_size));
    }
    value
}
