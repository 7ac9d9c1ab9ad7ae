use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use crate::core::storage::{RecordStore, Row, SelectQuery};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::info;

const LOG_TABLE: &str = "temp_logs";
const DEFAULT_LOG_COUNT: i64 = 5;
const MAX_LOG_COUNT: i64 = 20;

/// Inspects and maintains the cache and durable stores.
pub struct Storage;

fn text_of<'r>(row: &'r Row, keys: &[&str]) -> &'r str {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .unwrap_or("?")
}

fn log_line(row: &Row) -> String {
    let when = row
        .get("created_at")
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|at| at.format("%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "`{when}` **{}** {}",
        text_of(row, &["level"]),
        text_of(row, &["message"])
    )
}

fn kilobytes(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

async fn refuse(ctx: &mut CommandContext<'_>, message: &str) -> Result<(), HandlerError> {
    ctx.reply(Reply::text(format!("❌ {message}")).ephemeral()).await?;
    Ok(())
}

async fn schema<S>(store: &S, table: &str, label: &str) -> Result<Embed, HandlerError>
where
    S: RecordStore + ?Sized,
{
    if !store.table_exists(table).await? {
        return Ok(Embed::new()
            .title("❓ Unknown table")
            .color(EmbedColor::Warning)
            .description(format!("The {label} store has no table `{table}`.")));
    }

    let columns: Vec<String> = store
        .table_info(table)
        .await?
        .iter()
        .map(|column| {
            format!(
                "`{}` {}",
                text_of(column, &["name", "column_name"]),
                text_of(column, &["type", "data_type"])
            )
        })
        .collect();
    let description = if columns.is_empty() {
        "No column details available.".to_string()
    } else {
        columns.join("\n")
    };
    Ok(Embed::new()
        .title(format!("🗂️ {label}.{table}"))
        .color(EmbedColor::Info)
        .description(description))
}

#[async_trait]
impl CommandAction for Storage {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let action = ctx.invocation.string_option("action").unwrap_or("stats");
        let Some(cache) = ctx.data.cache.clone() else {
            return refuse(ctx, "No cache store is attached.").await;
        };

        let embed = match action {
            "stats" => {
                let stats = cache.stats().await?;
                let durable = match &ctx.data.durable {
                    Some(store) if store.is_connected() => "🟢 connected",
                    Some(_) => "🔴 disconnected",
                    None => "⚪ not configured",
                };
                Embed::new()
                    .title("💾 Storage")
                    .color(EmbedColor::Info)
                    .field("Cache entries", stats.cache_entries.to_string(), true)
                    .field("Settings", stats.settings.to_string(), true)
                    .field("Sessions", stats.sessions.to_string(), true)
                    .field("Log lines", stats.log_lines.to_string(), true)
                    .field("Cache file", kilobytes(stats.size_bytes), true)
                    .field("Durable store", durable, true)
            }
            "logs" => {
                let count = ctx
                    .invocation
                    .integer_option("count")
                    .unwrap_or(DEFAULT_LOG_COUNT)
                    .clamp(1, MAX_LOG_COUNT) as u32;
                let query = SelectQuery::new()
                    .columns(["level", "message", "created_at"])
                    .order_by("id", false)
                    .limit(count);
                let rows = cache.select(LOG_TABLE, &query).await?;
                let description = if rows.is_empty() {
                    "The log is empty.".to_string()
                } else {
                    rows.iter().map(log_line).collect::<Vec<_>>().join("\n")
                };
                Embed::new()
                    .title(format!("📜 Latest {} log line(s)", rows.len()))
                    .color(EmbedColor::Info)
                    .description(description)
            }
            "clear-logs" => {
                let Some(level) = ctx.invocation.string_option("level").map(str::trim) else {
                    return refuse(ctx, "Tell me which log level to clear.").await;
                };
                let mut filters = Map::new();
                filters.insert("level".to_string(), Value::from(level));
                let removed = cache.delete(LOG_TABLE, filters).await?;
                info!(level, removed, caller = ctx.invocation.caller.id, "Log lines cleared");
                Embed::new()
                    .title("🧹 Logs cleared")
                    .color(EmbedColor::Success)
                    .description(format!("Removed {removed} `{level}` line(s)."))
            }
            "schema" => {
                let Some(table) = ctx.invocation.string_option("table").map(str::trim) else {
                    return refuse(ctx, "Tell me which table to describe.").await;
                };
                if ctx.invocation.string_option("store") == Some("durable") {
                    match ctx.data.durable.clone() {
                        Some(durable) if durable.is_connected() => {
                            schema(durable.as_ref(), table, "durable").await?
                        }
                        _ => return refuse(ctx, "The durable store is not connected.").await,
                    }
                } else {
                    schema(cache.as_ref(), table, "cache").await?
                }
            }
            "vacuum" => {
                let before = cache.stats().await?.size_bytes;
                cache.vacuum().await?;
                let after = cache.stats().await?.size_bytes;
                info!(before, after, caller = ctx.invocation.caller.id, "Cache vacuumed");
                Embed::new()
                    .title("🧽 Cache vacuumed")
                    .color(EmbedColor::Success)
                    .description(format!("{} → {}", kilobytes(before), kilobytes(after)))
            }
            other => Embed::new()
                .title("❓ Unknown action")
                .color(EmbedColor::Warning)
                .description(format!(
                    "`{other}` is not one of `stats`, `logs`, `clear-logs`, `schema` or `vacuum`."
                )),
        };

        ctx.reply(Reply::embed(embed).ephemeral()).await?;
        Ok(())
    }
}
