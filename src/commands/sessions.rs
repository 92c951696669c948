use chrono::{TimeZone, Utc};

use super::{accessible_session, autocomplete_session, send_chunked};
use crate::state::Context;

fn format_time(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Show the progress of an analysis session
#[poise::command(slash_command, guild_only)]
pub async fn status(
    ctx: Context<'_>,
    #[description = "Session ID"]
    #[autocomplete = "autocomplete_session"]
    session: String,
) -> Result<(), anyhow::Error> {
    let Some(record) = accessible_session(&ctx, &session).await? else {
        return Ok(());
    };
    let messages = ctx.data().store.messages(&record.id).await?;

    let mut output = format!(
        "**Session** `{}`\n**Paper:** {}\n**Status:** {}\n**Current agent:** {}\n**Messages:** {}\n**Updated:** {}",
        record.id,
        record
            .title()
            .map(str::to_string)
            .or_else(|| record.paper_source.as_ref().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown".to_string()),
        record.status,
        record.current_agent.map(|a| a.label()).unwrap_or("none"),
        messages.len(),
        format_time(record.updated_at),
    );
    if let Some(last) = messages.last() {
        output.push_str(&format!("\n\n**Latest:** {}", last.content));
    }
    if !record.errors.is_empty() {
        output.push_str("\n\n**Errors:**\n");
        for error in &record.errors {
            output.push_str(&format!("- {}\n", error));
        }
    }
    send_chunked(&ctx, &output).await
}

/// List your analysis sessions
#[poise::command(slash_command, guild_only)]
pub async fn sessions(
    ctx: Context<'_>,
    #[description = "Max sessions to show"] limit: Option<u32>,
) -> Result<(), anyhow::Error> {
    let limit = limit.unwrap_or(10) as usize;
    let records = ctx
        .data()
        .store
        .list_by_owner(ctx.author().id.get())
        .await?;

    if records.is_empty() {
        ctx.say("No sessions yet. Use `/copilot analyze` to start one.")
            .await?;
        return Ok(());
    }

    let mut output = String::from("**Your Sessions**\n\n");
    for record in records.iter().take(limit) {
        let label = record
            .title()
            .map(str::to_string)
            .or_else(|| record.paper_source.as_ref().map(|s| s.to_string()))
            .unwrap_or_else(|| "untitled".to_string());
        output.push_str(&format!(
            "- `{}` **{}** ({}, {})\n",
            record.id,
            label,
            record.status,
            format_time(record.created_at)
        ));
    }
    if records.len() > limit {
        output.push_str(&format!("\n... and {} more", records.len() - limit));
    }
    send_chunked(&ctx, &output).await
}

/// Delete an analysis session and its chat history
#[poise::command(slash_command, guild_only)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Session ID"]
    #[autocomplete = "autocomplete_session"]
    session: String,
) -> Result<(), anyhow::Error> {
    let Some(record) = accessible_session(&ctx, &session).await? else {
        return Ok(());
    };
    if ctx.data().store.delete(&record.id).await? {
        ctx.say(format!("Session `{}` deleted.", record.id)).await?;
    } else {
        ctx.say(format!("Session `{}` was already gone.", record.id))
            .await?;
    }
    Ok(())
}
