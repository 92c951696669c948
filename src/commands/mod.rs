mod analyze;
mod chat;
mod config;
mod report;
mod sessions;

use crate::sessions::SessionRecord;
use crate::state::Context;

/// Research Copilot - multi-agent research paper analysis
#[poise::command(
    slash_command,
    subcommands(
        "analyze::analyze",
        "sessions::status",
        "report::report",
        "report::export",
        "chat::chat",
        "sessions::sessions",
        "sessions::delete",
        "config::config"
    )
)]
pub async fn copilot(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

const CHUNK_LIMIT: usize = 1990;

/// Split text into Discord-safe chunks, preferring line then word breaks.
fn chunks(text: &str, limit: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut end = remaining.len().min(limit);
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        let split_at = if end < remaining.len() {
            remaining[..end]
                .rfind('\n')
                .or_else(|| remaining[..end].rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        out.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    out
}

/// Send a message in Discord-safe chunks (max 1990 chars).
/// Every chunk goes through ctx.say(), so follow-ups use the interaction webhook.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in chunks(text, CHUNK_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Post to the invoking channel in chunks. Channel messages outlive the
/// interaction token, so long-running commands report through here.
pub(crate) async fn send_chunked_to_channel(
    ctx: &Context<'_>,
    text: &str,
) -> Result<(), anyhow::Error> {
    for chunk in chunks(text, CHUNK_LIMIT) {
        ctx.channel_id().say(ctx.http(), chunk).await?;
    }
    Ok(())
}

/// Load a session the caller may see, replying with the reason when they can't.
pub(crate) async fn accessible_session(
    ctx: &Context<'_>,
    session_id: &str,
) -> Result<Option<SessionRecord>, anyhow::Error> {
    let Some(record) = ctx.data().store.get(session_id.trim()).await? else {
        ctx.say(format!("Session `{}` not found.", session_id)).await?;
        return Ok(None);
    };
    if !ctx.data().can_access(&record, ctx.author().id.get()) {
        ctx.say("You don't have permission to access this session.")
            .await?;
        return Ok(None);
    }
    Ok(Some(record))
}

/// Like [`accessible_session`], but only once the analysis has completed.
pub(crate) async fn completed_session(
    ctx: &Context<'_>,
    session_id: &str,
) -> Result<Option<SessionRecord>, anyhow::Error> {
    let Some(record) = accessible_session(ctx, session_id).await? else {
        return Ok(None);
    };
    if !record.is_completed() || record.state.is_none() {
        ctx.say(format!(
            "Report not ready. Current status: **{}**",
            record.status
        ))
        .await?;
        return Ok(None);
    }
    Ok(Some(record))
}

/// Autocomplete for session IDs owned by the caller.
pub(crate) async fn autocomplete_session(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let sessions = ctx
        .data()
        .store
        .list_by_owner(ctx.author().id.get())
        .await
        .unwrap_or_default();

    sessions
        .into_iter()
        .map(|s| s.id)
        .filter(|id| id.starts_with(partial.trim()))
        .take(25)
        .collect()
}
