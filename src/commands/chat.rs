use tracing::info;

use super::{autocomplete_session, completed_session, send_chunked};
use crate::state::Context;
use crate::text::truncate_chars;

/// Report fields offered for deep-dive chat.
const FIELDS: &[&str] = &[
    "executive_summary",
    "research_findings",
    "technical_landscape",
    "sota_analysis",
    "comparative_analysis",
    "trend_analysis",
    "ecosystem_map",
    "recommendations",
    "future_directions",
    "direction_advisor",
    "contributions",
    "methodology",
    "results",
    "limitations",
];

/// Ask a follow-up question about one field of a report
#[poise::command(slash_command, guild_only)]
pub async fn chat(
    ctx: Context<'_>,
    #[description = "Session ID"]
    #[autocomplete = "autocomplete_session"]
    session: String,
    #[description = "Report field to dig into"]
    #[autocomplete = "autocomplete_field"]
    field: String,
    #[description = "Your question"] message: String,
) -> Result<(), anyhow::Error> {
    let Some(record) = completed_session(&ctx, &session).await? else {
        return Ok(());
    };
    ctx.defer().await?;

    info!(
        user = ctx.author().name,
        session_id = %record.id,
        field,
        "deep dive started"
    );
    let answer = ctx.data().runner.chat(&record.id, field.trim(), &message).await?;

    let mut full = format!(
        "<@{}> **{}**\n**Q:** {}\n\n**A:** {}",
        ctx.author().id,
        field,
        message,
        answer.answer
    );
    if !answer.sources.is_empty() {
        full.push_str("\n\n**Sources:**\n");
        for source in answer.sources.iter().take(8) {
            let label = if source.title.trim().is_empty() {
                source.url.as_str()
            } else {
                truncate_chars(&source.title, 80)
            };
            full.push_str(&format!("- [{}]({})\n", label, source.url));
        }
    }
    send_chunked(&ctx, &full).await
}

async fn autocomplete_field(_ctx: Context<'_>, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    FIELDS
        .iter()
        .filter(|f| f.contains(partial.as_str()))
        .map(|f| f.to_string())
        .collect()
}
