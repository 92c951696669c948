use poise::serenity_prelude as serenity;
use tracing::info;

use super::{autocomplete_session, completed_session, send_chunked};
use crate::export::{ExportFormat, ReportExport};
use crate::state::Context;

/// Show the research report of a completed session
#[poise::command(slash_command, guild_only)]
pub async fn report(
    ctx: Context<'_>,
    #[description = "Session ID"]
    #[autocomplete = "autocomplete_session"]
    session: String,
) -> Result<(), anyhow::Error> {
    let Some(record) = completed_session(&ctx, &session).await? else {
        return Ok(());
    };
    let Some(state) = record.state.as_ref() else {
        return Ok(());
    };
    let export = ReportExport::from_state(state);

    let mut output = format!("# {}\n", export.paper_title);
    if !export.authors.is_empty() {
        output.push_str(&format!("**Authors:** {}\n", export.authors.join(", ")));
    }
    let sections = [
        ("Executive Summary", &export.executive_summary),
        ("Research Findings", &export.research_findings),
        ("Technical Landscape", &export.technical_landscape),
    ];
    for (heading, body) in sections {
        if !body.trim().is_empty() {
            output.push_str(&format!("\n**{}**\n{}\n", heading, body));
        }
    }
    if !export.future_directions.is_empty() {
        output.push_str("\n**Future Directions**\n");
        for direction in &export.future_directions {
            output.push_str(&format!("- {}\n", direction));
        }
    }
    output.push_str(&format!(
        "\nUse `/copilot export session:{}` for the full report or `/copilot chat` to dig into a field.",
        record.id
    ));

    send_chunked(&ctx, &output).await
}

/// Export the report as a file (markdown, json, text)
#[poise::command(slash_command, guild_only)]
pub async fn export(
    ctx: Context<'_>,
    #[description = "Session ID"]
    #[autocomplete = "autocomplete_session"]
    session: String,
    #[description = "markdown | json | text"] format: Option<String>,
) -> Result<(), anyhow::Error> {
    let format = match format.as_deref().unwrap_or("markdown").parse::<ExportFormat>() {
        Ok(format) => format,
        Err(e) => {
            ctx.say(e.to_string()).await?;
            return Ok(());
        }
    };
    let Some(record) = completed_session(&ctx, &session).await? else {
        return Ok(());
    };
    let Some(state) = record.state.as_ref() else {
        return Ok(());
    };

    let export = ReportExport::from_state(state);
    let content = export.render(format)?;
    let filename = export.filename(format);
    info!(session_id = %record.id, filename = %filename, bytes = content.len(), "report exported");

    ctx.send(
        poise::CreateReply::default()
            .content(format!("Report for **{}**", export.paper_title))
            .attachment(serenity::CreateAttachment::bytes(content.into_bytes(), filename)),
    )
    .await?;
    Ok(())
}
