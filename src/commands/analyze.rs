use poise::serenity_prelude as serenity;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::send_chunked_to_channel;
use crate::paper::PaperSource;
use crate::pipeline::PipelineEvent;
use crate::sessions::{SessionRecord, SessionStatus};
use crate::state::Context;

/// Chat line for one pipeline event, if it is worth posting.
fn progress_line(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::AgentComplete { .. } | PipelineEvent::Complete { .. } => None,
        PipelineEvent::Error { message } => Some(format!("❌ Error: {}", message)),
        other => other.message().map(str::to_string),
    }
}

fn completion_reply(record: &SessionRecord, user_mention: &str) -> String {
    match record.status {
        SessionStatus::Completed => {
            let mut reply = format!(
                "{} your report on **{}** is ready.\nSession `{}`: use `/copilot report`, `/copilot export` or `/copilot chat`.",
                user_mention,
                record.title().unwrap_or("the paper"),
                record.id
            );
            if !record.errors.is_empty() {
                reply.push_str(&format!("\n\n{} stage(s) degraded:\n", record.errors.len()));
                for error in &record.errors {
                    reply.push_str(&format!("- {}\n", error));
                }
            }
            reply
        }
        _ => format!(
            "{} the analysis of session `{}` failed: {}",
            user_mention,
            record.id,
            record.errors.join("; ")
        ),
    }
}

/// Analyze a research paper from a URL or an attached PDF
#[poise::command(slash_command, guild_only)]
pub async fn analyze(
    ctx: Context<'_>,
    #[description = "Paper URL (arXiv, publisher page, or direct PDF)"] url: Option<String>,
    #[description = "Paper PDF"] attachment: Option<serenity::Attachment>,
) -> Result<(), anyhow::Error> {
    let source = match (attachment, url.as_deref().map(str::trim)) {
        (Some(file), _) => PaperSource::Url(file.url),
        (None, Some(url)) if !url.is_empty() => PaperSource::Url(url.to_string()),
        _ => {
            ctx.say("Provide a paper `url` or an `attachment`.").await?;
            return Ok(());
        }
    };

    let user_id = ctx.author().id.get();
    let session = ctx.data().store.create(user_id, Some(source.clone())).await?;
    let user_mention = format!("<@{}>", user_id);
    ctx.say(format!(
        "Got it, analyzing <{}>. Session `{}`. I'll post progress in this channel and ping you when the report is ready, {}",
        source, session.id, user_mention
    ))
    .await?;

    info!(
        user = ctx.author().name,
        session_id = %session.id,
        source = %source,
        "analysis started"
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = ctx.data().runner.clone();
    let session_id = session.id.clone();
    let handle = tokio::spawn(async move { runner.run(&session_id, Some(tx)).await });

    // Past the acknowledgement, post to the channel: the interaction token expires after 15 minutes.
    while let Some(event) = rx.recv().await {
        let Some(line) = progress_line(&event) else {
            continue;
        };
        if let Err(e) = send_chunked_to_channel(&ctx, &line).await {
            warn!(session_id = %session.id, "failed to post progress: {}", e);
        }
    }

    let record = handle.await??;
    send_chunked_to_channel(&ctx, &completion_reply(&record, &user_mention)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Agent;

    fn record(status: SessionStatus, errors: Vec<String>) -> SessionRecord {
        SessionRecord {
            id: "abcdef0123456789".into(),
            owner_id: 7,
            paper_source: None,
            status,
            current_agent: None,
            state: None,
            errors,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_progress_line_skips_completion_events() {
        let done = PipelineEvent::AgentComplete {
            agent: Agent::WebResearch,
        };
        assert!(progress_line(&done).is_none());
        let failed = PipelineEvent::Error {
            message: "no paper".into(),
        };
        assert_eq!(progress_line(&failed).unwrap(), "❌ Error: no paper");
        let update = PipelineEvent::AgentUpdate {
            agent: Agent::WebResearch,
            message: "Found 12 sources".into(),
        };
        assert_eq!(progress_line(&update).unwrap(), "Found 12 sources");
    }

    #[test]
    fn test_completion_reply_names_session_and_degraded_stages() {
        let ok = record(
            SessionStatus::Completed,
            vec!["sota_tracker: timeout".into()],
        );
        let reply = completion_reply(&ok, "<@7>");
        assert!(reply.starts_with("<@7> your report on **the paper** is ready."));
        assert!(reply.contains("`abcdef0123456789`"));
        assert!(reply.contains("1 stage(s) degraded:\n- sota_tracker: timeout"));

        let failed = record(SessionStatus::Error, vec!["missing input".into()]);
        assert_eq!(
            completion_reply(&failed, "<@7>"),
            "<@7> the analysis of session `abcdef0123456789` failed: missing input"
        );
    }
}
