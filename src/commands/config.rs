use std::time::Duration;

use crate::config::AnalysisConfig;
use crate::state::Context;

const PARAMS: &str = "`web_max_iterations`, `web_min_results`, `web_result_cap`, \
`comparative_max_iterations`, `comparative_min_results`, `deep_dive_max_iterations`, \
`section_delay_secs`";

/// Apply one setting. Returns false for an unknown key.
fn apply(config: &mut AnalysisConfig, key: &str, val: u32) -> bool {
    match key {
        "web_max_iterations" => config.web_research.max_iterations = val,
        "web_min_results" => config.web_research.min_results = val as usize,
        "web_result_cap" => config.web_research.result_cap = val as usize,
        "comparative_max_iterations" => config.comparative.max_iterations = val,
        "comparative_min_results" => config.comparative.min_results = val as usize,
        "deep_dive_max_iterations" => config.deep_dive.max_iterations = val,
        "section_delay_secs" => config.sas.section_delay = Duration::from_secs(val as u64),
        _ => return false,
    }
    true
}

fn describe(config: &AnalysisConfig) -> String {
    format!(
        "**Analysis Configuration:**\n\
         `web_max_iterations`: {}\n\
         `web_min_results`: {}\n\
         `web_result_cap`: {}\n\
         `comparative_max_iterations`: {}\n\
         `comparative_min_results`: {}\n\
         `deep_dive_max_iterations`: {}\n\
         `section_delay_secs`: {}",
        config.web_research.max_iterations,
        config.web_research.min_results,
        config.web_research.result_cap,
        config.comparative.max_iterations,
        config.comparative.min_results,
        config.deep_dive.max_iterations,
        config.sas.section_delay.as_secs(),
    )
}

/// Configure analysis parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "web_max_iterations | web_min_results | comparative_max_iterations | ..."]
    param: Option<String>,
    #[description = "New value"] value: Option<u32>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().config.read().await;
            ctx.say(describe(&config)).await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let mut config = ctx.data().config.write().await;
            if apply(&mut config, key, val) {
                ctx.say(format!("`{}` set to {}", key, val)).await?;
            } else {
                ctx.say(format!("Unknown param `{}`. Valid: {}", key, PARAMS))
                    .await?;
            }
        }
        (Some(_), None) => {
            ctx.say(
                "Provide both `param` and `value`. Example: `/copilot config web_max_iterations 10`",
            )
            .await?;
        }
    }

    Ok(())
}
