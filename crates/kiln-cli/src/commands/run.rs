//! Interactive console session.
//!
//! Each stdin line is a chat message, optionally prefixed with the speaker
//! (`Bob: come here`). `!restart` rebuilds the agent; ctrl-c or end of input
//! shuts it down.

use std::sync::Arc;

use kiln_agent::Agent;
use kiln_core::{error::format_error_with_suggestion, Config};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use crate::console::{ConsoleBody, ConsoleSkills, ConsoleWorld};

/// Speaker used for lines without a `name:` prefix.
const DEFAULT_SPEAKER: &str = "player";

pub async fn run(config: Config) -> anyhow::Result<()> {
    let config = config
        .into_validated()
        .map_err(|e| anyhow::anyhow!(format_error_with_suggestion(&e)))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let agent = Arc::new(build_agent(config.clone())?);
        let restart = session(agent, &mut lines).await?;
        if !restart {
            break;
        }
        info!("Restarting agent");
    }
    Ok(())
}

fn build_agent(config: Config) -> anyhow::Result<Agent> {
    let body = Arc::new(ConsoleBody::new(config.general.name.clone()));
    let agent = Agent::builder(config)
        .world(Arc::new(ConsoleWorld))
        .body(body)
        .skills(Arc::new(ConsoleSkills))
        .build()?;
    Ok(agent)
}

/// Run one agent until it shuts down. Returns whether a restart was requested.
async fn session(agent: Arc<Agent>, lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<bool> {
    agent.start().await?;
    info!(
        server = %agent.context().config.server.address(),
        game_version = %agent.context().config.server.game_version,
        "Console session stands in for the game server"
    );
    println!("{} is listening. Type `name: message`, ctrl-c to quit.", agent.name());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let reason = loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let Some((source, message)) = parse_line(&line) else { continue };
                    let agent = agent.clone();
                    tokio::spawn(async move {
                        agent.handle_chat(&source, &message).await;
                    });
                }
                None => break "Input closed.",
            },
            _ = &mut ctrl_c => break "Killing agent process...",
            _ = agent.wait_for_shutdown() => break "Restarting agent process...",
        }
    };

    let restart = agent.restart_requested();
    if let Err(e) = agent.shutdown(reason).await {
        warn!(error = %e, "Shutdown did not complete cleanly");
    }
    Ok(restart)
}

/// Split `Bob: hello` into speaker and message.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(": ") {
        Some((source, message)) if !source.is_empty() && !source.contains(' ') => {
            Some((source.to_string(), message.trim().to_string()))
        }
        _ => Some((DEFAULT_SPEAKER.to_string(), line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("Bob: come here"),
            Some(("Bob".to_string(), "come here".to_string()))
        );
        assert_eq!(
            parse_line("!goToPlayer Bob 3"),
            Some((DEFAULT_SPEAKER.to_string(), "!goToPlayer Bob 3".to_string()))
        );
        assert_eq!(
            parse_line("note to self: hi"),
            Some((DEFAULT_SPEAKER.to_string(), "note to self: hi".to_string()))
        );
        assert_eq!(parse_line("   "), None);
    }
}
