//! Interactive chat against the console chat client.

use std::sync::Arc;

use anyhow::Context;
use chatbridge_agent::{AgentBuilder, AgentConfig};
use chatbridge_providers::OpenAIProvider;
use chatbridge_tools::{ToolRegistry, WebSearchTool};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::console::ConsoleChat;
use crate::repl::{self, CommandResult};
use crate::AppContext;

pub async fn run(ctx: &AppContext, channel: &str, writing_task: Option<String>) -> anyhow::Result<()> {
    let config = &ctx.config;

    let mut provider = OpenAIProvider::new(config.model.resolve_api_key().unwrap_or_default())
        .with_default_model(config.model.model.clone());
    if let Some(ref base_url) = config.model.base_url {
        provider = provider.with_base_url(base_url.clone());
    }

    let search = WebSearchTool::from_config(&config.search);
    if !search.is_available() {
        warn!("No search API key configured; web searches will report that search is unavailable");
    }
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(search));

    let chat = Arc::new(ConsoleChat::new(channel));
    let agent = AgentBuilder::new()
        .chat(chat.clone())
        .provider(Arc::new(provider))
        .tools(tools)
        .config(AgentConfig::from(config))
        .build()?;

    let key_hint = config
        .model
        .api_key_env
        .as_deref()
        .unwrap_or("OPENAI_API_KEY");
    agent
        .init()
        .with_context(|| format!("Set {} or model.api_key in the config file", key_hint))?;

    let runner = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    println!("chatbridge {} | model: {}", env!("CARGO_PKG_VERSION"), config.model.model);
    println!("Type a message and press Enter. /help lists commands.");
    println!();

    let mut writing_task = writing_task;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if line.starts_with('/') {
                    match repl::handle_command(line, &chat, &mut writing_task) {
                        CommandResult::Continue => {}
                        CommandResult::Exit => break,
                        CommandResult::Error(msg) => eprintln!("{}", msg),
                    }
                    continue;
                }

                chat.send_user_message(line, writing_task.clone());
            }
            _ = tokio::signal::ctrl_c() => {
                if agent.active_generations() > 0 {
                    chat.stop_generating();
                } else {
                    break;
                }
            }
        }
    }

    info!("Shutting down");
    agent.dispose().await?;
    runner.await??;
    println!("Goodbye!");
    Ok(())
}
