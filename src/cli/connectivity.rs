use anyhow::Result;
use colored::Colorize;

use crate::client::{ChatClient, ChatMessage};
use crate::config::Config;
use crate::upgrade::BuildInfo;

const PING_SYSTEM: &str = "You are a helpful assistant.";
const PING_MESSAGE: &str = "Hello";

/// `ask test`: send a greeting to the default model and print the reply.
pub async fn execute(build: &BuildInfo, config: &Config) -> Result<()> {
    let client = ChatClient::new(&config.api_url, &config.api_key, &build.user_agent())?;
    let model = config.model_name(None)?;

    println!("Testing connectivity to {} with {}...", config.api_url, model);
    let reply = ping(&client, &model).await?;

    println!("{}", "Connectivity test successful!".green().bold());
    match reply.trim() {
        "" => println!("No response from model."),
        text => {
            println!("Response from model:");
            println!("{text}");
        }
    }
    Ok(())
}

async fn ping(client: &ChatClient, model: &str) -> Result<String> {
    let messages = [ChatMessage::system(PING_SYSTEM), ChatMessage::user(PING_MESSAGE)];
    client.stream_chat(model, &messages, |_| {}).await
}
