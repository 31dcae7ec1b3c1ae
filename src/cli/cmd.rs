//! `ask cmd`: describe a task, get a shell command back, run it after confirmation.
//!
//! The same flow backs `/cmd` in the interactive chat, where the request and
//! the suggested command join the conversation history.

use std::io::Write;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::debug;

use super::update::confirm;
use crate::client::{ChatClient, ChatMessage};
use crate::config::Config;
use crate::upgrade::{BuildInfo, PlatformKey};

/// Arguments of `ask cmd`.
#[derive(Args, Debug, Default)]
pub struct CmdArgs {
    /// What the command should do
    #[arg(value_name = "REQUEST", required = true)]
    pub request: Vec<String>,

    /// Model alias from the configuration, or a model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print the command without running it
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: CmdArgs, build: &BuildInfo, config: &Config) -> Result<()> {
    let client = ChatClient::new(&config.api_url, &config.api_key, &build.user_agent())?;
    let model = config.model_name(args.model.as_deref())?;
    let mut history = Vec::new();

    let Some(command) = suggest(&client, &model, &mut history, &args.request.join(" ")).await? else {
        return Ok(());
    };
    if args.dry_run {
        return Ok(());
    }
    if !confirm("Run this command?")? {
        println!("Cancelled.");
        return Ok(());
    }
    run(&command).await
}

/// Ask the model for a command, print it and record the exchange in `history`.
///
/// Returns `None` when the reply holds no command.
pub(super) async fn suggest(
    client: &ChatClient,
    model: &str,
    history: &mut Vec<ChatMessage>,
    request: &str,
) -> Result<Option<String>> {
    let mut messages = vec![ChatMessage::system(command_prompt(&PlatformKey::current()))];
    messages.extend(history.iter().filter(|m| m.role != "system").cloned());
    messages.push(ChatMessage::user(request));

    println!("{}", "Thinking...".dimmed());
    let reply = client
        .stream_chat(model, &messages, |delta| {
            print!("{}", delta.dimmed());
            std::io::stdout().flush().ok();
        })
        .await?;
    println!();

    history.push(ChatMessage::user(request));
    history.push(ChatMessage::assistant(reply.as_str()));

    match extract_command(&reply) {
        Some(command) => {
            println!("\n  {}\n", command.cyan().bold());
            Ok(Some(command))
        }
        None => {
            println!("{}", "That is not a command. Try describing the task differently.".yellow());
            Ok(None)
        }
    }
}

/// Run `command` through the platform shell and report how it ended.
pub(super) async fn run(command: &str) -> Result<()> {
    let status = run_shell(command).await?;
    if status.success() {
        println!("{}", "Command finished.".green());
    } else {
        eprintln!("{}", format!("Command failed ({status}).").red());
    }
    Ok(())
}

fn shell() -> (&'static str, &'static str) {
    if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") }
}

async fn run_shell(command: &str) -> Result<ExitStatus> {
    let (program, flag) = shell();
    debug!("Running {} {} {:?}", program, flag, command);
    tokio::process::Command::new(program)
        .arg(flag)
        .arg(command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to start {program}"))
}

fn command_prompt(platform: &PlatformKey) -> String {
    let (program, _) = shell();
    format!(
        "You turn requests into a single shell command.\n\
         Reply with the command only: no explanation and no markdown.\n\
         Join several steps with && and avoid destructive operations.\n\
         If the request is unclear, ask for the missing detail instead.\n\
         Environment: os {}, arch {}, shell {}.",
        platform.os, platform.arch, program
    )
}

/// The command in a model reply, taken from the first code fence when there is one.
fn extract_command(reply: &str) -> Option<String> {
    let reply = reply.trim();
    let body = match reply.split_once("```") {
        Some((_, fenced)) => {
            let inside = fenced.split_once("```").map_or(fenced, |(inside, _)| inside);
            // The opening fence line may carry a language tag.
            inside.split_once('\n').map_or(inside, |(_, code)| code)
        }
        None => reply,
    };
    let command = body.trim();
    (!command.is_empty()).then(|| command.to_string())
}
