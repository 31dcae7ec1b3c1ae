use std::io::Write;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::cmd;
use super::update::is_yes;
use crate::client::{ChatClient, ChatMessage};
use crate::config::Config;
use crate::upgrade::BuildInfo;

/// Arguments of `ask chat`.
#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Question to ask; starts an interactive session when omitted
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,

    /// Model alias from the configuration, or a model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Role (system prompt) from the configuration
    #[arg(short, long)]
    pub role: Option<String>,
}

/// An interactive session: model, role and history.
struct Session {
    model: String,
    history: Vec<ChatMessage>,
}

/// What a line typed in the interactive session asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Empty,
    Model(&'a str),
    Role(&'a str),
    Clear,
    Help,
    Command(&'a str),
    Unknown(&'a str),
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if matches!(line, "exit" | "quit") {
        return Input::Quit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };
    let (name, arg) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    match name {
        "model" => Input::Model(arg.trim()),
        "role" | "prompt" => Input::Role(arg.trim()),
        "clear" => Input::Clear,
        "cmd" => Input::Command(arg.trim()),
        "help" => Input::Help,
        "exit" | "quit" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

impl Session {
    fn new(config: &Config, model: String, role: Option<&str>) -> Self {
        let mut session = Self {
            model,
            history: Vec::new(),
        };
        session.set_role(config, role);
        session
    }

    fn set_role(&mut self, config: &Config, role: Option<&str>) {
        self.history.clear();
        if let Some(prompt) = config.role_prompt(role) {
            self.history.push(ChatMessage::system(prompt));
        }
    }
}

pub async fn execute(args: ChatArgs, build: &BuildInfo, config: &Config) -> Result<()> {
    let client = ChatClient::new(&config.api_url, &config.api_key, &build.user_agent())?;
    let model = config.model_name(args.model.as_deref())?;
    let mut session = Session::new(config, model, args.role.as_deref());

    if !args.prompt.is_empty() {
        session.history.push(ChatMessage::user(args.prompt.join(" ")));
        send(&client, &mut session).await?;
        return Ok(());
    }

    println!(
        "{}",
        format!("Chatting with {}. Type /help for commands, 'exit' to leave.", session.model).cyan()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        match parse_input(&line) {
            Input::Quit => break,
            Input::Empty => {}
            Input::Help => {
                println!("  /model <alias>  switch model");
                println!("  /role <name>    switch role and start over");
                println!("  /clear          forget the conversation");
                println!("  /cmd <task>     suggest a shell command and run it if you agree");
                println!("  exit            leave");
            }
            Input::Clear => {
                let system = session.history.first().filter(|m| m.role == "system").cloned();
                session.history = system.into_iter().collect();
                println!("{}", "Conversation cleared.".dimmed());
            }
            Input::Model(alias) => match config.model_name((!alias.is_empty()).then_some(alias)) {
                Ok(model) => {
                    session.model = model;
                    println!("{}", format!("Using model {}.", session.model).dimmed());
                }
                Err(e) => eprintln!("{}", e.to_string().red()),
            },
            Input::Role(role) => {
                session.set_role(config, (!role.is_empty()).then_some(role));
                println!("{}", "Role changed; conversation restarted.".dimmed());
            }
            Input::Command("") => eprintln!("{}", "Describe the task after /cmd.".red()),
            Input::Command(request) => {
                match cmd::suggest(&client, &session.model, &mut session.history, request).await {
                    Ok(Some(command)) => {
                        print!("Run this command? [y/N] ");
                        std::io::stdout().flush().ok();
                        let answer = lines.next_line().await?.unwrap_or_default();
                        if !is_yes(&answer) {
                            println!("Cancelled.");
                        } else if let Err(e) = cmd::run(&command).await {
                            eprintln!("{}", format!("{e:#}").red());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", format!("{e:#}").red()),
                }
            }
            Input::Unknown(name) => eprintln!("{}", format!("Unknown command /{name}").red()),
            Input::Message(text) => {
                session.history.push(ChatMessage::user(text));
                if let Err(e) = send(&client, &mut session).await {
                    session.history.pop();
                    eprintln!("{}", format!("{e:#}").red());
                }
            }
        }
    }
    Ok(())
}

/// Stream a reply to the last message and record it in the history.
async fn send(client: &ChatClient, session: &mut Session) -> Result<()> {
    let reply = client
        .stream_chat(&session.model, &session.history, |delta| {
            print!("{delta}");
            std::io::stdout().flush().ok();
        })
        .await?;
    println!();
    session.history.push(ChatMessage::assistant(reply));
    Ok(())
}
