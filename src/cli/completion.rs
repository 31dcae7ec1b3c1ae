//! Shell completion scripts.

use std::io::Write;

use clap::{Args, CommandFactory};
use clap_complete::{Shell, generate};

use super::Cli;

/// Arguments of `ask completion`.
///
/// ```bash
/// source <(ask completion bash)
/// ask completion zsh > "${fpath[1]}/_ask"
/// ```
#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate the script for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: &CompletionArgs) {
    write_completions(args.shell, &mut std::io::stdout());
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ask", out);
}
