// Parent `tools` module controls `cli` gating; avoid duplicating crate-level cfg here.
mod commands;
pub mod state;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::compile::CompileCommand;
use commands::init::InitCommand;
use commands::play::PlayCommand;
use commands::render::RenderCommand;
use commands::source::SourceCommand;
use state::CliContext;

#[derive(Parser, Debug)]
#[command(name = "hearc")]
#[command(
    version,
    about = "Hear-C: write C++ audio code, compile it to WebAssembly and hear it live."
)]
pub struct Cli {
    /// Print compiler status and performance reports
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile and play a source file, optionally reloading on save
    Play(PlayCommand),
    /// Compile a source file to a WebAssembly module
    Compile(CompileCommand),
    /// Render a module offline to a WAV file
    Render(RenderCommand),
    /// Initialize a new project
    Init(InitCommand),
    /// Sync the source file with the local compile server
    Source(SourceCommand),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let ctx = CliContext::new(cli.verbose);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Play(command) => commands::play::execute(command, &ctx).await?,
            Commands::Compile(command) => command.execute(&ctx).await?,
            Commands::Render(command) => command.execute(&ctx).await?,
            Commands::Init(command) => command.execute(&ctx).await?,
            Commands::Source(command) => command.execute(&ctx).await?,
        }
        Ok(())
    })
}
