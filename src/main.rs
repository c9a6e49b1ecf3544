use std::io;
use std::process;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use ecosentinel::commands::assess::{self, HazardArgs, PlantArgs, SpeciesArgs, TranslateArgs};
use ecosentinel::commands::config::{self, ConfigArgs};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("ECO_GIT_SHA"),
    ", built: ",
    env!("ECO_BUILD_TS"),
    ")"
);

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  ecosentinel plant leaf.jpg --info \"indoor, north window\"\n  ecosentinel hazard ridge.jpg --location \"Sierra foothills\" --json\n  echo \"Boil water before drinking\" | ecosentinel translate --language Spanish\n  ecosentinel species heron.jpg --ecosystem wetland --dry-run\n  ecosentinel config check\n  ecosentinel completion bash > ~/.local/share/bash-completion/completions/ecosentinel";

#[derive(Debug, Parser)]
#[command(
    name = "ecosentinel",
    about = "Environmental assessments from a local multimodal model",
    version = VERSION,
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Assess plant health from a photo")]
    Plant(PlantArgs),
    #[command(about = "Assess environmental hazards from a landscape photo")]
    Hazard(HazardArgs),
    #[command(about = "Translate an emergency message")]
    Translate(TranslateArgs),
    #[command(about = "Identify a species from a photo")]
    Species(SpeciesArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "ecosentinel", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "ecosentinel", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "ecosentinel", &mut io::stdout()),
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Plant(args) => assess::run_plant(args),
        Commands::Hazard(args) => assess::run_hazard(args),
        Commands::Translate(args) => assess::run_translate(args),
        Commands::Species(args) => assess::run_species(args),
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
