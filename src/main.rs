// src/main.rs

use anyhow::Result;
use brewfile::appmatch::{check_casks, CASKFILE};
use brewfile::config::{
    application_dirs, default_input_path, expand_path, parse_top_packages, Config,
    StoreAppLevel, DEFAULT_CASK_REPO,
};
use brewfile::manifest::{Dialect, ManifestGraph};
use brewfile::probe::{BrewEnvironment, BrewProbe, SystemRunner};
use brewfile::reconcile::{backup_input, Reconciler};
use brewfile::repository::{EmptyIndex, TapDirectory};
use brewfile::Error;
use clap::builder::FalseyValueParser;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "brew-file")]
#[command(author, version, about = "Manage Homebrew packages, casks and App Store apps with a Brewfile", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Input Brewfile (default: ~/.config/brewfile/Brewfile)
    #[arg(short = 'f', long = "file", env = "HOMEBREW_BREWFILE", global = true)]
    file: Option<String>,

    /// Move an existing Brewfile here before init
    #[arg(short, long, env = "HOMEBREW_BREWFILE_BACKUP", global = true)]
    backup: Option<String>,

    /// Output format: file, bundle or command (default: the input's own format)
    #[arg(short = 'F', long = "format", global = true)]
    format: Option<Dialect>,

    /// Record only packages that nothing else depends on
    #[arg(long, env = "HOMEBREW_BREWFILE_LEAVES", value_parser = FalseyValueParser::new(), global = true)]
    leaves: bool,

    /// Record only packages installed on request
    #[arg(long = "on-request", env = "HOMEBREW_BREWFILE_ON_REQUEST", value_parser = FalseyValueParser::new(), global = true)]
    on_request: bool,

    /// Comma-separated packages always recorded with --leaves/--on-request
    #[arg(long = "top-packages", env = "HOMEBREW_BREWFILE_TOP_PACKAGES", default_value = "", global = true)]
    top_packages: String,

    /// Manage casks only
    #[arg(long = "cask-only", global = true)]
    cask_only: bool,

    /// App Store apps: 0 off, 1 manage, 2 detect only
    #[arg(long, env = "HOMEBREW_BREWFILE_APPSTORE", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2), global = true)]
    appstore: u8,

    /// Really remove packages in clean (dry run otherwise)
    #[arg(short = 'C', long = "execute", global = true)]
    execute: bool,

    /// Answer yes to every question
    #[arg(short, long, global = true)]
    yes: bool,

    /// Verbosity: 0 errors only, 1 normal, 2 info, 3 debug
    #[arg(short, long, env = "HOMEBREW_BREWFILE_VERBOSE", default_value_t = 1, global = true)]
    verbose: u8,

    /// Additional application directory (repeatable)
    #[arg(long = "appdir", global = true)]
    appdir: Vec<String>,

    /// Do not replay `ln -s` suggestions printed by installs
    #[arg(short = 'n', long = "nolink", global = true)]
    nolink: bool,

    /// Skip brew update/upgrade in update
    #[arg(short = 'U', long = "noupgrade", global = true)]
    noupgrade: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install everything declared in the Brewfile
    Install,
    /// Write the installed state into the Brewfile
    #[command(alias = "dump")]
    Init,
    /// Uninstall what is not declared (dry run without -C)
    Clean,
    /// Uninstall leaves that were installed only as dependencies
    #[command(name = "clean_non_request", alias = "clean-non-request")]
    CleanNonRequest,
    /// Update Homebrew, install, clean and re-initialize
    Update,
    /// Check installed applications against casks and write a Caskfile
    Casklist,
    /// Print the Brewfile and its includes
    Cat,
    /// Print the paths of the Brewfile and its includes
    #[command(name = "get_files", alias = "get-files")]
    GetFiles,
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn build_config(args: &GlobalArgs) -> Result<Config> {
    let input = args
        .file
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(default_input_path);
    let extra: Vec<PathBuf> = args.appdir.iter().map(|d| expand_path(d)).collect();
    let cask_opts = std::env::var("HOMEBREW_CASK_OPTS").ok();

    Ok(Config {
        input,
        backup: args.backup.as_deref().map(expand_path),
        dialect: args.format,
        leaves: args.leaves,
        on_request: args.on_request,
        top_packages: parse_top_packages(&args.top_packages),
        cask_only: args.cask_only,
        dry_run: !args.execute,
        verbosity: args.verbose,
        yes: args.yes,
        app_dirs: application_dirs(cask_opts.as_deref(), &extra),
        store_apps: StoreAppLevel::from_level(args.appstore)?,
        cask_repo: DEFAULT_CASK_REPO.to_string(),
        link: !args.nolink,
        upgrade: !args.noupgrade,
    })
}

/// Ask on the terminal until the answer is y or n; end of input means no
fn ask_yn(question: &str) -> bool {
    let stdin = io::stdin();
    loop {
        print!("{} [y/n]: ", question);
        let _ = io::stdout().flush();
        let mut answer = String::new();
        match stdin.lock().read_line(&mut answer) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => println!("Answer with y or n."),
        }
    }
}

/// Offer to create a missing input file
fn ensure_input(reconciler: &Reconciler<'_>, index: &TapDirectory) -> Result<()> {
    let config = reconciler.config();
    if config.input.exists() {
        return Ok(());
    }
    println!("{} is not found.", config.input.display());
    if config.yes || ask_yn("Do you want to initialize?") {
        let mut graph = ManifestGraph::resolve(&config.input, index)?;
        reconciler.initialize(&mut graph)?;
        Ok(())
    } else {
        Err(Error::ManifestNotFound(config.input.clone()).into())
    }
}

fn run(command: Commands, config: &Config) -> Result<()> {
    match &command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "brew-file", &mut io::stdout());
            return Ok(());
        }
        Commands::Cat => {
            let graph = ManifestGraph::resolve(&config.input, &EmptyIndex)?;
            for path in graph.paths() {
                match fs::read_to_string(path) {
                    Ok(content) => print!("{}", content),
                    Err(e) => warn!("Cannot read {}: {}", path.display(), e),
                }
            }
            return Ok(());
        }
        Commands::GetFiles => {
            let graph = ManifestGraph::resolve(&config.input, &EmptyIndex)?;
            for path in graph.paths() {
                println!("{}", path.display());
            }
            return Ok(());
        }
        _ => {}
    }

    let runner = SystemRunner::new(config.verbosity);
    let env = BrewEnvironment::detect(&runner)?;
    let runner = runner.with_brew(env.brew.clone());
    let index = TapDirectory::new(env.repository.clone(), env.cache.clone());
    let probe = BrewProbe::new(&runner, &env, config.app_dirs.clone());
    let reconciler = Reconciler::new(config, &probe, &runner, &index).with_environment(&env);

    match command {
        Commands::Install => {
            ensure_input(&reconciler, &index)?;
            let mut graph = ManifestGraph::resolve(&config.input, &index)?;
            let summary = reconciler.install(&mut graph)?;
            if !summary.pending.is_empty() {
                warn!(
                    "Some entries could not be installed: {}",
                    summary.pending.join(", ")
                );
            }
            info!("{} actions planned", summary.plan.len());
        }
        Commands::Init => {
            if !backup_input(config, &mut ask_yn)? {
                println!("Initialization was cancelled.");
                return Ok(());
            }
            let mut graph = ManifestGraph::resolve(&config.input, &index)?;
            reconciler.initialize(&mut graph)?;
        }
        Commands::Clean => {
            ensure_input(&reconciler, &index)?;
            let graph = ManifestGraph::resolve(&config.input, &index)?;
            reconciler.clean(&graph)?;
        }
        Commands::CleanNonRequest => {
            reconciler.clean_non_request()?;
        }
        Commands::Update => {
            ensure_input(&reconciler, &index)?;
            let mut graph = ManifestGraph::resolve(&config.input, &index)?;
            reconciler.update(&mut graph)?;
        }
        Commands::Casklist => {
            let output = config
                .input
                .parent()
                .map(|dir| dir.join(CASKFILE))
                .unwrap_or_else(|| PathBuf::from(CASKFILE));
            check_casks(config, &probe, &runner, &index, &env, &output)?;
        }
        Commands::Completions { .. } | Commands::Cat | Commands::GetFiles => {}
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    brewfile::logging::init(cli.options.verbose);

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return;
    };

    let result = build_config(&cli.options).and_then(|config| run(command, &config));
    if let Err(e) = result {
        eprintln!("[ERROR]: {:#}", e);
        std::process::exit(1);
    }
}
