// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn global_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("file")
            .short('f')
            .long("file")
            .value_name("PATH")
            .env("HOMEBREW_BREWFILE")
            .help("Input Brewfile (default: ~/.config/brewfile/Brewfile)"),
    )
    .arg(
        Arg::new("backup")
            .short('b')
            .long("backup")
            .value_name("PATH")
            .env("HOMEBREW_BREWFILE_BACKUP")
            .help("Move an existing Brewfile here before init"),
    )
    .arg(
        Arg::new("format")
            .short('F')
            .long("format")
            .value_parser(["file", "bundle", "command"])
            .help("Output format (default: the input's own format)"),
    )
    .arg(
        Arg::new("leaves")
            .long("leaves")
            .action(ArgAction::SetTrue)
            .env("HOMEBREW_BREWFILE_LEAVES")
            .help("Record only packages that nothing else depends on"),
    )
    .arg(
        Arg::new("on_request")
            .long("on-request")
            .action(ArgAction::SetTrue)
            .env("HOMEBREW_BREWFILE_ON_REQUEST")
            .help("Record only packages installed on request"),
    )
    .arg(
        Arg::new("top_packages")
            .long("top-packages")
            .value_name("LIST")
            .env("HOMEBREW_BREWFILE_TOP_PACKAGES")
            .help("Comma-separated packages always recorded"),
    )
    .arg(
        Arg::new("cask_only")
            .long("cask-only")
            .action(ArgAction::SetTrue)
            .help("Manage casks only"),
    )
    .arg(
        Arg::new("appstore")
            .long("appstore")
            .value_name("LEVEL")
            .default_value("1")
            .env("HOMEBREW_BREWFILE_APPSTORE")
            .help("App Store apps: 0 off, 1 manage, 2 detect only"),
    )
    .arg(
        Arg::new("execute")
            .short('C')
            .long("execute")
            .action(ArgAction::SetTrue)
            .help("Really remove packages in clean"),
    )
    .arg(
        Arg::new("yes")
            .short('y')
            .long("yes")
            .action(ArgAction::SetTrue)
            .help("Answer yes to every question"),
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .value_name("LEVEL")
            .default_value("1")
            .env("HOMEBREW_BREWFILE_VERBOSE")
            .help("Verbosity: 0 errors only, 1 normal, 2 info, 3 debug"),
    )
    .arg(
        Arg::new("appdir")
            .long("appdir")
            .value_name("DIR")
            .action(ArgAction::Append)
            .help("Additional application directory"),
    )
    .arg(
        Arg::new("nolink")
            .short('n')
            .long("nolink")
            .action(ArgAction::SetTrue)
            .help("Do not replay `ln -s` suggestions printed by installs"),
    )
    .arg(
        Arg::new("noupgrade")
            .short('U')
            .long("noupgrade")
            .action(ArgAction::SetTrue)
            .help("Skip brew update/upgrade in update"),
    )
}

fn build_cli() -> Command {
    global_args(
        Command::new("brew-file")
            .version(env!("CARGO_PKG_VERSION"))
            .author("Brewfile Contributors")
            .about("Manage Homebrew packages, casks and App Store apps with a Brewfile")
            .subcommand_required(false),
    )
    .subcommand(Command::new("install").about("Install everything declared in the Brewfile"))
    .subcommand(
        Command::new("init")
            .alias("dump")
            .about("Write the installed state into the Brewfile"),
    )
    .subcommand(Command::new("clean").about("Uninstall what is not declared (dry run without -C)"))
    .subcommand(
        Command::new("clean_non_request")
            .about("Uninstall leaves that were installed only as dependencies"),
    )
    .subcommand(Command::new("update").about("Update Homebrew, install, clean and re-initialize"))
    .subcommand(
        Command::new("casklist")
            .about("Check installed applications against casks and write a Caskfile"),
    )
    .subcommand(Command::new("cat").about("Print the Brewfile and its includes"))
    .subcommand(Command::new("get_files").about("Print the paths of the Brewfile and its includes"))
    .subcommand(
        Command::new("completions")
            .about("Generate shell completion scripts")
            .arg(
                Arg::new("shell")
                    .required(true)
                    .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                    .help("Shell to generate completions for"),
            ),
    )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("brew-file.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
