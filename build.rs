//! Build script for tokpass
//!
//! Generates man pages from CLI definitions using clap_mangen.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::{self, File};
use std::io::Error;
use std::path::PathBuf;

// `Cli` and `Commands`, shared with src/main.rs
include!("src/cli.rs");

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=TOKPASS_GEN_MANPAGES");

    // Man pages are release artifacts; debug builds skip them unless asked
    let profile = env::var("PROFILE").unwrap_or_default();
    let generate = env::var("TOKPASS_GEN_MANPAGES").is_ok() || profile == "release";

    if !generate {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| "target".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = Cli::command();
    render(&cmd, &man_dir.join("tokpass.1"))?;
    // One page per subcommand: tokpass-decode.1, tokpass-check.1, ...
    for subcommand in cmd.get_subcommands().filter(|c| c.get_name() != "help") {
        let page = format!("tokpass-{}.1", subcommand.get_name());
        render(subcommand, &man_dir.join(page))?;
    }

    println!("cargo:warning=tokpass man pages written to {}", man_dir.display());
    Ok(())
}

fn render(cmd: &clap::Command, path: &std::path::Path) -> Result<(), Error> {
    let mut file = File::create(path)?;
    Man::new(cmd.clone()).render(&mut file)
}
