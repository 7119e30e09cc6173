use clap::Parser;
use smallcap_trader::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
