use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    txt2epub::logging::init().context("init logging")?;

    let cli = txt2epub::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        txt2epub::cli::Command::Detect(args) => {
            txt2epub::decode::run(args).context("detect")?;
        }
        txt2epub::cli::Command::Split(args) => {
            txt2epub::split::run(args).context("split")?;
        }
        txt2epub::cli::Command::Build(args) => {
            txt2epub::build::run(args).context("build")?;
        }
        txt2epub::cli::Command::Images(args) => {
            txt2epub::images::run(args).context("images")?;
        }
    }

    Ok(())
}
