// Entrypoint for the poster.
// - Keeps `main` small: load `.env`, read the configuration, run once.
// - Configuration errors are reported before any network call is made.

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use xkcd_vk_poster::{run, Config, PosterError, RunOptions, RunOutcome};

/// Post a random xkcd comic to a VK group wall.
#[derive(Parser, Debug)]
#[command(name = "xkcd-vk-poster", version, about)]
struct Cli {
    /// Publish this comic instead of a random one.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    comic_id: Option<u32>,

    /// Do not show the progress spinner.
    #[arg(long)]
    no_progress: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match try_main(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<PosterError>()
                .map_or(1, PosterError::exit_code);
            eprintln!("error: {err:#}");
            ExitCode::from(code as u8)
        }
    }
}

fn try_main(cli: &Cli) -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenv::dotenv();
    let config = Config::from_env()?;

    let options = RunOptions {
        comic_id: cli.comic_id,
        show_progress: !cli.no_progress && std::io::stderr().is_terminal(),
    };
    match run(&config, options) {
        RunOutcome::Completed(published) => {
            println!(
                "Posted xkcd #{} to group {} (post {}, {})",
                published.comic_id, config.group_id, published.post_id, published.attachment
            );
            Ok(())
        }
        RunOutcome::Aborted(err) => Err(err.into()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
