#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use anyhow::Context;
use elastichunt::hunt::Hunt;
use elastichunt::input::{Config, Opts};
use elastichunt::tui::print_opening;
use elastichunt::{detail, output, warning};
use log::{debug, info};
use std::process::ExitCode;

// Average value for Ubuntu
#[cfg(unix)]
const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 8000;
// Descriptors kept free for HTTP clients and export files.
#[cfg(unix)]
const RESERVED_DESCRIPTORS: u64 = 100;
#[cfg(unix)]
const AVERAGE_WORKERS: usize = 256;

/// Reads the arguments, then runs the hunt until it finishes or the user
/// presses Ctrl-C.
#[tokio::main]
async fn main() -> ExitCode {
    #[cfg(not(unix))]
    let _ = ansi_term::enable_ansi_support();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            warning!(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let mut opts = Opts::read();
    let config = Config::read(opts.config_path.clone()).context("Aborting hunt")?;
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");

    print_opening(opts.no_banner, opts.accessible);

    #[cfg(unix)]
    {
        opts.workers = infer_workers(&opts, adjust_ulimit_size(&opts));
    }

    let hunt = Hunt::new(opts).context("Invalid configuration")?;
    let accessible = hunt.opts().accessible;

    tokio::select! {
        result = work(&hunt) => result,
        _ = tokio::signal::ctrl_c() => {
            warning!("Interrupted, stopping the hunt.", false, accessible);
            Ok(())
        }
    }
}

async fn work(hunt: &Hunt) -> anyhow::Result<()> {
    let accessible = hunt.opts().accessible;

    if hunt.opts().single {
        let report = hunt
            .download_single()
            .await
            .context("Single index download failed")?;
        info!("Single download finished: {report:?}");
        return Ok(());
    }

    let reports = hunt.run().await.context("Hunt failed")?;
    if reports.is_empty() {
        warning!("No Elasticsearch services found.", false, accessible);
        return Ok(());
    }

    let failed: usize = reports
        .iter()
        .flat_map(|report| &report.exports)
        .filter(|(_, result)| result.is_err())
        .count();
    output!(
        format!("Found {} Elasticsearch service(s).", reports.len()),
        false,
        accessible
    );
    if failed > 0 {
        detail!(
            format!("{failed} download(s) failed, see the messages above."),
            false,
            accessible
        );
    }
    Ok(())
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                false,
                opts.accessible
            );
        } else {
            warning!("ERROR. Failed to set ulimit value.", false, opts.accessible);
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            debug!("Could not read the file limit: {e}");
            DEFAULT_FILE_DESCRIPTORS_LIMIT
        }
    }
}

/// Lowers the worker count so connect attempts never exhaust the open file
/// limit.
#[cfg(unix)]
fn infer_workers(opts: &Opts, ulimit: u64) -> usize {
    let workers = opts.workers;
    let available = usize::try_from(ulimit.saturating_sub(RESERVED_DESCRIPTORS)).unwrap_or(usize::MAX);

    if available < workers {
        warning!(
            "File limit is lower than the worker count. Consider upping with --ulimit.",
            false,
            opts.accessible
        );
        if ulimit < 2 * RESERVED_DESCRIPTORS {
            warning!(
                "Your file limit is very small, which negatively impacts ElasticHunt's speed. Up the Ulimit with '--ulimit 5000'.",
                false,
                opts.accessible
            );
            info!("Halving workers because ulimit is very small");
            return usize::try_from(ulimit / 2).unwrap_or(1).max(1);
        }
        info!("Workers lowered to fit the file limit");
        return available.max(1);
    } else if ulimit > DEFAULT_FILE_DESCRIPTORS_LIMIT && workers < AVERAGE_WORKERS {
        detail!(
            format!(
                "File limit higher than worker count. Can increase speed by increasing workers '-w {}'.",
                AVERAGE_WORKERS
            ),
            false,
            opts.accessible
        );
    }

    workers
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    use super::infer_workers;
    use elastichunt::input::Opts;

    #[test]
    #[cfg(unix)]
    fn workers_lowered_to_fit_ulimit() {
        let opts = Opts {
            workers: 4000,
            ..Opts::default()
        };
        assert_eq!(infer_workers(&opts, 1024), 924);
    }

    #[test]
    #[cfg(unix)]
    fn workers_halved_on_tiny_ulimit() {
        let opts = Opts {
            workers: 512,
            ..Opts::default()
        };
        assert_eq!(infer_workers(&opts, 150), 75);
    }

    #[test]
    #[cfg(unix)]
    fn workers_kept_when_ulimit_is_high() {
        let opts = Opts {
            workers: 512,
            ..Opts::default()
        };
        assert_eq!(infer_workers(&opts, 10_000), 512);
        assert_eq!(infer_workers(&opts, 612), 512);
    }
}
