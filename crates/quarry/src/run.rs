//! Run driver: config resolution, target seeding, and the join lifecycle.

use std::{fs, path::Path, process::ExitCode, time::Duration};

use config::{MANAGER_SECTION, Options, Value};
use quarry_engine::{Manager, Result};
use quarry_units::UnitRegistry;
use tracing::{debug, warn};

use crate::{
    Cli,
    events::{ChannelMonitor, Event, bridge_to_tokio},
};

/// Execute a full evaluation run for the parsed command line.
pub fn run(cli: Cli) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_async(cli))
}

async fn run_async(cli: Cli) -> Result<ExitCode> {
    let options = load_options(&cli)?;

    let (monitor, events_rx) = ChannelMonitor::new();
    let manager = Manager::new(options, UnitRegistry::with_defaults(), monitor);

    seed_targets(&manager, &cli.targets)?;
    manager.start()?;

    // Render events in one place so worker output never interleaves.
    let mut events = bridge_to_tokio(events_rx);
    let json = cli.json;
    let printer = tokio::spawn(async move {
        let mut flags = 0usize;
        while let Some(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(err) => warn!(%err, "failed to serialize event"),
                }
            } else {
                println!("{}", event.render());
            }
            match event {
                Event::Flag { .. } => flags += 1,
                // The completion event is always the last one of a run.
                Event::Completion { .. } => break,
                _ => {}
            }
        }
        flags
    });

    // First Ctrl-C drains in-flight cases; a second one forces the join.
    let interrupter = {
        let manager = manager.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received");
                manager.interrupt();
            }
        })
    };

    let timeout = cli
        .timeout
        .filter(|secs| secs.is_finite())
        .map(|secs| Duration::from_secs_f64(secs.clamp(0.0, 1e9)));
    let clean = {
        let manager = manager.clone();
        tokio::task::spawn_blocking(move || manager.join(timeout))
            .await
            .map_err(|_| quarry_engine::Error::State("join task failed"))??
    };

    interrupter.abort();
    let flags = printer
        .await
        .map_err(|_| quarry_engine::Error::State("event printer failed"))?;

    debug!(flags, clean, "run finished");
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Load the option bag and apply command-line overrides.
fn load_options(cli: &Cli) -> Result<Options> {
    let mut options = match config::resolve_config_path(cli.config.as_deref()) {
        Some(path) => config::load_from_path(&path)?,
        None => Options::new(),
    };

    if let Some(format) = &cli.flag_format {
        options.set(
            MANAGER_SECTION,
            "flag-format",
            Value::String(format.clone()),
        );
    }
    if let Some(outdir) = &cli.outdir {
        options.set(
            MANAGER_SECTION,
            "outdir",
            Value::String(outdir.display().to_string()),
        );
    }
    if let Some(threads) = cli.threads {
        options.set(MANAGER_SECTION, "threads", Value::Integer(threads as i64));
    }
    if let Some(depth) = cli.max_depth {
        options.set(MANAGER_SECTION, "max-depth", Value::Integer(depth as i64));
    }
    if cli.no_recurse {
        options.set(MANAGER_SECTION, "recurse", Value::Boolean(false));
    }
    Ok(options)
}

/// Queue each command-line target: file contents when the argument names a
/// readable file, the literal bytes otherwise.
fn seed_targets(manager: &Manager, targets: &[String]) -> Result<()> {
    for raw in targets {
        let path = Path::new(raw);
        let payload = if path.is_file() {
            debug!(path = %raw, "reading target file");
            fs::read(path)?
        } else {
            raw.clone().into_bytes()
        };
        if manager.queue_target(payload, None)?.is_none() {
            warn!(value = %raw, "ignoring empty target");
        }
    }
    Ok(())
}
