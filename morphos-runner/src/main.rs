//! CLI entry point: loads a run configuration, drives `EvolutionDriver` to
//! completion (or abort), and persists progress to disk as it goes.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use morphos::evolution::{DriverObserver, EvolutionDriver, GenerationEvent, RunConfig, TracingObserver};
use morphos::persistence::{RunPersistence, RunState};
use morphos::scheduler::Scene;

use morphos_runner::JsonFilePersistence;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SceneArg {
    Earth,
    Moon,
    Jupiter,
    Water,
}

impl From<SceneArg> for Scene {
    fn from(arg: SceneArg) -> Self {
        match arg {
            SceneArg::Earth => Scene::Earth,
            SceneArg::Moon => Scene::Moon,
            SceneArg::Jupiter => Scene::Jupiter,
            SceneArg::Water => Scene::Water,
        }
    }
}

/// Headless runner for an evolution run described by a JSON config file.
#[derive(Debug, Parser)]
#[command(name = "morphos-runner", version, about)]
struct Args {
    /// Path to a JSON-encoded RunConfig.
    #[arg(long)]
    config: PathBuf,

    /// Directory for run-state and replay persistence.
    #[arg(long, default_value = "./morphos-run")]
    out: PathBuf,

    /// Resume from a previously saved run state in `out`, if one exists.
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Gravity/damping scene to evaluate individuals in.
    #[arg(long, value_enum, default_value_t = SceneArg::Earth)]
    scene: SceneArg,
}

/// Observer that persists a snapshot after every emission point, on top of
/// the plain logging `TracingObserver` does.
struct PersistingObserver<'a> {
    store: &'a dyn RunPersistence,
    inner: TracingObserver,
}

impl<'a> DriverObserver for PersistingObserver<'a> {
    fn on_generation(&mut self, event: &GenerationEvent) {
        self.inner.on_generation(event);
    }

    fn on_state_snapshot(&mut self, state: &RunState) {
        self.inner.on_state_snapshot(state);
        if let Err(err) = self.store.save_run_state(state) {
            error!(error = %err, "failed to persist run state snapshot");
        }
    }

    fn on_complete(&mut self, state: &RunState) {
        self.inner.on_complete(state);
        if let Err(err) = self.store.save_run_state(state) {
            error!(error = %err, "failed to persist final run state");
        }
    }
}

fn install_abort_handler() -> Result<Arc<AtomicBool>> {
    let abort = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&abort);
    ctrlc::set_handler(move || {
        info!("shutdown signal received, aborting at the next generation boundary");
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl+C handler")?;
    Ok(abort)
}

fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config_text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading config file {}", args.config.display()))?;
    let config: RunConfig = serde_json::from_str(&config_text)
        .with_context(|| format!("parsing config file {}", args.config.display()))?;

    let store = JsonFilePersistence::new(&args.out)
        .with_context(|| format!("preparing output directory {}", args.out.display()))?;

    let resume_state = if args.resume {
        store.load_run_state().context("loading resumable run state")?
    } else {
        None
    };

    let mut driver = EvolutionDriver::new(config).context("invalid run configuration")?;
    let abort = install_abort_handler()?;
    let mut observer = PersistingObserver { store: &store, inner: TracingObserver };
    let scene: Scene = args.scene.into();

    info!(scene = ?args.scene, resume = args.resume, "starting evolution run");
    match driver.run(&mut observer, &abort, resume_state, scene, &now_timestamp()) {
        Ok(final_state) => {
            info!(generation = final_state.generation, status = ?final_state.status, "run finished");
            Ok(())
        }
        Err(abort_err) => {
            info!(generation = abort_err.generation, "run aborted by signal");
            Ok(())
        }
    }
}
