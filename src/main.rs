//! Demo/stress binary for the trace-event subsystem.
//!
//! Emits a deterministic instrumentation workload from several threads and
//! can re-spawn itself as child processes, which inherit the tracing
//! environment and exercise the master/slave election against a real shared
//! file. The multi-process integration tests drive this binary.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::process::Command;
use tracefile::{
    trace_counter, trace_instant, trace_process_name, trace_scope, trace_thread_name, ArgMap,
    InstantScope, TraceWriter, TracingSystem,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tracefile")]
#[command(version)]
#[command(about = "Emit a synthetic trace-event workload", long_about = None)]
struct Cli {
    /// Trace file path (consumed by the master election; children inherit
    /// the resolved path through the environment)
    #[arg(long = "trace-file", value_name = "PATH")]
    trace_file: Option<PathBuf>,

    /// Worker threads to emit from
    #[arg(long, default_value = "2")]
    threads: usize,

    /// Events per thread (each iteration emits one scope pair and one
    /// counter sample)
    #[arg(long, default_value = "25")]
    events: usize,

    /// Child processes to spawn (each child runs the same workload with
    /// --children 0)
    #[arg(long, default_value = "0")]
    children: usize,

    /// Process name metadata to emit
    #[arg(long = "process-name", value_name = "NAME")]
    process_name: Option<String>,

    /// Use the single-process direct writer (strict JSON output) instead of
    /// the shared-file coordinator
    #[arg(long)]
    direct: bool,
}

fn init_diagnostics() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// One worker thread's share of the workload.
fn emit_workload(worker: usize, events: usize) {
    trace_thread_name(&format!("worker-{worker}"));
    for i in 0..events {
        let _scope = trace_scope!("work", &["demo"], {
            "worker" => worker,
            "iteration" => i,
        });
        trace_counter("progress", &[("items", i as f64)], &["demo"]);
        if i % 10 == 0 {
            trace_instant("tick", InstantScope::Thread);
        }
    }
}

fn spawn_children(count: usize, cli: &Cli) -> Result<Vec<std::process::Child>> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let mut children = Vec::with_capacity(count);
    for _ in 0..count {
        let mut cmd = Command::new(&exe);
        cmd.arg("--children")
            .arg("0")
            .arg("--threads")
            .arg(cli.threads.to_string())
            .arg("--events")
            .arg(cli.events.to_string());
        // TRACE_MASTER / TRACE_FILE are inherited implicitly.
        children.push(cmd.spawn().context("failed to spawn child process")?);
    }
    Ok(children)
}

fn run_direct(cli: &Cli) -> Result<()> {
    let path = cli
        .trace_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("application.trace"));
    let writer = TraceWriter::create(&path)
        .with_context(|| format!("cannot create trace file {}", path.display()))?;
    for i in 0..cli.events {
        let mut args = ArgMap::new();
        args.insert("iteration".to_string(), json!(i));
        writer.write_begin("work", args, &["demo"]);
        writer.write_counter("progress", "items", i as f64, &["demo"]);
        writer.write_end("work", ArgMap::new(), &["demo"]);
    }
    Ok(())
}

fn run_coordinated(cli: &Cli) -> Result<()> {
    let guard = TracingSystem::init();
    if let Some(name) = &cli.process_name {
        trace_process_name(name);
    }

    let children = spawn_children(cli.children, cli)?;

    let workers: Vec<_> = (0..cli.threads)
        .map(|worker| {
            let events = cli.events;
            std::thread::spawn(move || emit_workload(worker, events))
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    for mut child in children {
        let status = child.wait().context("failed to wait for child")?;
        anyhow::ensure!(status.success(), "child process failed: {status}");
    }

    drop(guard);
    Ok(())
}

fn main() -> Result<()> {
    init_diagnostics();
    let cli = Cli::parse();
    if cli.direct {
        run_direct(&cli)
    } else {
        run_coordinated(&cli)
    }
}
