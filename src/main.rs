use anyhow::Context;
use clap::Parser;
use log::info;
use raleighsl::config::Config;
use raleighsl::device::MemDevice;
use raleighsl::eventloop::Runtime;
use raleighsl::object::plugins::{counter::CounterPlugin, deque::DequePlugin, flow::FlowPlugin, number::NumberPlugin, sset::SsetPlugin};
use raleighsl::object::{ObjectDispatch, ObjectOp, Msg};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "raleighsl", about = "Pluggable, transactional object store core")]
struct Args {
    /// Path to config file
    #[arg(long, value_name = "PATH", default_value = "/etc/raleighsl/raleighsl.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the worker runtime and idle (default if no subcommand given).
    Serve,
    /// Create one object of the given type and exercise a handful of ops
    /// against it, then exit. Useful for smoke-testing a build.
    Smoke {
        #[arg(long, default_value = "counter")]
        r#type: String,
    },
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::load_from(&args.config);
    info!(
        "loaded config: ncores={} cache_capacity={} cache_policy={:?}",
        config.runtime.ncores, config.cache.capacity, config.cache.policy
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config),
        Command::Smoke { r#type } => smoke(config, &r#type),
    }
}

fn serve(config: Config) -> anyhow::Result<()> {
    let runtime = Runtime::open(config.runtime.ncores, config.rings.local_ring_size);
    info!("runtime open with {} workers", runtime.ncores());

    let device = Arc::new(MemDevice::new());
    let mut dispatch = ObjectDispatch::new(device, config.cache.capacity, config.runtime.ncores.max(1), config.cache.policy);
    register_default_plugins(&mut dispatch);
    dispatch.replay_state();
    let dispatch = Arc::new(dispatch);
    info!("object dispatch ready");

    let boot_label = leak_type_label("counter")?;
    if !dispatch.semantic.exists("boot") {
        dispatch.create_object("boot", boot_label).context("failed to create boot object")?;
    }
    let txn = dispatch.txns.create();
    dispatch.clone().execute_task(&runtime, 0, txn, "boot", ObjectOp::Query, Msg::Query, |result| match result {
        Ok(_) => info!("boot query completed"),
        Err(e) => log::warn!("boot query failed: {e}"),
    });

    // No external transport is wired up in this build (spec.md's
    // Non-goals exclude socket/poll transport beyond the core); park the
    // main thread so the worker pool keeps running until the process is
    // signalled.
    std::thread::park();
    runtime.stop();
    runtime.close();
    Ok(())
}

fn smoke(config: Config, type_label: &str) -> anyhow::Result<()> {
    let runtime = Runtime::open(1, config.rings.local_ring_size);

    let device = Arc::new(MemDevice::new());
    let mut dispatch = ObjectDispatch::new(device, config.cache.capacity, 1, config.cache.policy);
    register_default_plugins(&mut dispatch);
    dispatch.replay_state();
    let dispatch = Arc::new(dispatch);

    let oid = dispatch
        .create_object("smoke", leak_type_label(type_label)?)
        .context("failed to create smoke-test object")?;
    info!("created object {oid} of type {type_label}");

    let txn = dispatch.txns.create();
    let (tx, rx) = std::sync::mpsc::channel();
    dispatch.clone().execute_task(&runtime, 0, txn, "smoke", ObjectOp::Query, Msg::Query, move |result| {
        let _ = tx.send(result);
    });
    let reply = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .context("query task did not complete")??;
    match reply {
        raleighsl::object::Reply::None => info!("query returned no value"),
        raleighsl::object::Reply::Value(v) => info!("query returned {} bytes", v.len()),
        raleighsl::object::Reply::Values(vs) => info!("query returned {} records", vs.len()),
    }
    dispatch.txns.commit(txn)?;

    runtime.stop();
    runtime.close();
    Ok(())
}

fn leak_type_label(label: &str) -> anyhow::Result<&'static str> {
    match label {
        "counter" => Ok("counter"),
        "number" => Ok("number"),
        "deque" => Ok("deque"),
        "sset" => Ok("sset"),
        "flow" => Ok("flow"),
        other => anyhow::bail!("unknown object type {other}"),
    }
}

fn register_default_plugins<D: raleighsl::device::Device + 'static>(dispatch: &mut ObjectDispatch<D>) {
    dispatch.register_plugin(Arc::new(CounterPlugin));
    dispatch.register_plugin(Arc::new(NumberPlugin));
    dispatch.register_plugin(Arc::new(DequePlugin));
    dispatch.register_plugin(Arc::new(SsetPlugin));
    dispatch.register_plugin(Arc::new(FlowPlugin));
}
