use anyhow::Context;
use measure::fingerprint::{Fingerprint, LeasePaths};
use measure::lease::read_recorded_pid;
use measure::{clienv, MeasureConfig};

pub(crate) fn cmd_fingerprint(config: MeasureConfig) -> anyhow::Result<()> {
    let api_key = config
        .resolved_api_key()
        .context("api_key missing. Specify --api-key or the DD_API_KEY environment variable")?;

    let fingerprint = Fingerprint::compute(&api_key, &config.daemon_config);
    let paths = LeasePaths::new(&clienv::runtime_dir(), &fingerprint);

    println!("Fingerprint: {fingerprint}");
    println!("  Lease:  {}", paths.lease.display());
    println!("  Socket: {}", paths.socket.display());
    println!("  Binary: {}", paths.binary.display());
    match read_recorded_pid(&paths.lease) {
        Some(pid) => println!("  Daemon: pid {pid} (last recorded)"),
        None => println!("  Daemon: none recorded"),
    }
    Ok(())
}
