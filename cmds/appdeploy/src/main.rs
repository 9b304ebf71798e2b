use anyhow::Result;
use appdeploy::{
	commands::{self, deploy::DeployArgs, util::BrokenPipeGuard},
	telemetry,
};
use clap::Parser;

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "appdeploy")]
#[command(about = "Render an application's manifest template and create it in the cluster", long_about = None)]
#[command(version = env!("APPDEPLOY_VERSION"))]
struct Cli {
	#[command(flatten)]
	deploy: DeployArgs,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let _telemetry = telemetry::init(cli.deploy.log_level, cli.deploy.log_format)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());
	commands::deploy::run(cli.deploy, stdout)
}
