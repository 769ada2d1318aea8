use clap::Parser;
use itertools::Itertools;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use xmr_alias_sync::{
	config::{Args, Command},
	dns::{CpanelZoneClient, DnsReconciler},
	service::Pipeline,
	store::FileUserStore,
	wallet::{WalletHandle, WalletRpcClient},
};

#[tokio::main]
async fn main() -> ExitCode {
	let _ = dotenvy::dotenv();
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
				tracing_subscriber::EnvFilter::new(format!(
					"xmr_alias_sync={},info",
					args.log_level
				))
			}),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting payment alias service");

	let store = match FileUserStore::open(&args.data_file).await {
		Ok(store) => Arc::new(store),
		Err(e) => {
			error!("Failed to open user table {}: {}", args.data_file.display(), e);
			return ExitCode::FAILURE;
		}
	};

	let wallet = match args.wallet_settings() {
		Ok(settings) => {
			match WalletRpcClient::new(&settings.rpc_url, settings.credentials, settings.timeouts.call) {
				Ok(client) => {
					info!("Using wallet RPC at {}", settings.rpc_url);
					Some(WalletHandle::new(Arc::new(client), settings.timeouts))
				}
				Err(e) => {
					error!("Failed to create wallet client: {}", e);
					return ExitCode::FAILURE;
				}
			}
		}
		Err(e) => {
			warn!("Wallet disabled: {}", e);
			None
		}
	};

	let reconciler = match args.zone_settings() {
		Ok(settings) => {
			match CpanelZoneClient::new(&settings.panel_url, settings.credentials, settings.timeout) {
				Ok(client) => {
					info!("Managing payment aliases in zone {}", settings.alias.zone);
					Some(DnsReconciler::new(Arc::new(client), settings.alias))
				}
				Err(e) => {
					error!("Failed to create zone client: {}", e);
					return ExitCode::FAILURE;
				}
			}
		}
		Err(e) => {
			warn!("DNS alias management disabled: {}", e);
			None
		}
	};

	let pipeline = Pipeline::new(store, wallet, reconciler, args.schedule());

	match args.command() {
		Command::Run => {
			let tasks = pipeline.start();
			info!("Running {} background tasks, press Ctrl-C to stop", tasks.len());

			if let Err(e) = tokio::signal::ctrl_c().await {
				error!("Failed to listen for shutdown signal: {}", e);
			}
			tasks.shutdown().await;
			info!("Shut down");
		}
		Command::SyncAll => match pipeline.sync_all().await {
			Ok(report) => {
				info!(
					"Alias sync: {} succeeded, {} failed\n{}",
					report.success_count,
					report.failure_count,
					report.log.iter().join("\n")
				);
				if report.failure_count > 0 {
					return ExitCode::from(2);
				}
			}
			Err(e) => {
				error!("Alias sync failed: {}", e);
				return ExitCode::FAILURE;
			}
		},
		Command::Allocate { user } => match pipeline.allocate(&user).await {
			Ok(address) => info!("Payment address for {}: {}", user, address),
			Err(e) => {
				error!("Allocation for {} failed: {}", user, e);
				return ExitCode::FAILURE;
			}
		},
		Command::Status => {
			let status = pipeline.sync_once().await;
			match serde_json::to_string_pretty(&status) {
				Ok(json) => println!("{}", json),
				Err(e) => {
					error!("Failed to render status: {}", e);
					return ExitCode::FAILURE;
				}
			}
		}
	}

	ExitCode::SUCCESS
}
