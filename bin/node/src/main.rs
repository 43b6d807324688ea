//! The Facet derivation node entrypoint.

use anyhow::{anyhow, Result};
use clap::Parser;
use facet_derive::mint::MintSchedule;
use facet_driver::{
    proposer::ProposerConfig, DerivationPipeline, EngineApiClient, PipelineConfig, Proposer,
    RocksBlockStore,
};
use facet_providers_alloy::{
    AlloyChainProvider, OnlineBeaconClient, OnlineBlobProvider, Prefetcher, PrefetcherConfig,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{error, info};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse().init_telemetry()?;
    info!(target: "node", "initialized telemetry");

    let chain = cli.chain_config()?;
    let schedule = MintSchedule::default();

    let l1_url: reqwest::Url =
        cli.l1_rpc_url.parse().map_err(|e| anyhow!("invalid L1_RPC_URL: {e}"))?;
    let l2_url: reqwest::Url = cli
        .non_auth_geth_rpc_url
        .parse()
        .map_err(|e| anyhow!("invalid NON_AUTH_GETH_RPC_URL: {e}"))?;

    let mut l1_provider = AlloyChainProvider::new_http(l1_url);
    let l1_chain_id =
        l1_provider.chain_id().await.map_err(|e| anyhow!("querying L1 chain id: {e}"))?;
    info!(target: "node", l1_chain_id, network = ?cli.l1_network, "connected to L1");
    let l2_provider = AlloyChainProvider::new_http(l2_url);
    let beacon = OnlineBeaconClient::new_http(cli.beacon_url.clone(), cli.beacon_api_key.clone());
    let blob_provider = OnlineBlobProvider::new(beacon, None, None);

    let engine = EngineApiClient::new(cli.geth_rpc_url.clone(), &cli.jwt_secret)
        .map_err(|e| anyhow!("engine client: {e}"))?;
    let proposer = Proposer::new(engine, ProposerConfig::default());

    let prefetcher = Prefetcher::new(
        l1_provider.clone(),
        PrefetcherConfig {
            window: cli.l1_prefetch_forward,
            concurrency: cli.l1_prefetch_threads,
            timeout: Duration::from_secs(cli.l1_prefetch_timeout),
            tip_ttl: Duration::from_secs(12),
        },
    );

    let store = RocksBlockStore::open(cli.data_dir.clone())
        .map_err(|e| anyhow!("opening block store: {e}"))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    let _signal_watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "node", "shutdown signal received");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let mut pipeline = DerivationPipeline::new(
        chain,
        schedule,
        PipelineConfig::default(),
        prefetcher,
        l1_provider,
        l2_provider,
        blob_provider,
        proposer,
        store,
        shutdown,
    );

    pipeline.init().await.map_err(|e| anyhow!("pipeline init: {e}"))?;
    match pipeline.run().await {
        Ok(()) => {
            info!(target: "node", "derivation stopped cleanly");
            Ok(())
        }
        Err(err) => {
            error!(target: "node", %err, "fatal derivation failure");
            Err(anyhow!(err))
        }
    }
}
