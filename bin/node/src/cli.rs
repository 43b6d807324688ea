//! Module for the CLI.

use alloy_primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser};
use facet_derive::{
    config::{ChainConfig, Network},
    registry::SignerRegistry,
};
use std::path::PathBuf;
use tracing::Level;

/// The Facet derivation node.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The L1 execution JSON-RPC endpoint.
    #[clap(long, env = "L1_RPC_URL")]
    pub l1_rpc_url: String,
    /// The unauthenticated L2 JSON-RPC endpoint.
    #[clap(long, env = "NON_AUTH_GETH_RPC_URL")]
    pub non_auth_geth_rpc_url: String,
    /// The authenticated L2 engine API endpoint.
    #[clap(long, env = "GETH_RPC_URL")]
    pub geth_rpc_url: String,
    /// The hex-encoded engine JWT secret.
    #[clap(long, env = "JWT_SECRET")]
    pub jwt_secret: String,
    /// The beacon node API base URL.
    #[clap(long, env = "ETHEREUM_BEACON_NODE_API_BASE_URL")]
    pub beacon_url: String,
    /// An optional beacon node API key.
    #[clap(long, env = "ETHEREUM_BEACON_NODE_API_KEY")]
    pub beacon_api_key: Option<String>,
    /// The L1 network: mainnet, sepolia, or hoodi.
    #[clap(long, env = "L1_NETWORK", default_value = "mainnet")]
    pub l1_network: Network,
    /// The block database directory.
    #[clap(long, env = "DATA_DIR", default_value = "./facet-data")]
    pub data_dir: PathBuf,
    /// How many L1 blocks to prefetch ahead.
    #[clap(long, env = "L1_PREFETCH_FORWARD", default_value_t = 20)]
    pub l1_prefetch_forward: u64,
    /// Concurrent prefetch workers.
    #[clap(long, env = "L1_PREFETCH_THREADS", default_value_t = 2)]
    pub l1_prefetch_threads: usize,
    /// Per-block prefetch timeout in seconds.
    #[clap(long, env = "L1_PREFETCH_TIMEOUT", default_value_t = 30)]
    pub l1_prefetch_timeout: u64,
    /// Cap on the byte length of a single batch payload.
    #[clap(long, env = "MAX_BATCH_BYTES", default_value_t = facet_derive::params::MAX_BATCH_BYTES)]
    pub max_batch_bytes: u32,
    /// Cap on the transactions within one batch.
    #[clap(long, env = "MAX_TXS_PER_BATCH", default_value_t = facet_derive::params::MAX_TXS_PER_BATCH)]
    pub max_txs_per_batch: usize,
    /// Cap on the batches extracted from one carrier payload.
    #[clap(long, env = "MAX_BATCHES_PER_PAYLOAD", default_value_t = facet_derive::params::MAX_BATCHES_PER_PAYLOAD)]
    pub max_batches_per_payload: usize,
    /// The priority signer registry mode: env, static, rotation, mapping,
    /// or disabled.
    #[clap(long, env = "PRIORITY_REGISTRY_MODE", default_value = "disabled")]
    pub priority_registry_mode: String,
    /// The authorized signer for the env and static modes.
    #[clap(long, env = "PRIORITY_SIGNER")]
    pub priority_signer: Option<Address>,
    /// Comma-separated signer set for the rotation mode.
    #[clap(long, env = "PRIORITY_SIGNER_SET")]
    pub priority_signer_set: Option<String>,
    /// Comma-separated `block:address` entries for the mapping mode.
    #[clap(long, env = "PRIORITY_SIGNER_MAPPING")]
    pub priority_signer_mapping: Option<String>,
    /// Whether to verify priority batch signatures.
    #[clap(long, env = "ENABLE_SIG_VERIFY", default_value_t = true, action = ArgAction::Set)]
    pub enable_sig_verify: bool,
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count)]
    pub v: u8,
}

impl Cli {
    /// Initializes telemetry for the application.
    pub fn init_telemetry(self) -> Result<Self> {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match self.v {
                0 => Level::ERROR,
                1 => Level::WARN,
                2 => Level::INFO,
                3 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .finish();
        tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))?;
        Ok(self)
    }

    /// Assembles the chain configuration from the network defaults and the
    /// configured overrides.
    pub fn chain_config(&self) -> Result<ChainConfig> {
        let mut cfg = ChainConfig::for_network(self.l1_network);
        cfg.max_batch_bytes = self.max_batch_bytes;
        cfg.max_txs_per_batch = self.max_txs_per_batch;
        cfg.max_batches_per_payload = self.max_batches_per_payload;
        cfg.verify_signatures = self.enable_sig_verify;
        cfg.registry = self.registry()?;

        if cfg.verify_signatures && cfg.registry == SignerRegistry::Disabled {
            bail!("ENABLE_SIG_VERIFY requires a priority registry mode other than disabled");
        }
        Ok(cfg)
    }

    fn registry(&self) -> Result<SignerRegistry> {
        match self.priority_registry_mode.as_str() {
            "disabled" => Ok(SignerRegistry::Disabled),
            "env" | "static" => {
                let signer = self
                    .priority_signer
                    .context("PRIORITY_SIGNER is required for the env and static modes")?;
                Ok(SignerRegistry::Static(signer))
            }
            "rotation" => {
                let raw = self
                    .priority_signer_set
                    .as_deref()
                    .context("PRIORITY_SIGNER_SET is required for the rotation mode")?;
                let set = raw
                    .split(',')
                    .map(|part| part.trim().parse::<Address>().map_err(|e| anyhow!(e)))
                    .collect::<Result<Vec<_>>>()?;
                if set.is_empty() {
                    bail!("PRIORITY_SIGNER_SET is empty");
                }
                Ok(SignerRegistry::Rotation(set))
            }
            "mapping" => {
                let raw = self
                    .priority_signer_mapping
                    .as_deref()
                    .context("PRIORITY_SIGNER_MAPPING is required for the mapping mode")?;
                let entries = raw
                    .split(',')
                    .map(|part| {
                        let (block, address) = part
                            .trim()
                            .split_once(':')
                            .context("mapping entries take the form block:address")?;
                        Ok((
                            block.parse::<u64>().map_err(|e| anyhow!(e))?,
                            address.parse::<Address>().map_err(|e| anyhow!(e))?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SignerRegistry::mapping(entries))
            }
            other => bail!("unknown PRIORITY_REGISTRY_MODE: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "facet-node",
            "--l1-rpc-url",
            "http://localhost:8545",
            "--non-auth-geth-rpc-url",
            "http://localhost:9545",
            "--geth-rpc-url",
            "http://localhost:8551",
            "--jwt-secret",
            "0x11",
            "--beacon-url",
            "http://localhost:5052",
        ]
    }

    #[test]
    fn disabled_registry_requires_sig_verify_off() {
        let mut args = base_args();
        args.extend(["--enable-sig-verify", "false"]);
        let cli = Cli::parse_from(args);
        let cfg = cli.chain_config().unwrap();
        assert_eq!(cfg.registry, SignerRegistry::Disabled);
        assert!(!cfg.verify_signatures);

        let cli = Cli::parse_from(base_args());
        assert!(cli.chain_config().is_err());
    }

    #[test]
    fn static_registry_parses_signer() {
        let mut args = base_args();
        args.extend([
            "--priority-registry-mode",
            "static",
            "--priority-signer",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        ]);
        let cfg = Cli::parse_from(args).chain_config().unwrap();
        assert!(matches!(cfg.registry, SignerRegistry::Static(_)));
    }

    #[test]
    fn mapping_registry_parses_entries() {
        let mut args = base_args();
        args.extend([
            "--priority-registry-mode",
            "mapping",
            "--priority-signer-mapping",
            "0:0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa,500:0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
        ]);
        let cfg = Cli::parse_from(args).chain_config().unwrap();
        let SignerRegistry::Mapping(entries) = cfg.registry else {
            panic!("expected mapping registry");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, 0);
    }
}
