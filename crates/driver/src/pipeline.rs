//! The top-level derivation loop.
//!
//! Consumes L1 blocks in strict order: discover the tip through the
//! prefetcher, detect reorgs against the stored chain, derive the ordered
//! transaction list, drive the engine, persist, advance. Each block's
//! derivation is atomic with respect to persistence.

use crate::{
    cursor::SyncCursor,
    engine::Engine,
    errors::DriverError,
    proposer::{
        bluebird_upgrade_transactions, filler_block_count, migration_transactions,
        next_timestamp, transactions_required_call, ProposedBlock, Proposer,
    },
    store::{BlockStore, L2BlockRecord},
};
use alloy_primitives::U256;
use facet_derive::{
    attributes::L1Attributes,
    builder::build_block,
    collect::BatchCollector,
    config::ChainConfig,
    mint::{MintController, MintSchedule, MintState},
    params::SYSTEM_ADDRESS,
    traits::{BlobProvider, ChainProvider},
    types::{DerivedTx, FacetDeposit, L1Block, L1Header},
};
use facet_providers_alloy::{FetchOutcome, Prefetcher};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{error, info, warn};

/// Configuration for the derivation loop.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// How long to wait before re-polling when the next L1 block is not
    /// ready.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(2) }
    }
}

/// The derivation pipeline, wiring providers, proposer, and persistence.
#[derive(Debug)]
pub struct DerivationPipeline<P, Q, B, E, S>
where
    P: ChainProvider + Clone + Send + 'static,
    Q: ChainProvider,
    B: BlobProvider,
    E: Engine,
    S: BlockStore,
{
    chain: ChainConfig,
    schedule: MintSchedule,
    cfg: PipelineConfig,
    prefetcher: Prefetcher<P>,
    l1_provider: P,
    l2_provider: Q,
    blob_provider: B,
    proposer: Proposer<E>,
    store: S,
    cursor: SyncCursor,
    shutdown: Arc<AtomicBool>,
}

impl<P, Q, B, E, S> DerivationPipeline<P, Q, B, E, S>
where
    P: ChainProvider + Clone + Send + 'static,
    P::Error: Send,
    Q: ChainProvider,
    B: BlobProvider,
    E: Engine + Send,
    S: BlockStore,
{
    /// Creates a pipeline. Call [Self::init] before [Self::run].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: ChainConfig,
        schedule: MintSchedule,
        cfg: PipelineConfig,
        prefetcher: Prefetcher<P>,
        l1_provider: P,
        l2_provider: Q,
        blob_provider: B,
        proposer: Proposer<E>,
        store: S,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chain,
            schedule,
            cfg,
            prefetcher,
            l1_provider,
            l2_provider,
            blob_provider,
            proposer,
            store,
            cursor: SyncCursor::default(),
            shutdown,
        }
    }

    /// Returns the current cursor.
    pub const fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// Positions the cursor: resume from the store, or bootstrap at the
    /// fork block on a fresh database.
    pub async fn init(&mut self) -> Result<(), DriverError> {
        if let Some(head) = self.store.l2_head()? {
            let record = self
                .store
                .l2_block(head)?
                .ok_or_else(|| DriverError::Provider(format!("missing L2 record {head}")))?;
            self.cursor = SyncCursor::new(
                record.info,
                record.source_l1_number,
                record.sequence_number,
                record.mint,
            );
            info!(
                target: "pipeline",
                l2_head = record.info.number,
                l1 = record.source_l1_number,
                "resuming from store"
            );
            return Ok(());
        }

        // Fresh database: the L2 head is whatever the engine already has,
        // and derivation starts at the fork block with the issuance
        // bootstrap.
        let l2_tip = self
            .l2_provider
            .latest_block_number()
            .await
            .map_err(|e| DriverError::Provider(e.to_string()))?;
        let l2_head = self
            .l2_provider
            .block_with_receipts(l2_tip)
            .await
            .map_err(|e| DriverError::Provider(e.to_string()))?
            .ok_or_else(|| DriverError::Provider(format!("missing L2 head block {l2_tip}")))?
            .header
            .block_info();

        let prev_number = self.chain.fork_block.saturating_sub(1);
        let prev = self.l1_header_for(prev_number).await?;
        let mint = MintState::bootstrap(
            &self.schedule,
            self.chain.prefork_minted,
            self.chain.prefork_rate_per_gas,
            prev.base_fee_per_gas,
            self.chain.fork_block,
        );

        self.cursor = SyncCursor::new(l2_head, prev_number, 0, mint);
        info!(
            target: "pipeline",
            l2_head = l2_head.number,
            fork_block = self.chain.fork_block,
            "bootstrapping at fork block"
        );
        Ok(())
    }

    /// Runs the derivation loop until shutdown or a fatal error.
    pub async fn run(&mut self) -> Result<(), DriverError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!(target: "pipeline", "shutdown requested; draining prefetcher");
                self.prefetcher.shutdown();
                return Ok(());
            }
            if !self.step().await? {
                tokio::time::sleep(self.cfg.poll_interval).await;
            }
        }
    }

    /// Attempts to derive one L1 block. Returns `false` when the next block
    /// is not available yet.
    pub async fn step(&mut self) -> Result<bool, DriverError> {
        let next = self.cursor.l1_number + 1;
        let block = match self.prefetcher.fetch(next).await? {
            FetchOutcome::NotReady => return Ok(false),
            FetchOutcome::Ready(block) => block,
        };

        // Canonical-chain check against the stored parent.
        if let Some(stored_parent) = self.store.l1_header(next - 1)? {
            if block.header.parent_hash != stored_parent.hash {
                warn!(
                    target: "pipeline",
                    number = next,
                    expected = %stored_parent.hash,
                    got = %block.header.parent_hash,
                    "L1 reorg detected"
                );
                self.handle_reorg(next).await?;
                return Ok(true);
            }
        }

        self.derive_block(*block).await?;
        Ok(true)
    }

    /// Derives, proposes, and persists every L2 block for one L1 block.
    async fn derive_block(&mut self, block: L1Block) -> Result<(), DriverError> {
        let l1_number = block.header.number;
        let collected = BatchCollector::new(&self.chain, &mut self.blob_provider)
            .collect(&block)
            .await?;
        if collected.stats.missing_blobs > 0 {
            warn!(
                target: "pipeline",
                l1 = l1_number,
                missing = collected.stats.missing_blobs,
                "blobs missing from the blob store"
            );
        }
        let built = build_block(&self.chain, l1_number, &collected.batches, &collected.singles);

        // Fill any timestamp gap with empty blocks carrying the previous L1
        // context.
        let fillers = filler_block_count(self.cursor.l2_head.timestamp, block.header.timestamp);
        if fillers > 0 {
            let prev = self.l1_header_for(self.cursor.l1_number).await?;
            for _ in 0..fillers {
                let sequence = self.cursor.sequence + 1;
                self.propose_one(&prev, Vec::new(), sequence, Vec::new(), false).await?;
            }
        }

        // System-transaction extras for designated fork heights.
        let fork_boot = l1_number == self.chain.fork_block;
        let mut extras: Vec<FacetDeposit> = Vec::new();
        if fork_boot {
            let required = self.migration_transactions_required().await?;
            info!(target: "pipeline", required, "injecting migration transactions");
            extras.extend(migration_transactions(
                self.chain.migration_manager,
                block.header.hash,
                required,
            ));
        }
        if l1_number + 1 == self.chain.bluebird_block {
            let nonce = self
                .l2_provider
                .transaction_count(SYSTEM_ADDRESS)
                .await
                .map_err(|e| DriverError::Provider(e.to_string()))?;
            info!(target: "pipeline", nonce, "injecting bluebird predeploy upgrade");
            extras.extend(bluebird_upgrade_transactions(nonce, block.header.hash));
        }

        let proposed =
            self.propose_one(&block.header, built.transactions, 0, extras, fork_boot).await?;

        if fork_boot {
            self.check_migration_succeeded(proposed.info.number).await?;
        }

        self.store.put_l1_header(&block.header)?;
        self.prefetcher.evict_below(l1_number);

        info!(
            target: "pipeline",
            l1 = l1_number,
            l2 = self.cursor.l2_head.number,
            singles = collected.stats.calldata_singles + collected.stats.event_singles,
            batches = collected.batches.len(),
            duplicates = collected.stats.duplicates_dropped,
            txs = proposed.payload.transactions.len(),
            total_minted = %self.cursor.mint.total_minted,
            "derived L1 block"
        );
        Ok(())
    }

    /// Proposes a single L2 block on top of the cursor and persists it.
    async fn propose_one(
        &mut self,
        l1: &L1Header,
        user_txs: Vec<DerivedTx>,
        sequence: u64,
        extras: Vec<FacetDeposit>,
        fork_boot: bool,
    ) -> Result<ProposedBlock, DriverError> {
        let l2_number = self.cursor.l2_head.number + 1;
        let timestamp = next_timestamp(self.cursor.l2_head.timestamp, l1.timestamp);

        let mut txs = user_txs;
        let mut controller = MintController::new(&self.schedule, self.cursor.mint.clone());
        controller.process_block(l2_number, l1.base_fee_per_gas, &mut txs, fork_boot);
        let mint = controller.into_state();

        let attributes = L1Attributes {
            number: l1.number,
            timestamp: l1.timestamp,
            base_fee: l1.base_fee_per_gas,
            hash: l1.hash,
            sequence_number: sequence,
            mint: mint.clone(),
        };
        let mut system_txs = vec![attributes.to_deposit().encode()];
        system_txs.extend(extras.iter().map(FacetDeposit::encode));
        let user_encoded = txs.iter().map(DerivedTx::encode).collect::<Vec<_>>();

        let proposed = self
            .proposer
            .propose(
                &self.cursor.l2_head,
                timestamp,
                l1.mix_hash,
                l1.parent_beacon_block_root,
                self.chain.l2_gas_limit,
                &system_txs,
                &user_encoded,
            )
            .await?;

        let record = L2BlockRecord {
            info: proposed.info,
            source_l1_number: l1.number,
            sequence_number: sequence,
            transactions: proposed.payload.transactions.clone(),
            mint: mint.clone(),
        };
        self.store.put_l2_block(&record)?;
        self.cursor.advance(proposed.info, l1.number, sequence, mint);
        Ok(proposed)
    }

    /// Queries the migration manager for the number of migration
    /// transactions the first V2 block must carry.
    async fn migration_transactions_required(&mut self) -> Result<u64, DriverError> {
        let raw = self
            .l2_provider
            .call(self.chain.migration_manager, transactions_required_call())
            .await
            .map_err(|e| DriverError::Provider(e.to_string()))?;
        let value = U256::from_be_slice(&raw);
        value
            .try_into()
            .map_err(|_| DriverError::Provider("transactionsRequired out of range".to_string()))
    }

    /// Fatal check: the first V2 block must contain at least one successful
    /// system-address transaction.
    async fn check_migration_succeeded(&mut self, l2_number: u64) -> Result<(), DriverError> {
        let block = self
            .l2_provider
            .block_with_receipts(l2_number)
            .await
            .map_err(|e| DriverError::Provider(e.to_string()))?
            .ok_or_else(|| DriverError::Provider(format!("missing L2 block {l2_number}")))?;

        let succeeded = block
            .transactions
            .iter()
            .zip(&block.receipts)
            .any(|(tx, receipt)| tx.from == SYSTEM_ADDRESS && receipt.status);
        if succeeded {
            Ok(())
        } else {
            error!(target: "pipeline", l2 = l2_number, "no successful system transaction in migration block");
            Err(DriverError::SystemTxFailed { l2_block: l2_number })
        }
    }

    /// Walks back to the divergence point, truncates derived state, and
    /// repositions the cursor.
    async fn handle_reorg(&mut self, detected_at: u64) -> Result<(), DriverError> {
        let mut number = detected_at - 1;
        let divergence = loop {
            if number < self.chain.fork_block {
                return Err(DriverError::ReorgUnresolved { below: number });
            }
            let Some(stored) = self.store.l1_header(number)? else {
                break number;
            };
            let fresh = self
                .l1_provider
                .block_with_receipts(number)
                .await
                .map_err(|e| DriverError::Provider(e.to_string()))?
                .ok_or_else(|| DriverError::Provider(format!("missing L1 block {number}")))?;
            if fresh.header.hash == stored.hash {
                break number + 1;
            }
            number -= 1;
        };

        let removed = self.store.delete_l2_from_source(divergence)?;
        self.store.delete_l1_from(divergence)?;
        self.l1_provider.invalidate_from(divergence);
        self.prefetcher.invalidate_from(divergence);
        warn!(
            target: "pipeline",
            divergence,
            removed_l2_blocks = removed,
            "truncated after reorg; re-deriving"
        );

        match self.store.l2_head()? {
            Some(head) => {
                let record = self
                    .store
                    .l2_block(head)?
                    .ok_or_else(|| DriverError::Provider(format!("missing L2 record {head}")))?;
                self.cursor = SyncCursor::new(
                    record.info,
                    record.source_l1_number,
                    record.sequence_number,
                    record.mint,
                );
            }
            None => self.init().await?,
        }
        Ok(())
    }

    async fn l1_header_for(&mut self, number: u64) -> Result<L1Header, DriverError> {
        if let Some(header) = self.store.l1_header(number)? {
            return Ok(header);
        }
        let block = self
            .l1_provider
            .block_with_receipts(number)
            .await
            .map_err(|e| DriverError::Provider(e.to_string()))?
            .ok_or_else(|| DriverError::Provider(format!("missing L1 block {number}")))?;
        self.store.put_l1_header(&block.header)?;
        Ok(block.header)
    }
}
