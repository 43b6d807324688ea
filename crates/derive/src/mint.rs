//! The fee-collateralized issuance controller.
//!
//! The native asset is minted in proportion to L1 data gas burned, subject
//! to a per-period quota, multiplicative rate adjustment, and halving
//! thresholds tied to cumulative supply. All arithmetic is integer; division
//! floors. Given identical inputs the controller is bit-for-bit
//! reproducible.

use crate::types::DerivedTx;
use alloy_primitives::U256;
use tracing::debug;

/// The immutable issuance schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintSchedule {
    /// Target number of blocks per adjustment period.
    pub adjustment_period: u64,
    /// Target number of blocks per halving.
    pub halving_blocks: u64,
    /// The supply cap, in wei-equivalent units.
    pub max_supply: U256,
    /// The floor on the mint rate.
    pub min_rate: u128,
    /// The ceiling on the mint rate.
    pub max_rate: u128,
}

impl Default for MintSchedule {
    fn default() -> Self {
        Self {
            adjustment_period: 500,
            halving_blocks: 2_628_000,
            max_supply: U256::from(1_500_000_000u64)
                * U256::from(10u64).pow(U256::from(18u64)),
            min_rate: 1,
            max_rate: u128::MAX,
        }
    }
}

impl MintSchedule {
    /// The number of adjustment periods in one halving interval.
    pub const fn periods_per_halving(&self) -> u64 {
        self.halving_blocks / self.adjustment_period
    }

    /// The number of halvings the given cumulative supply has crossed:
    /// `floor(log2(max_supply / (max_supply - total)))`, capped once the
    /// supply is exhausted.
    pub fn halving_level(&self, total_minted: U256) -> u32 {
        if total_minted >= self.max_supply {
            return 128;
        }
        let mut level = 0u32;
        let mut threshold = self.max_supply >> 1;
        let mut crossed = threshold;
        while total_minted >= crossed && level < 128 {
            threshold >>= 1;
            crossed += threshold;
            level += 1;
        }
        level
    }
}

/// The issuance state carried from block to block inside the L1-attributes
/// system transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MintState {
    /// Cumulative supply minted.
    pub total_minted: U256,
    /// The block that opened the current adjustment period.
    pub period_start_block: u64,
    /// The amount minted within the current period.
    pub period_minted: U256,
    /// The current mint rate, in asset units per wei burned.
    pub mint_rate: u128,
    /// The unhalved per-period target fixed at the fork bootstrap.
    pub initial_target_per_period: U256,
}

impl MintState {
    /// Computes the state at the fork block from pre-fork history.
    ///
    /// `historical_total` is the sum minted over all pre-fork periods.
    /// `prev_rate_per_gas` is the pre-fork rate in asset units per gas unit;
    /// dividing by the previous block's base fee converts it to units per
    /// wei burned.
    pub fn bootstrap(
        schedule: &MintSchedule,
        historical_total: U256,
        prev_rate_per_gas: u128,
        prev_base_fee: u128,
        fork_block: u64,
    ) -> Self {
        let periods = U256::from(schedule.periods_per_halving().max(1));
        let idealized: U256 = (schedule.max_supply >> 1) / periods;
        let remaining = schedule.max_supply.saturating_sub(historical_total);
        let target = idealized.max(remaining / periods);

        let rate = prev_rate_per_gas / prev_base_fee.max(1);
        Self {
            total_minted: historical_total,
            period_start_block: fork_block,
            period_minted: U256::ZERO,
            mint_rate: rate.clamp(schedule.min_rate, schedule.max_rate),
            initial_target_per_period: target,
        }
    }
}

/// Drives the [MintState] through one block at a time.
#[derive(Debug)]
pub struct MintController<'a> {
    schedule: &'a MintSchedule,
    state: MintState,
    current_target: U256,
}

impl<'a> MintController<'a> {
    /// Creates a controller over the given carried state. The rate is held
    /// within the schedule bounds regardless of what the carried state says.
    pub fn new(schedule: &'a MintSchedule, mut state: MintState) -> Self {
        state.mint_rate = state.mint_rate.clamp(schedule.min_rate, schedule.max_rate);
        let current_target = Self::target_for(schedule, &state, false);
        Self { schedule, state, current_target }
    }

    /// The per-period target for the given state. At the fork-boot block the
    /// stored initial target applies unhalved.
    fn target_for(schedule: &MintSchedule, state: &MintState, fork_boot: bool) -> U256 {
        if fork_boot {
            return state.initial_target_per_period;
        }
        state.initial_target_per_period >> (schedule.halving_level(state.total_minted) as usize)
    }

    /// Returns the carried state.
    pub const fn state(&self) -> &MintState {
        &self.state
    }

    /// Consumes the controller, returning the carried state.
    pub fn into_state(self) -> MintState {
        self.state
    }

    /// Processes one block's transactions: assigns mints, closes quotas, and
    /// applies the end-of-block rate check.
    pub fn process_block(
        &mut self,
        block_number: u64,
        l1_base_fee: u128,
        txs: &mut [DerivedTx],
        fork_boot: bool,
    ) {
        // Halving is sampled at the start of each block.
        self.current_target = Self::target_for(self.schedule, &self.state, fork_boot);

        for tx in txs.iter_mut() {
            let mut burn = U256::from(tx.data_gas()) * U256::from(l1_base_fee);
            while !burn.is_zero() && self.state.total_minted < self.schedule.max_supply {
                let quota = self.current_target.saturating_sub(self.state.period_minted);
                if quota.is_zero() {
                    self.close_period_on_quota(block_number);
                    if self.current_target.is_zero() {
                        break;
                    }
                    continue;
                }

                let rate = U256::from(self.state.mint_rate);
                let supply_remaining =
                    self.schedule.max_supply - self.state.total_minted;
                let mint = (burn * rate).min(quota).min(supply_remaining);

                tx.add_mint(mint);
                self.state.period_minted += mint;
                self.state.total_minted += mint;
                burn -= (mint / rate).min(burn);

                if self.state.period_minted == self.current_target {
                    self.close_period_on_quota(block_number);
                }
            }
        }

        // A period that outlived its target length ends by time.
        if block_number.saturating_sub(self.state.period_start_block)
            >= self.schedule.adjustment_period
        {
            self.close_period_on_time(block_number);
        }
    }

    /// Closes a period whose quota filled. The faster it filled, the harder
    /// the rate drops, bounded at a quarter of its prior value.
    fn close_period_on_quota(&mut self, block_number: u64) {
        let elapsed = block_number.saturating_sub(self.state.period_start_block);
        let rate = self.state.mint_rate;
        let scaled = (U256::from(rate) * U256::from(elapsed)
            / U256::from(self.schedule.adjustment_period))
        .min(U256::from(rate))
        .to::<u128>();
        let floor = rate / 4;
        self.state.mint_rate =
            scaled.max(floor).clamp(self.schedule.min_rate, self.schedule.max_rate);

        debug!(
            target: "mint",
            elapsed,
            old_rate = rate,
            new_rate = self.state.mint_rate,
            "period quota closed"
        );
        self.start_new_period(block_number);
    }

    /// Closes a period that ran out of blocks. The further it fell short of
    /// its target, the harder the rate rises, bounded at four times its
    /// prior value.
    fn close_period_on_time(&mut self, block_number: u64) {
        let rate = U256::from(self.state.mint_rate);
        let quadrupled = rate.saturating_mul(U256::from(4u64));
        let scaled = if self.state.period_minted.is_zero() {
            quadrupled
        } else {
            (rate * self.current_target / self.state.period_minted)
                .max(rate)
                .min(quadrupled)
        };
        let capped = scaled.min(U256::from(u128::MAX)).to::<u128>();
        self.state.mint_rate = capped.clamp(self.schedule.min_rate, self.schedule.max_rate);

        debug!(
            target: "mint",
            period_minted = %self.state.period_minted,
            new_rate = self.state.mint_rate,
            "period ended by time"
        );
        self.start_new_period(block_number);
    }

    /// Opens a new period at the given block and resamples the halved
    /// target.
    fn start_new_period(&mut self, block_number: u64) {
        self.state.period_start_block = block_number;
        self.state.period_minted = U256::ZERO;
        self.current_target = Self::target_for(self.schedule, &self.state, false);
    }
}
