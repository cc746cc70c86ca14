//! Orchestrated staking operations
//!
//! Every stake-changing write follows the same shape: read everything the
//! write depends on, replay the change against a fresh pool snapshot to get
//! list hints, then submit exactly once as the last step. A failed read
//! therefore never leaves a partial on-chain effect.
//!
//! Hints are only valid against the pool state they were simulated from. A
//! concurrent mutation by another account can make them stale; the contract
//! rejects such a submission and the caller has to re-run the operation.

use alloy_primitives::{Address, U256, U512};
use std::future::Future;
use tracing::{debug, info, warn, Instrument};

use super::StakeClient;
use crate::errors::{ClientError, ClientResult, StepContext};
use crate::metrics::recorder;
use crate::observability::OperationContext;
use crate::pool::{self, PoolEntry};
use crate::types::{SubmittedTx, TranscoderPoolHints};

/// Pool state a mutation is simulated against
struct PoolSnapshot {
    entries: Vec<PoolEntry>,
    is_full: bool,
}

impl PoolSnapshot {
    fn hints(&self, addr: Address, new_stake: U256) -> TranscoderPoolHints {
        let position = pool::simulate(addr, new_stake, &self.entries, self.is_full);
        debug!(
            transcoder = %addr,
            %new_stake,
            outcome = position.label(),
            "simulated pool update"
        );
        position.hints()
    }
}

fn add_stake(a: U256, b: U256) -> ClientResult<U256> {
    a.checked_add(b)
        .ok_or_else(|| ClientError::Arithmetic(format!("stake overflow: {} + {}", a, b)))
}

fn sub_stake(a: U256, b: U256) -> ClientResult<U256> {
    a.checked_sub(b)
        .ok_or_else(|| ClientError::Arithmetic(format!("stake underflow: {} - {}", a, b)))
}

fn widen(v: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(v.as_limbs());
    U512::from_limbs(limbs)
}

fn narrow(v: U512) -> Option<U256> {
    let limbs = v.as_limbs();
    if limbs[4..].iter().any(|&l| l != 0) {
        return None;
    }
    Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// `floor(mintable * stake / total_bonded)` with an exact 512-bit intermediate product
pub(crate) fn reward_share(mintable: U256, stake: U256, total_bonded: U256) -> ClientResult<U256> {
    if total_bonded.is_zero() {
        return Err(ClientError::NothingToMint);
    }
    let quotient = widen(mintable) * widen(stake) / widen(total_bonded);
    narrow(quotient).ok_or_else(|| {
        ClientError::Arithmetic(format!(
            "reward overflow: {} * {} / {}",
            mintable, stake, total_bonded
        ))
    })
}

impl StakeClient {
    /// Run an operation under its span and record how it ended
    async fn run_op<F>(&self, ctx: &OperationContext, op: F) -> ClientResult<SubmittedTx>
    where
        F: Future<Output = ClientResult<SubmittedTx>>,
    {
        let result = op.instrument(ctx.span()).await;
        if let Err(err) = &result {
            if err.is_precondition() {
                if let Some(m) = recorder() {
                    m.precondition_rejections.inc();
                }
                info!(op = ctx.operation, reason = %err, "operation not submitted");
            } else {
                warn!(
                    op = ctx.operation,
                    category = err.category(),
                    error = %err,
                    "operation failed"
                );
            }
        }
        result
    }

    async fn pool_snapshot(&self) -> ClientResult<PoolSnapshot> {
        let (transcoders, max_size) = self
            .transcoder_pool_with_max_size()
            .await
            .step("unable to get transcoder pool")?;

        Ok(PoolSnapshot {
            is_full: U256::from(transcoders.len()) == max_size,
            entries: transcoders.iter().map(PoolEntry::from).collect(),
        })
    }

    /// Register the active account as a transcoder
    pub async fn transcoder(&self, reward_cut: U256, fee_share: U256) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("transcoder");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let locked = c
                .rounds_manager
                .current_round_locked()
                .await
                .step("unable to get current round locked")?;
            if locked {
                return Err(ClientError::CurrentRoundLocked);
            }
            self.submit(&ctx, c.bonding_manager.transcoder(reward_cut, fee_share))
                .await
        })
        .await
    }

    pub async fn initialize_round(&self) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("initialize_round");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let initialized = c
                .rounds_manager
                .current_round_initialized()
                .await
                .step("unable to get current round initialized")?;
            if initialized {
                return Err(ClientError::RoundAlreadyInitialized);
            }
            self.submit(&ctx, c.rounds_manager.initialize_round()).await
        })
        .await
    }

    /// Bond `amount` to `to`, approving the bonding manager first if needed
    ///
    /// When switching delegates the caller's pending stake moves along with
    /// the new `amount`, so both the old and the new delegate's positions change.
    pub async fn bond(&self, amount: U256, to: Address) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("bond");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let sender = self.account();
            let spender = c.addresses.bonding_manager;

            let allowance = c
                .token
                .allowance(sender, spender)
                .await
                .step("unable to get allowance")?;

            // a bond submitted before the approval is mined reverts
            if allowance < amount {
                info!(%allowance, %amount, "approving bonding manager");
                let approve = ctx.child("approve");
                let tx = self
                    .submit(&approve, c.token.approve(spender, amount))
                    .await?;
                self.check_tx(&tx).await?;
            }

            let snapshot = self.pool_snapshot().await?;
            let delegator = self
                .get_delegator(sender)
                .await
                .step("unable to get delegator")?;

            let mut amount = amount;
            let mut old_hints = TranscoderPoolHints::default();
            let current = delegator.delegate_address;
            if current != to && !current.is_zero() {
                let round = c
                    .rounds_manager
                    .current_round()
                    .await
                    .step("unable to get current round")?;
                let pending = c
                    .bonding_manager
                    .pending_stake(sender, round)
                    .await
                    .step("unable to get pending stake")?;

                amount = add_stake(pending, amount)?;

                let old_total = self
                    .transcoder_total_stake(current)
                    .await
                    .step("unable to get old delegate total stake")?;
                // only the already-bonded part leaves the old delegate
                old_hints = snapshot.hints(current, sub_stake(old_total, pending)?);
            }

            let to_total = self
                .transcoder_total_stake(to)
                .await
                .step("unable to get delegate total stake")?;
            let new_hints = snapshot.hints(to, add_stake(to_total, amount)?);

            self.submit(
                &ctx,
                c.bonding_manager.bond_with_hint(
                    amount,
                    to,
                    old_hints.pos_prev,
                    old_hints.pos_next,
                    new_hints.pos_prev,
                    new_hints.pos_next,
                ),
            )
            .await
        })
        .await
    }

    pub async fn unbond(&self, amount: U256) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("unbond");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let delegator = self
                .get_delegator(self.account())
                .await
                .step("unable to get delegator")?;
            let snapshot = self.pool_snapshot().await?;
            let total = self
                .transcoder_total_stake(delegator.delegate_address)
                .await
                .step("unable to get delegate total stake")?;

            let hints = snapshot.hints(delegator.delegate_address, sub_stake(total, amount)?);
            self.submit(
                &ctx,
                c.bonding_manager
                    .unbond_with_hint(amount, hints.pos_prev, hints.pos_next),
            )
            .await
        })
        .await
    }

    /// Move an unbonding lock's stake back to the current delegate
    pub async fn rebond(&self, lock_id: U256) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("rebond");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let sender = self.account();
            let delegator = self
                .get_delegator(sender)
                .await
                .step("unable to get delegator")?;
            let snapshot = self.pool_snapshot().await?;
            let lock = self
                .get_delegator_unbonding_lock(sender, lock_id)
                .await
                .step("unable to get unbonding lock")?;
            let total = self
                .transcoder_total_stake(delegator.delegate_address)
                .await
                .step("unable to get delegate total stake")?;

            let hints = snapshot.hints(delegator.delegate_address, add_stake(total, lock.amount)?);
            self.submit(
                &ctx,
                c.bonding_manager
                    .rebond_with_hint(lock_id, hints.pos_prev, hints.pos_next),
            )
            .await
        })
        .await
    }

    /// Rebond a lock of a fully unbonded delegator to `to`
    pub async fn rebond_from_unbonded(
        &self,
        to: Address,
        lock_id: U256,
    ) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("rebond_from_unbonded");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let snapshot = self.pool_snapshot().await?;
            let total = self
                .transcoder_total_stake(to)
                .await
                .step("unable to get delegate total stake")?;
            let lock = self
                .get_delegator_unbonding_lock(self.account(), lock_id)
                .await
                .step("unable to get unbonding lock")?;

            let hints = snapshot.hints(to, add_stake(total, lock.amount)?);
            self.submit(
                &ctx,
                c.bonding_manager.rebond_from_unbonded_with_hint(
                    to,
                    lock_id,
                    hints.pos_prev,
                    hints.pos_next,
                ),
            )
            .await
        })
        .await
    }

    /// Claim this round's inflationary reward as the active transcoder
    pub async fn reward(&self) -> ClientResult<SubmittedTx> {
        let ctx = OperationContext::new("reward");
        self.run_op(&ctx, async {
            let c = self.contracts()?;
            let addr = self.account();

            let round = c
                .rounds_manager
                .current_round()
                .await
                .step("unable to get current round")?;
            let earnings = self
                .get_transcoder_earnings_pool_for_round(addr, round)
                .await
                .step("unable to get earnings pool")?;
            let mintable = c
                .minter
                .current_mintable_tokens()
                .await
                .step("unable to get current mintable tokens")?;
            let total_bonded = c
                .bonding_manager
                .get_total_bonded()
                .await
                .step("unable to get total bonded")?;

            let reward = reward_share(mintable, earnings.total_stake, total_bonded)?;
            debug!(%round, %mintable, %total_bonded, %reward, "computed reward");

            let snapshot = self.pool_snapshot().await?;
            let hints = snapshot.hints(addr, add_stake(earnings.total_stake, reward)?);
            self.submit(
                &ctx,
                c.bonding_manager
                    .reward_with_hint(hints.pos_prev, hints.pos_next),
            )
            .await
        })
        .await
    }

    pub async fn withdraw_stake(&self, lock_id: U256) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("withdraw_stake"),
            c.bonding_manager.withdraw_stake(lock_id),
        )
        .await
    }

    pub async fn withdraw_fees(&self) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("withdraw_fees"),
            c.bonding_manager.withdraw_fees(),
        )
        .await
    }

    pub async fn claim_earnings(&self, end_round: U256) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("claim_earnings"),
            c.bonding_manager.claim_earnings(end_round),
        )
        .await
    }
}
