//! Cast executor: the state machine driving a batch of spells as one atomic unit.
//!
//! Each execution frame walks its spells strictly in list order:
//!
//! ```text
//! Idle → Resolving(i) → Invoking(i) → Resolving(i + 1) | Reverting | Done
//! ```
//!
//! A frame takes a ledger checkpoint when it starts. If any spell fails, the frame reverts to that
//! checkpoint, which also undoes everything nested frames spawned by earlier spells did, and
//! reports the failing index together with the reason. Nested frames (e.g. the inside of a flash
//! borrow) run through the same state machine one level deeper.

use alloy_primitives::Address;
use dsa_common::{
    codec,
    errors::{CastError, SpellError},
    ledger::Ledger,
    models::{CastReceipt, ExecutionRecord, FrameRecord, Spell, SpellRecord},
    relay::RelayRegister,
};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::{
    config::ExecutorConfig,
    context::AccountContext,
    registry::{ModuleHandle, ModuleRegistry},
};

#[derive(Debug)]
enum FrameState {
    Idle,
    Resolving(usize),
    Invoking(usize, ModuleHandle),
    Reverting(usize, SpellError),
    Done,
}

#[derive(Debug)]
pub struct CastExecutor<'r> {
    registry: &'r ModuleRegistry,
    config: ExecutorConfig,
}

impl<'r> CastExecutor<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self::with_config(registry, ExecutorConfig::default())
    }

    pub fn with_config(registry: &'r ModuleRegistry, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.registry
    }

    /// Executes `spells` in order as `account`, all or nothing.
    ///
    /// `origin` is recorded for attribution only. On success every effect is committed to the
    /// ledger and a receipt with the records of the whole cast tree is returned. On failure the
    /// ledger is left exactly as it was before the call.
    #[instrument(skip_all, fields(%account, %origin, spells = spells.len()))]
    pub fn cast(
        &self,
        ledger: &mut Ledger,
        account: Address,
        spells: &[Spell],
        origin: Address,
    ) -> Result<CastReceipt, CastError> {
        let cast_id = Uuid::new_v4();
        let checkpoint = ledger.checkpoint();
        let mut relay = RelayRegister::new();
        let mut records = Vec::new();
        let result = {
            let mut ctx = AccountContext::new(
                self,
                &mut *ledger,
                &mut relay,
                &mut records,
                account,
                origin,
                cast_id,
            );
            self.run_frame(&mut ctx, spells)
        };

        match result {
            Ok(frame) => {
                ledger.commit(checkpoint);
                info!(%cast_id, modules = ?frame.modules, "Cast committed");
                Ok(CastReceipt { cast_id, account, origin, records })
            }
            Err(err) => {
                ledger.revert_to(checkpoint);
                warn!(%cast_id, error = %err, "Cast reverted");
                Err(err)
            }
        }
    }

    /// Tries `candidates` in order and commits the first one that succeeds.
    ///
    /// Used when several equivalent routes are offered and only one needs to go through. Effects
    /// of failed candidates, relay writes included, are discarded before the next one runs.
    #[instrument(skip_all, fields(%account, %origin, candidates = candidates.len()))]
    pub fn cast_first_success(
        &self,
        ledger: &mut Ledger,
        account: Address,
        candidates: &[Spell],
        origin: Address,
    ) -> Result<CastReceipt, CastError> {
        let cast_id = Uuid::new_v4();
        let checkpoint = ledger.checkpoint();
        let mut relay = RelayRegister::new();
        let mut records = Vec::new();
        let result = {
            let mut ctx = AccountContext::new(
                self,
                &mut *ledger,
                &mut relay,
                &mut records,
                account,
                origin,
                cast_id,
            );
            self.run_first_success(&mut ctx, candidates)
        };

        match result {
            Ok(frame) => {
                ledger.commit(checkpoint);
                info!(%cast_id, modules = ?frame.modules, "First-success cast committed");
                Ok(CastReceipt { cast_id, account, origin, records })
            }
            Err(err) => {
                ledger.revert_to(checkpoint);
                warn!(%cast_id, error = %err, "First-success cast reverted");
                Err(err)
            }
        }
    }

    /// Drives one execution frame to `Done` or `Reverting`.
    pub(crate) fn run_frame(
        &self,
        ctx: &mut AccountContext<'_>,
        spells: &[Spell],
    ) -> Result<FrameRecord, CastError> {
        let depth = ctx.depth();
        if spells.is_empty() {
            return Err(CastError::frame(depth, SpellError::EmptyBatch));
        }
        let checkpoint = ctx.checkpoint();
        let mut modules = Vec::with_capacity(spells.len());
        let mut state = FrameState::Idle;

        loop {
            trace!(depth, ?state, "Frame transition");
            state = match state {
                FrameState::Idle => FrameState::Resolving(0),
                FrameState::Resolving(index) => match self.resolve(&spells[index]) {
                    Ok(handle) => FrameState::Invoking(index, handle),
                    Err(error) => FrameState::Reverting(index, error),
                },
                FrameState::Invoking(index, handle) => {
                    let spell = &spells[index];
                    match self.invoke(ctx, index, spell, &handle) {
                        Ok(()) => {
                            modules.push(spell.module().to_string());
                            if index + 1 == spells.len() {
                                FrameState::Done
                            } else {
                                FrameState::Resolving(index + 1)
                            }
                        }
                        Err(error) => FrameState::Reverting(index, error),
                    }
                }
                FrameState::Reverting(index, error) => {
                    ctx.rollback(checkpoint);
                    let frame = FrameRecord {
                        cast_id: ctx.cast_id(),
                        depth,
                        origin: ctx.origin(),
                        spell_count: spells.len(),
                        success: false,
                        failing_index: Some(index),
                        modules,
                    };
                    warn!(?frame, error = %error, "Frame reverted");
                    return Err(CastError::spell(depth, index, &spells[index], error));
                }
                FrameState::Done => {
                    let frame = FrameRecord {
                        cast_id: ctx.cast_id(),
                        depth,
                        origin: ctx.origin(),
                        spell_count: spells.len(),
                        success: true,
                        failing_index: None,
                        modules,
                    };
                    debug!(?frame, "Frame done");
                    ctx.commit(checkpoint);
                    ctx.push_record(ExecutionRecord::Frame(frame.clone()));
                    return Ok(frame);
                }
            };
        }
    }

    /// First-success mode of a frame: every candidate runs under its own rollback boundary and
    /// the first one to succeed ends the frame.
    pub(crate) fn run_first_success(
        &self,
        ctx: &mut AccountContext<'_>,
        candidates: &[Spell],
    ) -> Result<FrameRecord, CastError> {
        let depth = ctx.depth();
        if candidates.is_empty() {
            return Err(CastError::frame(depth, SpellError::EmptyBatch));
        }
        let mut failures = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let checkpoint = ctx.checkpoint();
            let relay = ctx.relay().snapshot();
            let attempt = self
                .resolve(candidate)
                .and_then(|handle| self.invoke(ctx, index, candidate, &handle));
            match attempt {
                Ok(()) => {
                    let frame = FrameRecord {
                        cast_id: ctx.cast_id(),
                        depth,
                        origin: ctx.origin(),
                        spell_count: candidates.len(),
                        success: true,
                        failing_index: None,
                        modules: vec![candidate.module().to_string()],
                    };
                    debug!(index, discarded = failures.len(), "Candidate committed");
                    ctx.commit(checkpoint);
                    ctx.push_record(ExecutionRecord::Frame(frame.clone()));
                    return Ok(frame);
                }
                Err(error) => {
                    ctx.rollback(checkpoint);
                    ctx.relay().restore(relay);
                    debug!(index, error = %error, "Candidate failed, trying next");
                    failures.push(CastError::spell(depth, index, candidate, error));
                }
            }
        }

        Err(CastError::frame(depth, SpellError::AllCandidatesFailed(failures)))
    }

    fn resolve(&self, spell: &Spell) -> Result<ModuleHandle, SpellError> {
        self.registry
            .resolve(spell.module())
            .cloned()
            .map_err(|_| SpellError::UnknownModule(spell.module().to_string()))
    }

    fn invoke(
        &self,
        ctx: &mut AccountContext<'_>,
        index: usize,
        spell: &Spell,
        handle: &ModuleHandle,
    ) -> Result<(), SpellError> {
        let payload = codec::encode_spell(spell);
        let module = handle.module();
        if !module.supports(&payload.selector) {
            return Err(SpellError::BadSignature {
                module: spell.module().to_string(),
                signature: payload.signature,
            });
        }

        let raw = module.invoke(&payload, ctx)?;
        let outcome = codec::decode(&raw);
        let record = SpellRecord {
            depth: ctx.depth(),
            index,
            module: payload.module,
            operation: payload.operation,
            selector: payload.selector,
            relay: ctx.relay().take_accesses(),
            diagnostic: outcome.diagnostic,
        };
        debug!(
            depth = record.depth,
            index,
            module = %record.module,
            operation = %record.operation,
            relay = ?record.relay_ids(),
            "Spell invoked"
        );
        ctx.push_record(ExecutionRecord::Spell(record));
        Ok(())
    }
}
