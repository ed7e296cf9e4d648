//! The tick loop.
//!
//! Per tick: freeze the world, drain each agent's inbox, run every
//! live agent's update in ascending id order (sequentially, or on a
//! worker pool when `num_workers > 0`), apply the collected actions in
//! id order, flush the message bus, and advance the tick counter. The
//! scheduler never aborts on a single-agent failure; failing agents
//! are isolated in `error` status and the loop continues.
//!
//! Parallel mode preserves determinism: agents draw from their own
//! forked streams, read only the frozen world, and their actions are
//! merged back in id order before application.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ax_common::{AgentId, Error, Result, RunId};
use ax_config::Settings;
use ax_telemetry::schema::{ActionRecord, EventRecord, TickRecord, TracePayload, TraceRecord};
use ax_telemetry::TraceWriter;

use crate::agent::{AgentSpec, AgentTickOutput, StateSummary, Status};
use crate::events::{event_names, FanoutEmitter, Phase, ProgressEvent};
use crate::sched::AgentRegistry;
use crate::world::{Action, Message, MessageBus, WorldProvider};

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed_ms: u64,
    pub agents_updated: usize,
    pub actions_applied: usize,
    pub messages_delivered: usize,
    pub errors: usize,
}

/// Summary of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub ticks: u64,
    pub stopped_early: bool,
}

/// Owns the registry and drives the population in lockstep.
pub struct Scheduler {
    settings: Settings,
    registry: AgentRegistry,
    world: Box<dyn WorldProvider>,
    bus: Box<dyn MessageBus>,
    emitter: FanoutEmitter,
    trace: Option<TraceWriter>,
    run_id: RunId,
    tick: u64,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        settings: Settings,
        world: Box<dyn WorldProvider>,
        bus: Box<dyn MessageBus>,
    ) -> Self {
        Scheduler {
            settings,
            registry: AgentRegistry::new(),
            world,
            bus,
            emitter: FanoutEmitter::new(),
            trace: None,
            run_id: RunId::generate(),
            tick: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn emitter_mut(&mut self) -> &mut FanoutEmitter {
        &mut self.emitter
    }

    /// Attach a telemetry trace writer.
    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Cooperative stop signal; honored at the next suspension point.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    // ------------------------------------------------------------------
    // Factory / registry surface
    // ------------------------------------------------------------------

    /// Create and register an agent, placing it in the world.
    pub fn create(&mut self, spec: &AgentSpec) -> Result<AgentId> {
        let id = self.registry.create(spec, &self.settings)?;
        let position = self.registry.get(id)?.record.position;
        self.world.register_agent(id, position);
        info!(agent = %id, preset = %spec.preset, "agent created");
        Ok(id)
    }

    /// Adopt a restored agent.
    pub fn adopt(&mut self, agent: crate::agent::CognitiveAgent) -> AgentId {
        let position = agent.record.position;
        let id = self.registry.adopt(agent);
        self.world.register_agent(id, position);
        id
    }

    /// Bring an agent out of `offline` or `error`.
    pub fn start(&mut self, id: AgentId) -> Result<()> {
        let agent = self.registry.get_mut(id)?;
        match agent.status() {
            Status::Offline => agent.restart(),
            Status::Error => agent.reset(),
            _ => Ok(()),
        }
    }

    /// Park an agent in `offline`; it is skipped until resumed.
    pub fn pause(&mut self, id: AgentId) -> Result<()> {
        self.registry.get_mut(id)?.go_offline()
    }

    /// Resume a paused agent.
    pub fn resume(&mut self, id: AgentId) -> Result<()> {
        self.registry.get_mut(id)?.restart()
    }

    /// Retire an agent entirely, releasing its state.
    pub fn stop_agent(&mut self, id: AgentId) -> Result<()> {
        self.registry.retire(id)?;
        self.world.remove_agent(id);
        Ok(())
    }

    pub fn get_state(&self, id: AgentId) -> Result<StateSummary> {
        Ok(self.registry.get(id)?.summary())
    }

    pub fn summaries(&self) -> Vec<StateSummary> {
        self.registry.iter().map(|(_, a)| a.summary()).collect()
    }

    /// Persist every agent through a store.
    pub fn save_all(&self, store: &mut dyn crate::world::PersistenceStore) -> Result<usize> {
        let mut saved = 0;
        for (_, agent) in self.registry.iter() {
            store.save_agent(&agent.persist())?;
            saved += 1;
        }
        Ok(saved)
    }

    /// Replay every agent's episodic memory through one batch EM pass.
    ///
    /// Returns the total number of experiences replayed across the
    /// population.
    pub fn batch_learn(&mut self) -> Result<usize> {
        let mut total = 0;
        for (id, agent) in self.registry.iter_mut() {
            let replayed = agent.batch_learn()?;
            if replayed > 0 {
                debug!(agent = %id, replayed, "batch learning pass");
            }
            total += replayed;
        }
        Ok(total)
    }

    /// Restore every agent a store knows about.
    pub fn load_all(&mut self, store: &dyn crate::world::PersistenceStore) -> Result<usize> {
        let mut loaded = 0;
        for id in store.list_agents()? {
            let snapshot = store.load_agent(id)?;
            let agent = crate::agent::CognitiveAgent::restore(snapshot, &self.settings)?;
            self.adopt(agent);
            loaded += 1;
        }
        Ok(loaded)
    }

    // ------------------------------------------------------------------
    // The tick loop
    // ------------------------------------------------------------------

    /// Advance the whole population by one tick.
    pub fn tick(&mut self) -> Result<TickReport> {
        let started = Instant::now();
        let tick = self.tick + 1;
        self.emitter
            .emit(ProgressEvent::new(event_names::TICK_STARTED, Phase::Snapshot).with_tick(tick));

        // 1. Freeze the world: no mutation until action application.
        let ids = self.registry.ids();

        // 2. Deliver this tick's inboxes.
        let mut inboxes: BTreeMap<AgentId, Vec<Message>> = BTreeMap::new();
        let mut delivered = 0;
        for &id in &ids {
            let inbox = self.bus.drain(id);
            delivered += inbox.len();
            inboxes.insert(id, inbox);
        }

        // 3. Update every live agent in id order.
        let budget = (self.settings.scheduler.agent_budget_ms > 0)
            .then(|| Duration::from_millis(self.settings.scheduler.agent_budget_ms));
        let outputs = if self.settings.scheduler.num_workers > 1 {
            self.update_parallel(tick, &mut inboxes, budget)
        } else {
            self.update_sequential(tick, &mut inboxes, budget)
        };

        // 4. Apply actions in id order; the world mutates only here.
        let mut actions_applied = 0;
        let mut errors = 0;
        let mut trace_rows: Vec<TracePayload> = Vec::new();
        for (id, output) in &outputs {
            for warning in &output.warnings {
                trace_rows.push(TracePayload::Event(EventRecord {
                    tick,
                    agent: Some(*id),
                    code: 0,
                    category: "warning".into(),
                    message: warning.clone(),
                    recoverable: true,
                }));
            }
            if output.status == Status::Error {
                errors += 1;
                self.emitter.emit(
                    ProgressEvent::new(event_names::AGENT_ERROR, Phase::Update)
                        .with_tick(tick)
                        .with_agent(id),
                );
                continue;
            }
            match self.apply_action(*id, &output.action, tick) {
                Ok(success) => {
                    actions_applied += 1;
                    trace_rows.push(TracePayload::Action(ActionRecord {
                        tick,
                        agent: *id,
                        action: output.action.name().into(),
                        success,
                        failure_reason: None,
                    }));
                }
                Err(err) => {
                    // Collaborator failure: surface it, keep the agent.
                    errors += 1;
                    warn!(agent = %id, error = %err, "action application failed");
                    trace_rows.push(TracePayload::Event(EventRecord {
                        tick,
                        agent: Some(*id),
                        code: err.code(),
                        category: err.category().to_string(),
                        message: err.to_string(),
                        recoverable: err.is_recoverable(),
                    }));
                }
            }
        }

        // 5. Messages sent this tick become visible next tick.
        self.bus.flush(&ids);
        self.world.end_tick();
        self.tick = tick;

        let report = TickReport {
            tick,
            elapsed_ms: started.elapsed().as_millis() as u64,
            agents_updated: outputs.len(),
            actions_applied,
            messages_delivered: delivered,
            errors,
        };
        self.write_trace(&report, trace_rows)?;
        self.emitter.emit(
            ProgressEvent::new(event_names::TICK_COMPLETE, Phase::Apply)
                .with_tick(tick)
                .with_detail("actions", actions_applied as u64)
                .with_detail("errors", errors as u64),
        );
        Ok(report)
    }

    /// Drive the loop at the configured rate for `ticks` ticks (or
    /// until stopped when `None`).
    pub fn run(&mut self, ticks: Option<u64>) -> Result<RunReport> {
        self.emitter
            .emit(ProgressEvent::new(event_names::RUN_STARTED, Phase::Run));
        let interval = Duration::from_millis(self.settings.scheduler.tick_ms);
        let mut completed = 0;
        let mut stopped_early = false;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                stopped_early = true;
                break;
            }
            if let Some(limit) = ticks {
                if completed >= limit {
                    break;
                }
            }
            let started = Instant::now();
            self.tick()?;
            completed += 1;
            let elapsed = started.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.emitter.emit(
            ProgressEvent::new(event_names::RUN_STOPPED, Phase::Run)
                .with_detail("ticks", completed),
        );
        if let Some(trace) = self.trace.as_mut() {
            trace.flush().map_err(|e| Error::Persistence(e.to_string()))?;
        }
        Ok(RunReport {
            run_id: self.run_id.to_string(),
            ticks: completed,
            stopped_early,
        })
    }

    fn update_sequential(
        &mut self,
        tick: u64,
        inboxes: &mut BTreeMap<AgentId, Vec<Message>>,
        budget: Option<Duration>,
    ) -> Vec<(AgentId, AgentTickOutput)> {
        let world = self.world.as_ref();
        let stop = &self.stop;
        let mut outputs = Vec::new();
        for (&id, agent) in self.registry.iter_mut() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if matches!(agent.status(), Status::Offline) {
                continue;
            }
            let inbox = inboxes.remove(&id).unwrap_or_default();
            let deadline = budget.map(|b| Instant::now() + b);
            let output = agent.update(world, inbox, tick, deadline);
            debug!(agent = %id, action = output.action.name(), status = %output.status, "agent updated");
            outputs.push((id, output));
        }
        outputs
    }

    fn update_parallel(
        &mut self,
        tick: u64,
        inboxes: &mut BTreeMap<AgentId, Vec<Message>>,
        budget: Option<Duration>,
    ) -> Vec<(AgentId, AgentTickOutput)> {
        let world = self.world.as_ref();
        let workers = self.settings.scheduler.num_workers;
        let mut slots: Vec<(AgentId, &mut crate::agent::CognitiveAgent, Vec<Message>)> = self
            .registry
            .iter_mut()
            .filter(|(_, agent)| !matches!(agent.status(), Status::Offline))
            .map(|(&id, agent)| {
                let inbox = inboxes.remove(&id).unwrap_or_default();
                (id, agent, inbox)
            })
            .collect();

        let mut outputs: Vec<(AgentId, AgentTickOutput)> = std::thread::scope(|scope| {
            let mut handles = Vec::new();
            let chunk_size = slots.len().div_ceil(workers).max(1);
            for chunk in slots.chunks_mut(chunk_size) {
                handles.push(scope.spawn(move || {
                    let mut out = Vec::with_capacity(chunk.len());
                    for (id, agent, inbox) in chunk {
                        let deadline = budget.map(|b| Instant::now() + b);
                        let output =
                            agent.update(world, std::mem::take(inbox), tick, deadline);
                        out.push((*id, output));
                    }
                    out
                }));
            }
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("worker panicked"))
                .collect()
        });
        // Merge back into id order so application stays deterministic.
        outputs.sort_by_key(|(id, _)| *id);
        outputs
    }

    /// Apply one agent's action to the world and route communications.
    fn apply_action(&mut self, id: AgentId, action: &Action, tick: u64) -> Result<bool> {
        if let Action::Communicate { to, kind, payload } = action {
            self.bus.send(Message {
                id: format!("{}-{}-{}", self.run_id, id, tick),
                from: id,
                to: *to,
                kind: *kind,
                payload: payload.clone(),
                tick,
            })?;
        }
        let outcome = self.world.apply_action(id, action)?;
        let agent = self.registry.get_mut(id)?;
        agent.apply_outcome(action, &outcome);
        self.emitter.emit(
            ProgressEvent::new(event_names::ACTION_APPLIED, Phase::Apply)
                .with_tick(tick)
                .with_agent(id)
                .with_detail("action", action.name())
                .with_detail("success", outcome.success),
        );
        Ok(outcome.success)
    }

    fn write_trace(&mut self, report: &TickReport, rows: Vec<TracePayload>) -> Result<()> {
        let Some(trace) = self.trace.as_mut() else {
            return Ok(());
        };
        let run_id = self.run_id.to_string();
        trace
            .append(&TraceRecord::new(
                &run_id,
                TracePayload::Tick(TickRecord {
                    tick: report.tick,
                    elapsed_ms: report.elapsed_ms,
                    agents_updated: report.agents_updated,
                    actions_applied: report.actions_applied,
                    messages_delivered: report.messages_delivered,
                    errors: report.errors,
                }),
            ))
            .map_err(|e| Error::Persistence(e.to_string()))?;
        for payload in rows {
            trace
                .append(&TraceRecord::new(&run_id, payload))
                .map_err(|e| Error::Persistence(e.to_string()))?;
        }
        trace.flush().map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}
