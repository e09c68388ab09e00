// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The machine registry (§4.2): admission, routing, rehydration, eviction,
//! and the glue between an [`FsmInstance`] and the timeout manager and
//! persistence provider that surround it.

use crate::admission::AdmissionControl;
use crate::config::{RegistryConfig, SaveMode};
use crate::error::{AdmissionError, CreateOrGetError};
use crate::events::RegistryEvent;
use crate::factory::MachineFactory;
use crate::handle::MachineHandle;
use crate::machine::ManagedMachine;

use chrono::Utc;
use dashmap::DashMap;
use machina_core::{Event, GraphHydrate, GraphNode, MachineId, PersistentContext};
use machina_engine::{
    FireError as EngineFireError, FireOutcome as EngineFireOutcome, FsmDefinition, FsmInstance,
    StateTimeout, CREATION_EVENT_KIND,
};
use machina_storage::{GraphSchema, LoadedGraph, PersistenceProvider, SaveRequest, StorageError};
use machina_timeout::{Scheduler, TimeoutManager, TokioScheduler};
use machina_wire::ListenerEventKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

/// Event name used to deliver a state's elapsed deadline (§4.3). FSM
/// authors declare a transition on this event name from any state that
/// also declares `.timeout(..)`, the same way any other event is handled —
/// the registry knows nothing about what that transition does, only that
/// it must fire this name when a deadline elapses.
pub const TIMEOUT_EVENT_KIND: &str = "__timeout__";

/// The resident machine table plus the collaborators every `fire` call
/// threads through: admission control, the timeout manager, and a
/// persistence provider routed through a [`GraphSchema`].
///
/// Generic over the scheduler backing its [`TimeoutManager`] so tests can
/// substitute `ManualScheduler` for deterministic deadline advancement;
/// production code uses the default, [`TokioScheduler`].
pub struct Registry<C, V, P, S = TokioScheduler>
where
    S: Scheduler,
{
    definition: Arc<FsmDefinition<C, P>>,
    persistence: Arc<dyn PersistenceProvider>,
    graph_schema: GraphSchema,
    timeout: Arc<TimeoutManager<S>>,
    active: DashMap<MachineId, Arc<AsyncMutex<ManagedMachine<C, V, P>>>>,
    admission: AdmissionControl,
    /// Serializes only the cold-start path (persistence load + admit/rehydrate)
    /// for a given id so two concurrent first-arrival events for the same
    /// brand-new machine cannot both win admission and double-construct it.
    /// Already-resident lookups never take this lock.
    admission_lock: AsyncMutex<()>,
    events: broadcast::Sender<RegistryEvent>,
    config: RegistryConfig,
}

fn admission_to_wire(err: AdmissionError) -> machina_wire::FireOutcome {
    match err {
        AdmissionError::CapacityExceeded => machina_wire::FireOutcome::CapacityExceeded,
        AdmissionError::Throttled => machina_wire::FireOutcome::Throttled,
        AdmissionError::Shutdown => machina_wire::FireOutcome::Shutdown,
    }
}

impl<C, V, P, S> Registry<C, V, P, S>
where
    C: PersistentContext + GraphNode + GraphHydrate + Serialize + DeserializeOwned,
    V: machina_core::VolatileContext,
    P: Send + 'static,
    S: Scheduler,
{
    pub fn new(
        definition: Arc<FsmDefinition<C, P>>,
        persistence: Arc<dyn PersistenceProvider>,
        graph_schema: GraphSchema,
        timeout: Arc<TimeoutManager<S>>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(config.listener_capacity);
        let registry = Arc::new(Self {
            definition,
            persistence,
            graph_schema,
            timeout,
            active: DashMap::new(),
            admission: AdmissionControl::new(config.max_concurrent_machines, config.max_events_per_second),
            admission_lock: AsyncMutex::new(()),
            events,
            config,
        });
        registry.emit_listener(ListenerEventKind::RegistryStartup, None, None);
        registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn resident_count(&self) -> usize {
        self.active.len()
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is not an error -- the registry runs fine with
        // nobody listening.
        let _ = self.events.send(event);
    }

    fn emit_listener(&self, kind: ListenerEventKind, machine_id: Option<&MachineId>, message: Option<String>) {
        let mut ev = machina_wire::ListenerEvent::new(kind, Utc::now());
        if let Some(id) = machine_id {
            ev = ev.for_machine(id.to_string());
        }
        if let Some(msg) = message {
            ev = ev.with_message(msg);
        }
        self.emit(RegistryEvent::Listener(ev));
    }

    /// Resolve `id` to a resident [`MachineHandle`], admitting a brand-new
    /// machine or rehydrating a persisted one as needed (§4.2).
    pub async fn create_or_get(
        self: &Arc<Self>,
        id: MachineId,
        factory: &MachineFactory<C, V, P>,
    ) -> Result<MachineHandle<C, V, P>, CreateOrGetError> {
        if let Some(existing) = self.active.get(&id) {
            return Ok(MachineHandle { id, inner: Arc::clone(existing.value()) });
        }
        if self.admission.is_shutting_down() {
            return Err(AdmissionError::Shutdown.into());
        }

        let _cold_start = self.admission_lock.lock().await;
        if let Some(existing) = self.active.get(&id) {
            return Ok(MachineHandle { id, inner: Arc::clone(existing.value()) });
        }
        self.admission.check_new_machine(self.active.len())?;

        match self.persistence.load(id.as_str()).await {
            Ok(Some(loaded)) if loaded.snapshot.complete => Err(CreateOrGetError::Completed),
            Ok(Some(loaded)) => self.rehydrate(id, loaded, factory).await,
            Ok(None) => self.admit_new(id, factory),
            Err(e) => Err(CreateOrGetError::LoadFailed(e)),
        }
    }

    fn admit_new(
        self: &Arc<Self>,
        id: MachineId,
        factory: &MachineFactory<C, V, P>,
    ) -> Result<MachineHandle<C, V, P>, CreateOrGetError> {
        let persistent = (factory.persistent)(&id);
        let creation_event = Event::new(CREATION_EVENT_KIND, (factory.timeout_payload)());
        let instance = FsmInstance::new(Arc::clone(&self.definition), persistent, &creation_event)
            .map_err(|(_, err)| CreateOrGetError::InitialEntryFailed(err))?;
        let generation = instance.generation();
        let initial_state = self.definition.initial_state().clone();
        let volatile = (factory.volatile)();
        let managed = Arc::new(AsyncMutex::new(ManagedMachine::new(instance, volatile)));
        self.active.insert(id.clone(), Arc::clone(&managed));
        self.emit_listener(ListenerEventKind::MachineCreated, Some(&id), None);
        self.emit_listener(ListenerEventKind::MachineRegistered, Some(&id), None);

        let timeout = self.definition.state(&initial_state).and_then(|s| s.timeout().cloned());
        self.arm_timeout(&id, timeout.as_ref(), generation, factory);

        Ok(MachineHandle { id, inner: managed })
    }

    async fn rehydrate(
        self: &Arc<Self>,
        id: MachineId,
        loaded: LoadedGraph,
        factory: &MachineFactory<C, V, P>,
    ) -> Result<MachineHandle<C, V, P>, CreateOrGetError> {
        let last_state_change = loaded.snapshot.last_state_change;
        let restored: C = machina_storage::hydrate(loaded).map_err(CreateOrGetError::LoadFailed)?;
        let current_state = restored.current_state().clone();
        let instance = FsmInstance::restore(Arc::clone(&self.definition), restored);
        let generation = instance.generation();
        let volatile = (factory.volatile)();
        let managed = Arc::new(AsyncMutex::new(ManagedMachine::new(instance, volatile)));
        self.active.insert(id.clone(), Arc::clone(&managed));
        self.emit_listener(ListenerEventKind::MachineRehydrated, Some(&id), None);

        self.timeout.cancel(&id);
        if let Some(timeout) = self.definition.state(&current_state).and_then(|s| s.timeout().cloned()) {
            let elapsed = SystemTime::from(last_state_change).elapsed().unwrap_or_default();
            match self.timeout.remaining_on_rehydrate(id.clone(), generation, timeout.duration, elapsed) {
                Some(remaining) => {
                    let on_fire = self.make_on_fire(&id, factory);
                    self.timeout.arm(id.clone(), generation, remaining, on_fire);
                }
                None => {
                    // §4.3/§8 scenario 4: a deadline that already elapsed
                    // fires immediately on the rehydration thread, before
                    // the event that triggered this rehydration is
                    // applied -- deliver it synchronously rather than
                    // just scheduling it, so `create_or_get` cannot
                    // return to its caller before the transition lands.
                    Arc::clone(self).deliver_timeout(id.clone(), factory.clone()).await;
                }
            }
        }

        Ok(MachineHandle { id, inner: managed })
    }

    /// Cancel whatever deadline is armed, then (re)arm it for the state
    /// `timeout` (if any) describes. Called after every fresh admission
    /// and accepted transition, regardless of whether the new state
    /// declares a timeout -- cancelling an absent deadline is a harmless
    /// no-op (§4.3). Rehydration has its own arm/deliver logic in
    /// [`Registry::rehydrate`], since an already-elapsed deadline there
    /// must be delivered synchronously rather than scheduled.
    fn arm_timeout(
        self: &Arc<Self>,
        id: &MachineId,
        timeout: Option<&StateTimeout>,
        generation: u64,
        factory: &MachineFactory<C, V, P>,
    ) {
        self.timeout.cancel(id);
        let Some(timeout) = timeout else { return };
        let on_fire = self.make_on_fire(id, factory);
        self.timeout.arm(id.clone(), generation, timeout.duration, on_fire);
    }

    /// Build the closure the timeout manager calls back on a scheduled
    /// deadline: hop onto its own task so a slow transition doesn't block
    /// the scheduler, then deliver the synthetic timeout event.
    fn make_on_fire(
        self: &Arc<Self>,
        id: &MachineId,
        factory: &MachineFactory<C, V, P>,
    ) -> impl FnOnce() + Send + 'static {
        let registry = Arc::clone(self);
        let machine_id = id.clone();
        let fire_factory = factory.clone();
        move || {
            let registry = Arc::clone(&registry);
            let machine_id = machine_id.clone();
            let fire_factory = fire_factory.clone();
            tokio::spawn(async move {
                registry.deliver_timeout(machine_id, fire_factory).await;
            });
        }
    }

    async fn deliver_timeout(self: Arc<Self>, id: MachineId, factory: MachineFactory<C, V, P>) {
        self.emit_listener(ListenerEventKind::RegistryTimeout, Some(&id), None);
        let payload = (factory.timeout_payload)();
        let event = Event::new(TIMEOUT_EVENT_KIND, payload);
        let _ = self.fire(id, &factory, event).await;
    }

    /// Apply one event to `id`, admitting/rehydrating it first if it is
    /// not already resident (§4.2 public operations, §5 ordering
    /// guarantees).
    pub async fn fire(
        self: &Arc<Self>,
        id: MachineId,
        factory: &MachineFactory<C, V, P>,
        event: Event<P>,
    ) -> machina_wire::FireOutcome {
        if let Err(e) = self.admission.check_event() {
            return admission_to_wire(e);
        }

        let handle = if let Some(existing) = self.active.get(&id) {
            MachineHandle { id: id.clone(), inner: Arc::clone(existing.value()) }
        } else {
            match self.create_or_get(id.clone(), factory).await {
                Ok(handle) => handle,
                Err(CreateOrGetError::Admission(AdmissionError::CapacityExceeded)) => {
                    self.emit_listener(ListenerEventKind::MachineCreationRefused, Some(&id), None);
                    return machina_wire::FireOutcome::CapacityExceeded;
                }
                Err(CreateOrGetError::Admission(AdmissionError::Throttled)) => {
                    return machina_wire::FireOutcome::Throttled;
                }
                Err(CreateOrGetError::Admission(AdmissionError::Shutdown)) => {
                    return machina_wire::FireOutcome::Shutdown;
                }
                Err(CreateOrGetError::Completed) => {
                    self.emit_listener(ListenerEventKind::EventIgnored, Some(&id), None);
                    return machina_wire::FireOutcome::Ignored;
                }
                Err(CreateOrGetError::LoadFailed(e)) => {
                    tracing::error!(machine = %id, error = %e, "failed to load persisted state");
                    self.emit_listener(ListenerEventKind::Error, Some(&id), Some(e.to_string()));
                    return machina_wire::FireOutcome::Failed { reason: format!("load failed: {e}") };
                }
                Err(CreateOrGetError::InitialEntryFailed(e)) => {
                    tracing::error!(machine = %id, error = %e, "initial entry action failed");
                    return machina_wire::FireOutcome::Failed { reason: e.to_string() };
                }
            }
        };

        let event_type = event.event_type.to_string();
        let mut guard = handle.inner.lock().await;
        let result = guard.instance.fire(&event);

        match result {
            Ok(EngineFireOutcome::Ignored) => {
                drop(guard);
                self.emit_listener(ListenerEventKind::EventIgnored, Some(&id), Some(event_type));
                machina_wire::FireOutcome::Ignored
            }
            Ok(EngineFireOutcome::StayApplied { state }) => {
                drop(guard);
                machina_wire::FireOutcome::StayApplied { state: state.to_string() }
            }
            Ok(EngineFireOutcome::Accepted { from, to }) => {
                let generation = guard.instance.generation();
                let (is_offline, is_final, timeout) = self
                    .definition
                    .state(&to)
                    .map(|s| (s.is_offline(), s.is_final(), s.timeout().cloned()))
                    .unwrap_or((false, false, None));

                self.arm_timeout(&id, timeout.as_ref(), generation, factory);

                let snapshot = if self.config.attach_context_snapshot {
                    serde_json::to_value(guard.instance.context()).ok()
                } else {
                    None
                };

                self.emit(RegistryEvent::Transition(machina_wire::TransitionRecord {
                    machine_id: id.to_string(),
                    event_type,
                    from_state: from.to_string(),
                    to_state: to.to_string(),
                    timestamp: Utc::now(),
                    is_offline,
                    is_final,
                    persistent_context_snapshot: snapshot,
                }));

                if is_offline || is_final {
                    match self.config.save_mode {
                        SaveMode::Synchronous => {
                            match self.save_with_retries(&id, &guard.instance).await {
                                Ok(()) => {
                                    drop(guard);
                                    self.evict(&id);
                                    if is_offline {
                                        self.emit_listener(ListenerEventKind::MachineOffline, Some(&id), None);
                                    }
                                }
                                Err(e) => {
                                    drop(guard);
                                    tracing::warn!(machine = %id, error = %e, "synchronous save failed; machine remains resident");
                                    self.emit_listener(ListenerEventKind::Warning, Some(&id), Some(e.to_string()));
                                }
                            }
                        }
                        SaveMode::Deferred => {
                            let snapshot_context = guard.instance.context().deep_copy();
                            drop(guard);
                            self.spawn_deferred_save_and_evict(id.clone(), snapshot_context, is_offline);
                        }
                    }
                } else {
                    drop(guard);
                }

                machina_wire::FireOutcome::Accepted { from: from.to_string(), to: to.to_string() }
            }
            Err(EngineFireError::AlreadyComplete { .. }) => {
                drop(guard);
                machina_wire::FireOutcome::Ignored
            }
            Err(EngineFireError::ActionFailed { phase, from, source }) => {
                drop(guard);
                tracing::warn!(machine = %id, %phase, %from, error = %source, "user action failed; transition rolled back");
                self.emit_listener(ListenerEventKind::Warning, Some(&id), Some(source.to_string()));
                machina_wire::FireOutcome::Failed { reason: source.to_string() }
            }
        }
    }

    /// Evict `id` from the resident table without touching persisted
    /// state. Idempotent -- evicting an id that is not resident is a
    /// no-op.
    pub fn evict(&self, id: &MachineId) {
        self.active.remove(id);
        self.timeout.cancel(id);
        self.emit_listener(ListenerEventKind::MachineEvicted, Some(id), None);
    }

    async fn save_with_retries(&self, id: &MachineId, instance: &FsmInstance<C, P>) -> Result<(), StorageError> {
        let request = machina_storage::route_for_save(instance.context(), &self.graph_schema, Utc::now())?;
        self.save_request_with_retries(id, request).await
    }

    async fn save_request_with_retries(&self, id: &MachineId, request: SaveRequest) -> Result<(), StorageError> {
        let mut attempt = 0u32;
        loop {
            match self.persistence.save(request.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.max_save_retries => {
                    attempt += 1;
                    tracing::warn!(machine = %id, attempt, error = %e, "persistence save failed, retrying");
                    let backoff = Duration::from_millis(100 * 2u64.saturating_pow(attempt.min(10)));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn spawn_deferred_save_and_evict(self: &Arc<Self>, id: MachineId, context: C, is_offline: bool) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let request = match machina_storage::route_for_save(&context, &registry.graph_schema, Utc::now()) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(machine = %id, error = %e, "failed to route deferred save");
                    registry.emit_listener(ListenerEventKind::Error, Some(&id), Some(e.to_string()));
                    return;
                }
            };
            match registry.save_request_with_retries(&id, request).await {
                Ok(()) => {
                    registry.evict(&id);
                    if is_offline {
                        registry.emit_listener(ListenerEventKind::MachineOffline, Some(&id), None);
                    }
                }
                Err(e) => {
                    tracing::error!(machine = %id, error = %e, "deferred persistence save failed after retries");
                    registry.emit_listener(ListenerEventKind::Error, Some(&id), Some(e.to_string()));
                }
            }
        });
    }

    /// Flush every resident machine to persistence and refuse further
    /// admission (§4.2, §5). Machines whose flush fails stay resident and
    /// are reported via an `ERROR` listener event rather than silently
    /// dropped.
    pub async fn shutdown(self: &Arc<Self>) {
        self.admission.begin_shutdown();
        self.emit_listener(ListenerEventKind::RegistryShutdown, None, None);

        let ids: Vec<MachineId> = self.active.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            let Some(entry) = self.active.get(&id) else { continue };
            let inner = Arc::clone(entry.value());
            drop(entry);
            self.timeout.cancel(&id);
            let guard = inner.lock().await;
            match self.save_with_retries(&id, &guard.instance).await {
                Ok(()) => {
                    drop(guard);
                    self.active.remove(&id);
                }
                Err(e) => {
                    drop(guard);
                    tracing::error!(machine = %id, error = %e, "failed to flush machine during shutdown");
                    self.emit_listener(ListenerEventKind::Error, Some(&id), Some(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
