// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios exercising the registry, timeout manager and
//! storage crates together, the way `oj-specs` exercises the teacher's
//! own daemon+engine stack from its workspace root.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use machina_adapters::MemoryStore;
use machina_core::{
    collect_graph, EntityRole, FakeClock, GraphHydrate, GraphNode, GraphVisitor, MachineId,
    PersistentContext, ShardingEntity, StateId,
};
use machina_engine::FsmDefinition;
use machina_registry::{
    AdmissionError, CreateOrGetError, MachineFactory, Registry, RegistryConfig, RegistryEvent,
    TIMEOUT_EVENT_KIND,
};
use machina_storage::{GraphSchema, PartitionStrategy, PersistenceProvider};
use machina_timeout::{ManualScheduler, TimeoutManager};
use machina_wire::{FireOutcome, ListenerEventKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CallContext {
    id: String,
    state: StateId,
    last_change: chrono::DateTime<chrono::Utc>,
    complete: bool,
}

impl PersistentContext for CallContext {
    fn id(&self) -> &str {
        &self.id
    }
    fn current_state(&self) -> &StateId {
        &self.state
    }
    fn set_current_state(&mut self, state: StateId) {
        self.state = state;
    }
    fn last_state_change(&self) -> SystemTime {
        self.last_change.into()
    }
    fn set_last_state_change(&mut self, at: SystemTime) {
        self.last_change = at.into();
    }
    fn is_complete(&self) -> bool {
        self.complete
    }
    fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

impl GraphNode for CallContext {}
impl GraphHydrate for CallContext {}

fn call_schema() -> GraphSchema {
    GraphSchema::builder("calls", PartitionStrategy::monthly()).build()
}

fn call_factory() -> MachineFactory<CallContext, (), ()> {
    MachineFactory::new(
        |id: &MachineId| CallContext {
            id: id.to_string(),
            state: StateId::new("idle"),
            last_change: Utc::now(),
            complete: false,
        },
        || (),
        || (),
    )
}

type CallRegistry = Registry<CallContext, (), (), ManualScheduler>;

fn registry_with(
    definition: Arc<FsmDefinition<CallContext, ()>>,
    config: RegistryConfig,
) -> (Arc<CallRegistry>, Arc<MemoryStore>, Arc<ManualScheduler>) {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(ManualScheduler::new(FakeClock::new()));
    let timeout = Arc::new(TimeoutManager::new(Arc::clone(&scheduler)));
    let registry = Registry::new(
        definition,
        store.clone() as Arc<dyn PersistenceProvider>,
        call_schema(),
        timeout,
        config,
    );
    (registry, store, scheduler)
}

async fn drain(rx: &mut tokio::sync::broadcast::Receiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn listener_kinds(events: &[RegistryEvent]) -> Vec<ListenerEventKind> {
    events
        .iter()
        .filter_map(|e| match e {
            RegistryEvent::Listener(l) => Some(l.kind),
            RegistryEvent::Transition(_) => None,
        })
        .collect()
}

/// A subsequence check: every element of `wanted`, in order, appears
/// somewhere in `haystack` (not necessarily contiguous).
fn contains_in_order<T: PartialEq>(haystack: &[T], wanted: &[T]) -> bool {
    let mut pos = 0;
    for w in wanted {
        match haystack[pos..].iter().position(|h| h == w) {
            Some(found) => pos += found + 1,
            None => return false,
        }
    }
    true
}

/// Scenario 1: happy call flow. IDLE -> RINGING -> CONNECTED -> IDLE,
/// three accepted transitions, `last_state_change` strictly increasing,
/// never completing.
#[tokio::test]
async fn happy_call_flow_produces_transition_records_in_order() {
    let definition = Arc::new(
        FsmDefinition::<CallContext, ()>::builder()
            .initial("idle")
            .state("idle", |s| s.transition("incoming_call", |t| t.goto("ringing")))
            .state("ringing", |s| s.transition("answer", |t| t.goto("connected")))
            .state("connected", |s| s.transition("hangup", |t| t.goto("idle")))
            .build()
            .expect("valid definition"),
    );
    let (registry, _store, _scheduler) = registry_with(definition, RegistryConfig::default());
    let factory = call_factory();
    let id = MachineId::from_string("C1");
    let mut rx = registry.subscribe();

    let outcomes = vec![
        registry.fire(id.clone(), &factory, machina_core::Event::new("incoming_call", ())).await,
        registry.fire(id.clone(), &factory, machina_core::Event::new("answer", ())).await,
        registry.fire(id.clone(), &factory, machina_core::Event::new("hangup", ())).await,
    ];
    assert_eq!(outcomes[0], FireOutcome::Accepted { from: "idle".into(), to: "ringing".into() });
    assert_eq!(outcomes[1], FireOutcome::Accepted { from: "ringing".into(), to: "connected".into() });
    assert_eq!(outcomes[2], FireOutcome::Accepted { from: "connected".into(), to: "idle".into() });

    let events = drain(&mut rx).await;
    let records: Vec<_> = events
        .into_iter()
        .filter_map(|e| match e {
            RegistryEvent::Transition(r) => Some(r),
            RegistryEvent::Listener(_) => None,
        })
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].from_state, "idle");
    assert_eq!(records[0].to_state, "ringing");
    assert_eq!(records[1].to_state, "connected");
    assert_eq!(records[2].to_state, "idle");
    assert!(records[0].timestamp <= records[1].timestamp);
    assert!(records[1].timestamp <= records[2].timestamp);

    let handle = registry.create_or_get(id, &factory).await.expect("still resident");
    assert!(!handle.is_complete().await);
}

/// Scenario 2: offline + rehydrate. IDLE is marked offline. Reaching it
/// saves and evicts synchronously; firing again for the same id loads,
/// rehydrates and re-applies, with the evict/rehydrate listener sequence
/// in order.
#[tokio::test]
async fn offline_state_evicts_then_rehydrates_on_next_event() {
    let definition = Arc::new(
        FsmDefinition::<CallContext, ()>::builder()
            .initial("ringing")
            .state("ringing", |s| s.transition("hangup", |t| t.goto("idle")))
            .state("idle", |s| s.offline().transition("incoming_call", |t| t.goto("ringing")))
            .build()
            .expect("valid definition"),
    );
    let (registry, store, _scheduler) = registry_with(definition, RegistryConfig::default());
    let factory = call_factory();
    let id = MachineId::from_string("C1");
    let mut rx = registry.subscribe();

    let outcome = registry.fire(id.clone(), &factory, machina_core::Event::new("hangup", ())).await;
    assert_eq!(outcome, FireOutcome::Accepted { from: "ringing".into(), to: "idle".into() });
    assert_eq!(registry.resident_count(), 0);
    let loaded = store.load(id.as_str()).await.expect("load ok").expect("persisted");
    assert_eq!(loaded.snapshot.current_state, "idle");

    let outcome = registry.fire(id.clone(), &factory, machina_core::Event::new("incoming_call", ())).await;
    assert_eq!(outcome, FireOutcome::Accepted { from: "idle".into(), to: "ringing".into() });

    let events = drain(&mut rx).await;
    let kinds = listener_kinds(&events);
    assert!(
        contains_in_order(
            &kinds,
            &[ListenerEventKind::MachineEvicted, ListenerEventKind::MachineRehydrated],
        ),
        "expected MachineEvicted before MachineRehydrated in {kinds:?}",
    );
}

/// Scenario 3: completion. Reaching a final state persists
/// `complete=true` and evicts; a subsequent event for the same id is a
/// silent no-op with no further transition record.
#[tokio::test]
async fn final_state_is_ignored_on_every_later_event() {
    let definition = Arc::new(
        FsmDefinition::<CallContext, ()>::builder()
            .initial("connected")
            .state("connected", |s| s.transition("hangup", |t| t.goto("hungup")))
            .state("hungup", |s| s.final_state())
            .build()
            .expect("valid definition"),
    );
    let (registry, store, _scheduler) = registry_with(definition, RegistryConfig::default());
    let factory = call_factory();
    let id = MachineId::from_string("C1");

    let outcome = registry.fire(id.clone(), &factory, machina_core::Event::new("hangup", ())).await;
    assert_eq!(outcome, FireOutcome::Accepted { from: "connected".into(), to: "hungup".into() });
    let loaded = store.load(id.as_str()).await.expect("load ok").expect("persisted");
    assert!(loaded.snapshot.complete);

    let mut rx = registry.subscribe();
    let outcome = registry.fire(id, &factory, machina_core::Event::new("incoming_call", ())).await;
    assert_eq!(outcome, FireOutcome::Ignored);
    let events = drain(&mut rx).await;
    assert!(
        events.iter().all(|e| !matches!(e, RegistryEvent::Transition(_))),
        "a no-op on a completed machine must never emit a transition record",
    );
}

/// Scenario 4: a timeout armed on an (online, non-offline) state whose
/// machine is then evicted out-of-band. Rehydrating long after the
/// deadline has elapsed fires the timeout transition immediately, before
/// any pending event is applied -- so an event fired in the very next
/// line, with no sleep or yield in between, must observe the
/// post-timeout state rather than racing the synthetic transition.
#[tokio::test]
async fn rehydrating_past_an_elapsed_deadline_fires_the_timeout_immediately() {
    let definition = Arc::new(
        FsmDefinition::<CallContext, ()>::builder()
            .initial("ringing")
            .state("ringing", |s| {
                s.transition("answer", |t| t.goto("connected")).timeout(Duration::from_secs(30), "idle")
            })
            .state("connected", |s| s.transition("hangup", |t| t.goto("idle")))
            .state("idle", |s| s.transition("incoming_call", |t| t.goto("ringing")))
            .build()
            .expect("valid definition"),
    );
    let (registry, store, _scheduler) = registry_with(definition, RegistryConfig::default());
    let factory = call_factory();
    let id = MachineId::from_string("C1");

    // Admit into "ringing" (arms the 30s deadline), then persist and
    // evict out-of-band as of 45 real seconds ago -- simulating a
    // machine that sat offline for longer than its deadline without the
    // registry's own offline-eviction path (this state isn't offline).
    registry.create_or_get(id.clone(), &factory).await.expect("admits");
    let stale_change = Utc::now() - chrono::Duration::seconds(45);
    let context = CallContext {
        id: id.to_string(),
        state: StateId::new("ringing"),
        last_change: stale_change,
        complete: false,
    };
    let request = machina_storage::route_for_save(&context, &call_schema(), Utc::now()).expect("routes");
    store.save(request).await.expect("saves");
    registry.evict(&id);
    assert_eq!(registry.resident_count(), 0);

    // "answer" only matches in "ringing" -- if it raced ahead of the
    // elapsed timeout it would be accepted and land in "connected". It
    // must instead see the machine already past the timeout in "idle"
    // and be ignored there (no transition out of "idle" on "answer").
    let outcome = registry.fire(id.clone(), &factory, machina_core::Event::new("answer", ())).await;
    assert_eq!(outcome, FireOutcome::Ignored);

    let handle = registry.create_or_get(id, &factory).await.expect("still resident");
    assert_eq!(handle.current_state().await.as_str(), "idle");
}

/// Scenario 5: admission capacity. A hard cap on concurrently resident
/// machines blocks a third admission outright, with no trace left in
/// memory or storage.
#[tokio::test]
async fn capacity_cap_refuses_admission_beyond_the_limit() {
    let definition = Arc::new(
        FsmDefinition::<CallContext, ()>::builder()
            .initial("idle")
            .state("idle", |s| s.transition("incoming_call", |t| t.goto("ringing")))
            .state("ringing", |s| s)
            .build()
            .expect("valid definition"),
    );
    let config = RegistryConfig::builder().max_concurrent_machines(2).build();
    let (registry, store, _scheduler) = registry_with(definition, config);
    let factory = call_factory();
    let mut rx = registry.subscribe();

    registry.create_or_get(MachineId::from_string("A"), &factory).await.expect("admits A");
    registry.create_or_get(MachineId::from_string("B"), &factory).await.expect("admits B");

    let result = registry.create_or_get(MachineId::from_string("C"), &factory).await;
    assert!(matches!(
        result,
        Err(CreateOrGetError::Admission(AdmissionError::CapacityExceeded))
    ));
    assert_eq!(registry.resident_count(), 2);
    assert!(store.load("C").await.expect("load ok").is_none());

    let events = drain(&mut rx).await;
    assert!(listener_kinds(&events).contains(&ListenerEventKind::MachineCreationRefused));
}

// --- Scenario 6: selective graph round-trip -------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Customer {
    id: String,
    #[serde(skip, default = "SystemTime::now")]
    created_at: SystemTime,
    name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Shipping {
    id: String,
    #[serde(skip, default = "SystemTime::now")]
    created_at: SystemTime,
    carrier: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Payment {
    id: String,
    #[serde(skip, default = "SystemTime::now")]
    created_at: SystemTime,
    method: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Item {
    id: String,
    #[serde(skip, default = "SystemTime::now")]
    created_at: SystemTime,
    sku: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Address {
    id: String,
    #[serde(skip, default = "SystemTime::now")]
    created_at: SystemTime,
    line1: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SubOrder {
    id: String,
    #[serde(skip, default = "SystemTime::now")]
    created_at: SystemTime,
    sku_total: u32,
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl ShardingEntity for $ty {
            fn entity_id(&self) -> &str {
                &self.id
            }
            fn created_at(&self) -> SystemTime {
                self.created_at
            }
            fn entity_type(&self) -> &'static str {
                $kind
            }
            fn to_row_value(&self) -> serde_json::Value {
                serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
            }
        }
    };
}

impl_entity!(Customer, "customer");
impl_entity!(Shipping, "shipping");
impl_entity!(Payment, "payment");
impl_entity!(Item, "item");
impl_entity!(Address, "address");
impl_entity!(SubOrder, "order");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Analytics {
    view_count: u64,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Metrics {
    events_recorded: u64,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Preferences {
    flags_set: u32,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Loyalty {
    points: u64,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Estimate {
    recalculations: u32,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Validation {
    failures: u32,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Geo {
    lookups: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRoot {
    id: String,
    state: StateId,
    last_change: chrono::DateTime<chrono::Utc>,
    complete: bool,
    customer: Customer,
    shipping: Shipping,
    payment: Payment,
    items: Vec<Item>,
    address: Address,
    orders: Vec<SubOrder>,
    #[serde(skip)]
    analytics: Analytics,
    #[serde(skip)]
    metrics: Metrics,
    #[serde(skip)]
    preferences: Preferences,
    #[serde(skip)]
    loyalty: Loyalty,
    #[serde(skip)]
    estimate: Estimate,
    #[serde(skip)]
    validation: Validation,
    #[serde(skip)]
    geo: Geo,
}

impl PersistentContext for AccountRoot {
    fn id(&self) -> &str {
        &self.id
    }
    fn current_state(&self) -> &StateId {
        &self.state
    }
    fn set_current_state(&mut self, state: StateId) {
        self.state = state;
    }
    fn last_state_change(&self) -> SystemTime {
        self.last_change.into()
    }
    fn set_last_state_change(&mut self, at: SystemTime) {
        self.last_change = at.into();
    }
    fn is_complete(&self) -> bool {
        self.complete
    }
    fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

impl GraphNode for AccountRoot {
    fn visit_children(&self, visitor: &mut dyn GraphVisitor) {
        visitor.visit(EntityRole::Entity, &self.customer);
        visitor.visit(EntityRole::Entity, &self.shipping);
        visitor.visit(EntityRole::Entity, &self.payment);
        for item in &self.items {
            visitor.visit(EntityRole::Entity, item);
        }
        visitor.visit(EntityRole::Entity, &self.address);
        for order in &self.orders {
            visitor.visit(EntityRole::Entity, order);
        }
    }
}

impl GraphHydrate for AccountRoot {}

#[test]
fn selective_graph_round_trip_writes_exactly_the_annotated_rows() {
    let schema = GraphSchema::builder("accounts", PartitionStrategy::monthly())
        .entity("customer", "account_customers", PartitionStrategy::monthly())
        .entity("shipping", "account_shipping", PartitionStrategy::monthly())
        .entity("payment", "account_payments", PartitionStrategy::monthly())
        .entity("item", "account_items", PartitionStrategy::monthly())
        .entity("address", "account_addresses", PartitionStrategy::monthly())
        .entity("order", "account_orders", PartitionStrategy::monthly())
        .build();

    let root = AccountRoot {
        id: "acct-1".into(),
        state: StateId::new("active"),
        last_change: Utc::now(),
        complete: false,
        customer: Customer { id: "cust-1".into(), created_at: SystemTime::now(), name: "Jo".into() },
        shipping: Shipping { id: "ship-1".into(), created_at: SystemTime::now(), carrier: "ups".into() },
        payment: Payment { id: "pay-1".into(), created_at: SystemTime::now(), method: "card".into() },
        items: vec![
            Item { id: "item-1".into(), created_at: SystemTime::now(), sku: "sku-a".into() },
            Item { id: "item-2".into(), created_at: SystemTime::now(), sku: "sku-b".into() },
        ],
        address: Address { id: "addr-1".into(), created_at: SystemTime::now(), line1: "1 Main St".into() },
        orders: vec![
            SubOrder { id: "ord-1".into(), created_at: SystemTime::now(), sku_total: 2 },
            SubOrder { id: "ord-2".into(), created_at: SystemTime::now(), sku_total: 1 },
        ],
        analytics: Analytics { view_count: 42 },
        metrics: Metrics { events_recorded: 7 },
        preferences: Preferences { flags_set: 3 },
        loyalty: Loyalty { points: 900 },
        estimate: Estimate { recalculations: 5 },
        validation: Validation { failures: 1 },
        geo: Geo { lookups: 2 },
    };

    assert_eq!(collect_graph(&root).len(), 8, "customer+shipping+payment+2 items+address+2 orders");

    let request = machina_storage::route_for_save(&root, &schema, Utc::now()).expect("routes cleanly");
    assert_eq!(request.children.len(), 8);
    for (entity_type, expected) in [
        ("customer", 1),
        ("shipping", 1),
        ("payment", 1),
        ("item", 2),
        ("address", 1),
        ("order", 2),
    ] {
        let count = request.children.iter().filter(|c| c.entity_type == entity_type).count();
        assert_eq!(count, expected, "unexpected row count for entity type {entity_type:?}");
    }

    let loaded = machina_storage::LoadedGraph { snapshot: request.snapshot, children: Vec::new() };
    let restored: AccountRoot = machina_storage::hydrate(loaded).expect("hydrates cleanly");
    assert_eq!(restored.customer.id, "cust-1");
    assert_eq!(restored.items.len(), 2);
    assert_eq!(restored.orders.len(), 2);

    assert_eq!(restored.analytics.view_count, 0);
    assert_eq!(restored.metrics.events_recorded, 0);
    assert_eq!(restored.preferences.flags_set, 0);
    assert_eq!(restored.loyalty.points, 0);
    assert_eq!(restored.estimate.recalculations, 0);
    assert_eq!(restored.validation.failures, 0);
    assert_eq!(restored.geo.lookups, 0);
}
