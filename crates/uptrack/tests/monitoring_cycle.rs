//! End-to-end inspection cycles: scheduler, inspectors and the state log
//! publisher working against one in-memory store.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uptrack::{
    CheckKind, CycleOutcome, InspectionScheduler, MemoryStore, Probe, ProbeFactory,
    SchedulerConfig, Service, ServiceId, StateLogPublisher, StatusService, TransitionLog,
};

#[derive(Default)]
struct Switchboard(Mutex<HashMap<ServiceId, bool>>);

impl Switchboard {
    fn set(&self, id: ServiceId, is_online: bool) {
        self.0.lock().unwrap().insert(id, is_online);
    }
}

struct SwitchProbe {
    board: Arc<Switchboard>,
}

#[async_trait::async_trait]
impl Probe for SwitchProbe {
    async fn check(&mut self, service: &Service) -> Result<bool> {
        let verdict = self.board.0.lock().unwrap().get(&service.id).copied();
        verdict.ok_or_else(|| anyhow!("{} unreachable from probe host", service.name))
    }
}

struct SwitchFactory(Arc<Switchboard>);

impl ProbeFactory for SwitchFactory {
    fn create(&self, _service: &Service) -> Box<dyn Probe> {
        Box::new(SwitchProbe { board: self.0.clone() })
    }
}

struct Engine {
    store: Arc<MemoryStore>,
    status: Arc<StatusService>,
    board: Arc<Switchboard>,
    scheduler: InspectionScheduler,
}

fn engine() -> Engine {
    let _ = tracing_subscriber::fmt::try_init();
    let store = Arc::new(MemoryStore::new());
    let status = Arc::new(StatusService::new(store.clone(), store.clone(), store.clone()));
    let board = Arc::new(Switchboard::default());
    let scheduler = InspectionScheduler::new(
        store.clone(),
        store.clone(),
        Arc::new(StateLogPublisher::new(status.clone())),
        Arc::new(SwitchFactory(board.clone())),
        SchedulerConfig::default(),
    );
    Engine { store, status, board, scheduler }
}

#[tokio::test]
async fn test_cycles_build_an_alternating_log() {
    let mut e = engine();
    let (_tx, rx) = watch::channel(false);
    let lms = Service::new("lms", "https://lms.example.edu", CheckKind::Http);
    let mail = Service::new("mail", "mail.example.edu:993", CheckKind::Tcp);
    e.store.set_services(vec![lms.clone(), mail.clone()]).await;

    e.board.set(lms.id, true);
    e.board.set(mail.id, true);
    assert_eq!(
        e.scheduler.run_cycle(&rx).await.unwrap(),
        CycleOutcome::Published { transitions: 2 }
    );

    e.board.set(mail.id, false);
    assert_eq!(
        e.scheduler.run_cycle(&rx).await.unwrap(),
        CycleOutcome::Published { transitions: 1 }
    );
    assert_eq!(e.scheduler.run_cycle(&rx).await.unwrap(), CycleOutcome::Skipped);

    let history = e.store.history(mail.id).await.unwrap();
    let states: Vec<bool> = history.iter().map(|t| t.is_online).collect();
    assert_eq!(states, vec![true, false]);
    assert_eq!(e.status.current_state(lms.id).await.unwrap(), Some(true));
    assert!(e.status.uptime(mail.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_restarted_scheduler_does_not_repeat_known_state() {
    let mut e = engine();
    let (_tx, rx) = watch::channel(false);
    let portal = Service::new("portal", "https://portal.example.edu", CheckKind::Http);
    e.store.set_services(vec![portal.clone()]).await;
    e.board.set(portal.id, false);
    e.scheduler.run_cycle(&rx).await.unwrap();

    // a second scheduler over the same log starts with no inspectors
    let mut restarted = InspectionScheduler::new(
        e.store.clone(),
        e.store.clone(),
        Arc::new(StateLogPublisher::new(e.status.clone())),
        Arc::new(SwitchFactory(e.board.clone())),
        SchedulerConfig::default(),
    );
    assert_eq!(restarted.run_cycle(&rx).await.unwrap(), CycleOutcome::Skipped);
    assert_eq!(e.store.transition_count(portal.id).await, 1);
}

#[tokio::test]
async fn test_removed_service_stops_being_probed() {
    let mut e = engine();
    let (_tx, rx) = watch::channel(false);
    let old = Service::new("legacy", "https://legacy.example.edu", CheckKind::Http);
    let new = Service::new("sso", "https://sso.example.edu", CheckKind::Http);
    e.store.set_services(vec![old.clone()]).await;
    e.board.set(old.id, true);
    e.scheduler.run_cycle(&rx).await.unwrap();

    e.store.set_services(vec![new.clone()]).await;
    e.board.set(old.id, false);
    e.board.set(new.id, true);
    e.scheduler.run_cycle(&rx).await.unwrap();

    assert_eq!(e.scheduler.tracked(), vec![new.id]);
    assert_eq!(e.store.transition_count(old.id).await, 1);
    assert_eq!(e.store.transition_count(new.id).await, 1);
}
