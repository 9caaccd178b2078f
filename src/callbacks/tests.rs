//! Dispatch tests for [`CallbackManager`].

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn manager() -> CallbackManager { CallbackManager::new(Arc::new(CallbackQueue::new())) }

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&count), count)
}

fn logged_on(job: u64) -> LoggedOnCallback {
    LoggedOnCallback {
        job_id: JobId::new(job),
        result: EResult::OK,
        steam_id: SteamId::new(76_561_197_960_265_729),
        session_id: 1,
        cell_id: 4,
        out_of_game_heartbeat_seconds: 9,
        server_time: 0,
    }
}

fn token(value: u64) -> SessionTokenCallback {
    SessionTokenCallback {
        job_id: JobId::INVALID,
        token: value,
    }
}

#[rstest]
#[case(CallbackKind::Connected, CallbackKind::Connection, true)]
#[case(CallbackKind::Disconnected, CallbackKind::Any, true)]
#[case(CallbackKind::SessionToken, CallbackKind::Account, true)]
#[case(CallbackKind::CmList, CallbackKind::Discovery, true)]
#[case(CallbackKind::Packet, CallbackKind::Packet, true)]
#[case(CallbackKind::Packet, CallbackKind::Account, false)]
#[case(CallbackKind::Connection, CallbackKind::Connected, false)]
#[case(CallbackKind::Any, CallbackKind::Discovery, false)]
fn kind_hierarchy(#[case] kind: CallbackKind, #[case] other: CallbackKind, #[case] expected: bool) {
    assert_eq!(kind.is_a(other), expected);
}

#[rstest]
fn exact_and_supertype_subscriptions_both_receive_item(manager: CallbackManager) {
    let (exact, exact_count) = counter();
    let (parent, parent_count) = counter();
    let (root, root_count) = counter();
    let _a = manager.subscribe(move |_: &LoggedOnCallback| {
        exact.fetch_add(1, Ordering::SeqCst);
    });
    let _b = manager.subscribe_kind(CallbackKind::Account, JobFilter::Any, move |_| {
        parent.fetch_add(1, Ordering::SeqCst);
    });
    let _c = manager.subscribe(move |_: &Callback| {
        root.fetch_add(1, Ordering::SeqCst);
    });

    manager.queue().post(logged_on(1));
    assert!(manager.run_callbacks());
    assert_eq!(exact_count.load(Ordering::SeqCst), 1);
    assert_eq!(parent_count.load(Ordering::SeqCst), 1);
    assert_eq!(root_count.load(Ordering::SeqCst), 1);
}

#[rstest]
fn unrelated_subscription_is_not_invoked(manager: CallbackManager) {
    let (hits, count) = counter();
    let _sub = manager.subscribe_kind(CallbackKind::Discovery, JobFilter::Any, move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    manager.queue().post(token(3));
    assert!(manager.run_callbacks(), "the item is consumed even without a match");
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[rstest]
fn handler_releasing_its_own_handle_does_not_disturb_others(manager: CallbackManager) {
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let (own, own_count) = counter();
    let (other, other_count) = counter();

    let release = Arc::clone(&slot);
    let sub = manager.subscribe(move |_: &SessionTokenCallback| {
        own.fetch_add(1, Ordering::SeqCst);
        let handle = release.lock().expect("slot poisoned").take();
        drop(handle);
    });
    *slot.lock().expect("slot poisoned") = Some(sub);
    let _other = manager.subscribe(move |_: &SessionTokenCallback| {
        other.fetch_add(1, Ordering::SeqCst);
    });

    manager.queue().post(token(1));
    manager.queue().post(token(2));
    assert!(manager.run_callbacks());
    assert!(manager.run_callbacks());

    assert_eq!(own_count.load(Ordering::SeqCst), 1, "released handler runs once");
    assert_eq!(other_count.load(Ordering::SeqCst), 2, "remaining handler sees every item");
    assert_eq!(manager.subscription_count(), 1);
}

#[rstest]
fn subscription_added_during_dispatch_misses_current_item(manager: CallbackManager) {
    let manager = Arc::new(manager);
    let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
    let (late, late_count) = counter();

    let weak = Arc::downgrade(&manager);
    let store = Arc::clone(&added);
    let _spawner = manager.subscribe(move |_: &ConnectedCallback| {
        let Some(manager) = weak.upgrade() else { return };
        let hits = Arc::clone(&late);
        let sub = manager.subscribe(move |_: &ConnectedCallback| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        store.lock().expect("store poisoned").push(sub);
    });

    manager.queue().post(ConnectedCallback);
    assert!(manager.run_callbacks());
    assert_eq!(late_count.load(Ordering::SeqCst), 0);

    manager.queue().post(ConnectedCallback);
    assert!(manager.run_callbacks());
    assert_eq!(late_count.load(Ordering::SeqCst), 1);
}

#[rstest]
fn dropped_subscription_stops_delivery(manager: CallbackManager) {
    let (hits, count) = counter();
    let sub = manager.subscribe(move |_: &ConnectedCallback| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    assert!(sub.is_active());
    sub.unsubscribe();

    manager.queue().post(ConnectedCallback);
    assert!(manager.run_callbacks());
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(manager.subscription_count(), 0);
}

#[rstest]
fn items_are_dispatched_in_arrival_order(manager: CallbackManager) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let _sub = manager.subscribe(move |cb: &SessionTokenCallback| {
        record.lock().expect("record poisoned").push(cb.token);
    });

    for value in [10, 20, 30] {
        manager.queue().post(token(value));
    }
    while manager.run_callbacks() {}

    assert_eq!(*seen.lock().expect("record poisoned"), vec![10, 20, 30]);
}

#[rstest]
fn job_filter_selects_correlated_items(manager: CallbackManager) {
    let (hits, count) = counter();
    let _sub = manager.subscribe_job(JobId::new(5), move |cb: &LoggedOnCallback| {
        assert_eq!(cb.job_id, JobId::new(5));
        hits.fetch_add(1, Ordering::SeqCst);
    });

    manager.queue().post(logged_on(4));
    manager.queue().post(logged_on(5));
    manager.queue().post(logged_on(6));
    while manager.run_callbacks() {}

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[rstest]
fn run_callbacks_on_empty_queue_returns_false(manager: CallbackManager) {
    assert!(!manager.run_callbacks());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn run_wait_callbacks_times_out(manager: CallbackManager) {
    assert!(!manager.run_wait_callbacks(Duration::from_secs(1)).await);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn run_wait_callbacks_receives_late_item(manager: CallbackManager) {
    let manager = Arc::new(manager);
    let producer = Arc::clone(manager.queue());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        producer.post(ConnectedCallback);
    });
    assert!(manager.run_wait_callbacks(Duration::from_secs(1)).await);
}

#[rstest]
#[tokio::test]
async fn run_wait_forever_consumes_unmatched_item(manager: CallbackManager) {
    manager.queue().post(DisconnectedCallback { user_initiated: false });
    manager.run_wait_callbacks_forever().await;
    assert!(manager.queue().is_empty());
}

#[rstest]
#[tokio::test]
async fn run_wait_all_drains_queue(manager: CallbackManager) {
    let (hits, count) = counter();
    let _sub = manager.subscribe(move |_: &Callback| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    for value in 0..4 {
        manager.queue().post(token(value));
    }

    assert!(manager.run_wait_all_callbacks(Duration::from_millis(50)).await);
    assert_eq!(count.load(Ordering::SeqCst), 4);
    assert!(manager.queue().is_empty());
}

#[rstest]
#[tokio::test]
async fn run_wait_all_delivers_items_posted_while_draining(manager: CallbackManager) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let queue = Arc::clone(manager.queue());
    let _sub = manager.subscribe(move |cb: &SessionTokenCallback| {
        log.lock().expect("log poisoned").push(cb.token);
        if cb.token < 3 {
            queue.post(token(cb.token + 1));
        }
    });
    manager.queue().post(token(1));

    assert!(manager.run_wait_all_callbacks(Duration::from_millis(50)).await);
    assert_eq!(*seen.lock().expect("log poisoned"), vec![1, 2, 3]);
    assert!(manager.queue().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn run_wait_all_on_empty_queue_returns_false(manager: CallbackManager) {
    assert!(!manager.run_wait_all_callbacks(Duration::from_millis(50)).await);
}
