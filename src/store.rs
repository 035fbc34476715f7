//! Bill snapshot cache with a de-duplicated refresh.
//!
//! The store holds the last good response from the backend and hands it to
//! whoever renders bills. Overlapping `refresh()` calls (a manual retry
//! racing a post-payment reconciliation, say) coalesce into a single
//! network round trip whose result satisfies every caller.

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use yew::Callback;

use crate::api::{ApiClient, ApiError};
use crate::model::Bill;

/// Seam between the store and the backend. Implemented by [`ApiClient`]
/// and by scripted fakes in tests.
pub trait FetchBills {
    fn fetch_bills(&self) -> LocalBoxFuture<'_, Result<Vec<Bill>, ApiError>>;
}

impl FetchBills for ApiClient {
    fn fetch_bills(&self) -> LocalBoxFuture<'_, Result<Vec<Bill>, ApiError>> {
        Box::pin(self.list_bills())
    }
}

/// What the UI renders: the last good bill list, plus the error flag for
/// the most recent refresh. A failed refresh keeps the old bills visible.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BillsSnapshot {
    pub bills: Vec<Bill>,
    /// Set when the latest refresh failed; `bills` is then the previous
    /// snapshot, not cleared.
    pub error: Option<ApiError>,
    /// False until the first fetch has completed at least once.
    pub loaded: bool,
}

struct StoreState {
    snapshot: BillsSnapshot,
    in_flight: bool,
    waiters: Vec<oneshot::Sender<BillsSnapshot>>,
    subscribers: Vec<Callback<BillsSnapshot>>,
}

/// Shared handle on the cached bill list. Clones observe the same state.
#[derive(Clone)]
pub struct BillStore {
    fetcher: Rc<dyn FetchBills>,
    state: Rc<RefCell<StoreState>>,
}

impl BillStore {
    pub fn new(fetcher: Rc<dyn FetchBills>) -> Self {
        Self {
            fetcher,
            state: Rc::new(RefCell::new(StoreState {
                snapshot: BillsSnapshot::default(),
                in_flight: false,
                waiters: Vec::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn snapshot(&self) -> BillsSnapshot {
        self.state.borrow().snapshot.clone()
    }

    /// Be notified whenever a refresh completes, successfully or not.
    pub fn subscribe(&self, callback: Callback<BillsSnapshot>) {
        self.state.borrow_mut().subscribers.push(callback);
    }

    /// Re-fetch the bill list from the backend.
    ///
    /// If a fetch is already on the wire this call waits for it instead of
    /// issuing another; all callers resolve with the same snapshot.
    pub async fn refresh(&self) -> BillsSnapshot {
        {
            let mut state = self.state.borrow_mut();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                drop(state);
                if let Ok(snapshot) = rx.await {
                    return snapshot;
                }
                return self.snapshot();
            }
            state.in_flight = true;
        }

        let result = self.fetcher.fetch_bills().await;
        self.apply(result)
    }

    fn apply(&self, result: Result<Vec<Bill>, ApiError>) -> BillsSnapshot {
        let (snapshot, waiters, subscribers) = {
            let mut state = self.state.borrow_mut();
            state.in_flight = false;
            match result {
                Ok(bills) => {
                    state.snapshot.bills = bills;
                    state.snapshot.error = None;
                    state.snapshot.loaded = true;
                }
                Err(err) => {
                    state.snapshot.error = Some(err);
                }
            }
            (
                state.snapshot.clone(),
                state.waiters.drain(..).collect::<Vec<_>>(),
                state.subscribers.clone(),
            )
        };
        for waiter in waiters {
            let _ = waiter.send(snapshot.clone());
        }
        for subscriber in &subscribers {
            subscriber.emit(snapshot.clone());
        }
        snapshot
    }
}

// Handle identity for prop diffing.
impl PartialEq for BillStore {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BillStatus;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::cell::Cell;
    use std::collections::VecDeque;

    fn bill(id: &str, status: BillStatus) -> Bill {
        Bill {
            id: id.into(),
            period_start: "2025-06-01".into(),
            period_end: "2025-06-30".into(),
            total_amount: "42.50".into(),
            status,
            generated_at: "2025-07-01T00:00:00Z".into(),
        }
    }

    /// Fetcher whose responses are released by the test, so a request can
    /// be held open while more `refresh()` calls arrive.
    struct GatedFetch {
        calls: Cell<usize>,
        gates: RefCell<VecDeque<oneshot::Receiver<Result<Vec<Bill>, ApiError>>>>,
    }

    impl GatedFetch {
        fn new() -> (Rc<Self>, Vec<oneshot::Sender<Result<Vec<Bill>, ApiError>>>) {
            let mut senders = Vec::new();
            let mut gates = VecDeque::new();
            for _ in 0..4 {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                gates.push_back(rx);
            }
            (
                Rc::new(Self {
                    calls: Cell::new(0),
                    gates: RefCell::new(gates),
                }),
                senders,
            )
        }
    }

    impl FetchBills for GatedFetch {
        fn fetch_bills(&self) -> LocalBoxFuture<'_, Result<Vec<Bill>, ApiError>> {
            self.calls.set(self.calls.get() + 1);
            let gate = self.gates.borrow_mut().pop_front().expect("unexpected fetch");
            Box::pin(async move { gate.await.expect("gate dropped") })
        }
    }

    fn spawn_refresh(
        pool: &mut LocalPool,
        store: &BillStore,
    ) -> Rc<RefCell<Option<BillsSnapshot>>> {
        let slot = Rc::new(RefCell::new(None));
        let store = store.clone();
        let out = slot.clone();
        pool.spawner()
            .spawn_local(async move {
                *out.borrow_mut() = Some(store.refresh().await);
            })
            .unwrap();
        slot
    }

    #[test]
    fn overlapping_refreshes_coalesce_into_one_fetch() {
        let (fetcher, mut gates) = GatedFetch::new();
        let store = BillStore::new(fetcher.clone());
        let mut pool = LocalPool::new();

        let first = spawn_refresh(&mut pool, &store);
        pool.run_until_stalled();
        let second = spawn_refresh(&mut pool, &store);
        pool.run_until_stalled();
        assert_eq!(fetcher.calls.get(), 1);

        gates
            .remove(0)
            .send(Ok(vec![bill("b1", BillStatus::Pending)]))
            .unwrap();
        pool.run_until_stalled();

        let first = first.borrow().clone().expect("first refresh resolved");
        let second = second.borrow().clone().expect("second refresh resolved");
        assert_eq!(first, second);
        assert_eq!(first.bills.len(), 1);
        assert!(first.loaded);
        assert_eq!(fetcher.calls.get(), 1);
    }

    #[test]
    fn failed_refresh_keeps_the_previous_snapshot() {
        let (fetcher, mut gates) = GatedFetch::new();
        let store = BillStore::new(fetcher);
        let mut pool = LocalPool::new();

        let ok = spawn_refresh(&mut pool, &store);
        pool.run_until_stalled();
        gates
            .remove(0)
            .send(Ok(vec![bill("b1", BillStatus::Overdue)]))
            .unwrap();
        pool.run_until_stalled();
        assert!(ok.borrow().as_ref().unwrap().error.is_none());

        let failed = spawn_refresh(&mut pool, &store);
        pool.run_until_stalled();
        gates
            .remove(0)
            .send(Err(ApiError::Network("connection reset".into())))
            .unwrap();
        pool.run_until_stalled();

        let snapshot = failed.borrow().clone().unwrap();
        assert_eq!(snapshot.bills.len(), 1);
        assert_eq!(snapshot.bills[0].id, "b1");
        assert!(matches!(snapshot.error, Some(ApiError::Network(_))));
    }

    #[test]
    fn refresh_renders_whatever_the_backend_says() {
        // A bill can legitimately still be PENDING right after a reported
        // payment success; the snapshot must reflect that, not a locally
        // forced PAID.
        let (fetcher, mut gates) = GatedFetch::new();
        let store = BillStore::new(fetcher);
        let mut pool = LocalPool::new();

        let slot = spawn_refresh(&mut pool, &store);
        pool.run_until_stalled();
        gates
            .remove(0)
            .send(Ok(vec![bill("b1", BillStatus::Pending)]))
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(slot.borrow().as_ref().unwrap().bills[0].status, BillStatus::Pending);
    }

    #[test]
    fn subscribers_hear_every_completed_refresh() {
        let (fetcher, mut gates) = GatedFetch::new();
        let store = BillStore::new(fetcher);
        let mut pool = LocalPool::new();

        let heard: Rc<RefCell<Vec<BillsSnapshot>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = heard.clone();
        store.subscribe(Callback::from(move |snapshot| {
            sink.borrow_mut().push(snapshot);
        }));

        let _ = spawn_refresh(&mut pool, &store);
        pool.run_until_stalled();
        gates
            .remove(0)
            .send(Ok(vec![bill("b1", BillStatus::Paid)]))
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(heard.borrow().len(), 1);
        assert_eq!(heard.borrow()[0].bills[0].status, BillStatus::Paid);
    }
}
