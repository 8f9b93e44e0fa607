use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tilevisor::{
    Config, HandlerError, LeafFn, LifecycleRegistry, Payload, ResourceFn, StartOutcome, Status,
    Tile, TileBehavior, TileContext, TileState,
};
use tokio::time::{sleep, timeout};

fn registry() -> Arc<LifecycleRegistry> {
    LifecycleRegistry::builder(Config::default()).build()
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_status(tile: &Tile, want: Status) {
    let mut rx = tile.coordinator().subscribe_status();
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("{} never reached {want:?}", tile.name()))
        .expect("status channel closed");
}

async fn wait_state(tile: &Tile, want: TileState) {
    let mut rx = tile.subscribe_state();
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("{} never reached {want}", tile.name()))
        .expect("state channel closed");
}

/// Leaf tile counting how often it was started.
fn counting_leaf(registry: &Arc<LifecycleRegistry>, name: &str) -> (Tile, Arc<AtomicUsize>) {
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&starts);
    let tile = Tile::builder(name)
        .behavior(LeafFn::new(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(StartOutcome::Ready)
        }))
        .build(registry)
        .unwrap();
    (tile, starts)
}

/// Fails on any posted payload; never handles the resulting error.
struct Flaky;

/// Fails on any posted payload and absorbs the failure.
struct Forgiving {
    failures: Arc<AtomicUsize>,
}

impl TileBehavior for Forgiving {
    fn on_custom(
        &mut self,
        _payload: &Payload,
        _ctx: &mut TileContext<'_, '_>,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::fail("transient"))
    }

    fn on_error(&mut self, _cause: &HandlerError, _ctx: &mut TileContext<'_, '_>) -> bool {
        self.failures.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Records how many registrations follow the tile whenever a payload arrives.
struct FollowerCount {
    seen: Arc<Mutex<Vec<usize>>>,
}

impl TileBehavior for FollowerCount {
    fn on_custom(
        &mut self,
        _payload: &Payload,
        ctx: &mut TileContext<'_, '_>,
    ) -> Result<(), HandlerError> {
        let count = ctx.core().follower_count();
        self.seen.lock().unwrap().push(count);
        Ok(())
    }
}

impl TileBehavior for Flaky {
    fn on_custom(
        &mut self,
        _payload: &Payload,
        _ctx: &mut TileContext<'_, '_>,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::fail("flaky"))
    }
}

#[tokio::test]
async fn new_tile_is_created_and_down() {
    let registry = registry();
    let (leaf, starts) = counting_leaf(&registry, "fresh");

    assert_eq!(leaf.state(), TileState::Created);
    assert_eq!(leaf.status(), Status::Down);
    assert_eq!(starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn starting_twice_runs_the_start_hook_once() {
    let registry = registry();
    let (leaf, starts) = counting_leaf(&registry, "leaf");

    leaf.start().unwrap();
    leaf.start().unwrap();
    wait_status(&leaf, Status::Up).await;
    sleep(Duration::from_millis(20)).await;

    assert_eq!(leaf.state(), TileState::Started);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn restart_runs_the_start_hook_again() {
    let registry = registry();
    let (leaf, starts) = counting_leaf(&registry, "leaf");

    leaf.start().unwrap();
    wait_status(&leaf, Status::Up).await;
    leaf.stop().unwrap();
    wait_state(&leaf, TileState::StoppedByParent).await;
    assert_eq!(leaf.status(), Status::Down);

    leaf.start().unwrap();
    wait_status(&leaf, Status::Up).await;
    assert_eq!(starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn composite_is_up_only_when_children_are() {
    let registry = registry();
    let (db, _) = counting_leaf(&registry, "db");
    let gate = Arc::new(tokio::sync::Notify::new());
    let opened = Arc::clone(&gate);
    let cache = Tile::builder("cache")
        .behavior(LeafFn::new(move |_ctx| {
            let opened = Arc::clone(&opened);
            Ok(StartOutcome::Pending(
                async move {
                    opened.notified().await;
                    Ok(())
                }
                .boxed(),
            ))
        }))
        .build(&registry)
        .unwrap();
    let service = Tile::builder("service")
        .managed(db.clone())
        .managed(cache.clone())
        .build(&registry)
        .unwrap();
    service.verify().unwrap();

    service.start().unwrap();
    wait_status(&db, Status::Up).await;
    wait_state(&cache, TileState::Started).await;
    sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.status(), Status::Down);
    assert_eq!(service.status(), Status::Down);

    gate.notify_one();
    wait_status(&service, Status::Up).await;
    assert_eq!(cache.status(), Status::Up);
}

#[tokio::test]
async fn child_error_stops_the_parent_until_restarted() {
    let registry = registry();
    let child = Tile::builder("child")
        .behavior(Flaky)
        .build(&registry)
        .unwrap();
    let parent = Tile::builder("parent")
        .managed(child.clone())
        .build(&registry)
        .unwrap();

    parent.start().unwrap();
    wait_status(&parent, Status::Up).await;

    child.post("boom");
    wait_state(&child, TileState::StoppedDueToError).await;
    wait_state(&parent, TileState::StoppedDueToError).await;
    wait_status(&parent, Status::Error).await;
    assert_eq!(child.status(), Status::Error);

    parent.start().unwrap();
    wait_status(&parent, Status::Up).await;
    assert_eq!(child.state(), TileState::Started);
    assert_eq!(child.status(), Status::Up);
}

#[tokio::test]
async fn stopping_the_parent_stops_managed_children() {
    let registry = registry();
    let (a, _) = counting_leaf(&registry, "a");
    let (b, _) = counting_leaf(&registry, "b");
    let parent = Tile::builder("parent")
        .managed(a.clone())
        .managed(b.clone())
        .build(&registry)
        .unwrap();

    parent.start().unwrap();
    wait_status(&parent, Status::Up).await;
    parent.stop().unwrap();

    wait_state(&a, TileState::StoppedByParent).await;
    wait_state(&b, TileState::StoppedByParent).await;
    assert_eq!(parent.state(), TileState::StoppedByParent);
}

#[tokio::test]
async fn managed_children_fail_together_and_recover_with_the_dependency() {
    let registry = registry();
    let (dependency, _) = counting_leaf(&registry, "dependency");
    let (worker, worker_starts) = counting_leaf(&registry, "worker");
    let parent = Tile::builder("parent")
        .managed(worker.clone())
        .dependent(dependency.clone())
        .build(&registry)
        .unwrap();
    assert_eq!(parent.dependent_children().len(), 1);
    assert_eq!(parent.managed_children().len(), 1);

    dependency.start().unwrap();
    parent.start().unwrap();
    wait_status(&parent, Status::Up).await;
    assert_eq!(worker_starts.load(Ordering::SeqCst), 1);

    dependency.stop().unwrap();
    wait_state(&worker, TileState::StoppedByParent).await;
    wait_status(&parent, Status::Down).await;
    assert_eq!(parent.state(), TileState::Started);

    dependency.start().unwrap();
    wait_status(&parent, Status::Up).await;
    assert_eq!(worker.state(), TileState::Started);
    assert_eq!(worker_starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn resources_are_released_in_reverse_order_on_stop() {
    let registry = registry();
    let released: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let log = Arc::clone(&released);
    let leaf = Tile::builder("holder")
        .behavior(LeafFn::new(move |ctx| {
            for name in ["socket", "pool", "cache"] {
                let log = Arc::clone(&log);
                ctx.resources().keep(name, move || {
                    Ok(ResourceFn::new(move || {
                        log.lock().unwrap().push(name);
                        Ok(())
                    }))
                })?;
            }
            Ok(StartOutcome::Ready)
        }))
        .build(&registry)
        .unwrap();

    leaf.start().unwrap();
    wait_status(&leaf, Status::Up).await;
    assert!(released.lock().unwrap().is_empty());

    leaf.stop().unwrap();
    eventually(|| released.lock().unwrap().len() == 3).await;
    assert_eq!(*released.lock().unwrap(), vec!["cache", "pool", "socket"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_keeps_state_and_closes_managed_children() {
    for _ in 0..50 {
        let registry = registry();
        let (grandchild, _) = counting_leaf(&registry, "grandchild");
        let child = Tile::builder("child")
            .managed(grandchild.clone())
            .build(&registry)
            .unwrap();
        let parent = Tile::builder("parent")
            .managed(child.clone())
            .build(&registry)
            .unwrap();

        parent.start().unwrap();
        wait_status(&parent, Status::Up).await;

        parent.close();
        parent.close();
        timeout(Duration::from_secs(5), async {
            parent.terminated().await;
            child.terminated().await;
            grandchild.terminated().await;
        })
        .await
        .expect("tiles did not terminate");

        for tile in [&parent, &child, &grandchild] {
            assert!(tile.is_closed());
            assert_eq!(tile.state(), TileState::Started, "{} changed state", tile.name());
            assert!(registry.get_coordinator(tile.name().as_str()).is_none());
        }
        assert!(parent.start().is_err());
    }
}

#[tokio::test]
async fn tracker_reflects_tile_health() {
    let registry = registry();
    let (leaf, _) = counting_leaf(&registry, "tracked");

    leaf.start().unwrap();
    wait_status(&leaf, Status::Up).await;
    eventually(|| registry.tracker().status("tracked") == Some(Status::Up)).await;
    assert!(registry.tracker().healthy().iter().any(|n| n.as_str() == "tracked"));
}

#[tokio::test]
async fn handled_error_keeps_the_tile_running() {
    let registry = registry();
    let failures = Arc::new(AtomicUsize::new(0));
    let tile = Tile::builder("forgiving")
        .behavior(Forgiving {
            failures: Arc::clone(&failures),
        })
        .build(&registry)
        .unwrap();

    tile.start().unwrap();
    wait_status(&tile, Status::Up).await;
    tile.post("oops");
    tile.post("again");
    eventually(|| failures.load(Ordering::SeqCst) == 2).await;
    sleep(Duration::from_millis(20)).await;

    assert_eq!(tile.state(), TileState::Started);
    assert_eq!(tile.status(), Status::Up);
    assert!(tile.coordinator().is_started());
}

#[tokio::test]
async fn dependency_error_reaches_every_ancestor() {
    let registry = registry();
    let db = Tile::builder("db").behavior(Flaky).build(&registry).unwrap();
    let service = Tile::builder("service")
        .dependent(db.clone())
        .build(&registry)
        .unwrap();
    let root = Tile::builder("root")
        .managed(service.clone())
        .build(&registry)
        .unwrap();

    db.start().unwrap();
    root.start().unwrap();
    wait_status(&root, Status::Up).await;

    db.post("boom");
    wait_state(&db, TileState::StoppedDueToError).await;
    wait_state(&service, TileState::StoppedDueToError).await;
    wait_state(&root, TileState::StoppedDueToError).await;
    wait_status(&root, Status::Error).await;
    assert_eq!(service.status(), Status::Error);
}

#[tokio::test]
async fn stopping_an_errored_parent_leaves_the_failed_child_alone() {
    let registry = registry();
    let broken = Tile::builder("broken")
        .behavior(Flaky)
        .build(&registry)
        .unwrap();
    let (sibling, _) = counting_leaf(&registry, "sibling");
    let parent = Tile::builder("parent")
        .managed(broken.clone())
        .managed(sibling.clone())
        .build(&registry)
        .unwrap();

    parent.start().unwrap();
    wait_status(&parent, Status::Up).await;

    broken.post("boom");
    wait_state(&parent, TileState::StoppedDueToError).await;
    wait_state(&sibling, TileState::StoppedByParent).await;

    parent.stop().unwrap();
    sleep(Duration::from_millis(20)).await;

    assert_eq!(broken.state(), TileState::StoppedDueToError);
    assert_eq!(broken.status(), Status::Error);
    assert!(!broken.coordinator().is_started());
    assert_eq!(sibling.state(), TileState::StoppedByParent);
    assert_eq!(parent.state(), TileState::StoppedDueToError);
}

#[tokio::test]
async fn failed_registration_is_not_repeated_for_followed_children() {
    let registry = registry();
    let counts: Arc<Mutex<Vec<usize>>> = Arc::default();
    let watched = Tile::builder("watched")
        .behavior(FollowerCount {
            seen: Arc::clone(&counts),
        })
        .build(&registry)
        .unwrap();
    // Frees the name "gate" while keeping a handle to the closed tile.
    let stale = Tile::builder("gate").build(&registry).unwrap();
    stale.close();
    stale.terminated().await;

    let gate = Tile::builder("gate")
        .dependent(watched.clone())
        .dependent(stale.clone())
        .build(&registry)
        .unwrap();
    watched.start().unwrap();

    gate.start().unwrap();
    wait_state(&gate, TileState::StoppedDueToError).await;

    let mut rx = gate.subscribe_state();
    let _ = rx.borrow_and_update();
    gate.start().unwrap();
    timeout(Duration::from_secs(5), async {
        loop {
            rx.changed().await.expect("state channel closed");
            if *rx.borrow() == TileState::StoppedDueToError {
                break;
            }
        }
    })
    .await
    .expect("second start did not fail");

    watched.post("count");
    eventually(|| !counts.lock().unwrap().is_empty()).await;
    assert_eq!(*counts.lock().unwrap(), vec![1]);
}
