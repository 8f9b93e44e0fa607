use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tilevisor::{
    Config, ConfigurationAwareBehavior, ConfigurationChangeHandler, HandlerError,
    InMemoryConfigSource, LifecycleRegistry, Status, Tile, TileState,
};
use tokio::time::{sleep, timeout};

#[derive(Deserialize, Clone, Debug, PartialEq)]
struct Listener {
    port: u16,
}

type Applied = Arc<Mutex<Vec<(u16, Option<u16>)>>>;

/// Records `(new, previous)` ports and succeeds, or fails for port 0.
struct Recorder {
    applied: Applied,
}

impl ConfigurationChangeHandler<Listener> for Recorder {
    fn apply_new_configuration(
        &mut self,
        new: &Listener,
        previous: Option<&Listener>,
    ) -> BoxFuture<'static, Result<(), HandlerError>> {
        self.applied
            .lock()
            .unwrap()
            .push((new.port, previous.map(|p| p.port)));
        let port = new.port;
        async move {
            sleep(Duration::from_millis(5)).await;
            if port == 0 {
                return Err(HandlerError::fail("port 0 is reserved"));
            }
            Ok(())
        }
        .boxed()
    }
}

fn setup(name: &str) -> (Arc<LifecycleRegistry>, InMemoryConfigSource, Tile, Applied) {
    let registry = LifecycleRegistry::builder(Config::default()).build();
    let source = InMemoryConfigSource::new();
    let applied: Applied = Arc::default();
    let behavior = ConfigurationAwareBehavior::<Listener, _>::json(
        "listener",
        Arc::new(source.clone()),
        Recorder {
            applied: Arc::clone(&applied),
        },
    );
    let tile = Tile::builder(name)
        .behavior(behavior)
        .build(&registry)
        .unwrap();
    (registry, source, tile, applied)
}

async fn wait_status(tile: &Tile, want: Status) {
    let mut rx = tile.coordinator().subscribe_status();
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("{} never reached {want:?}", tile.name()))
        .expect("status channel closed");
}

fn applied(applied: &Applied) -> Vec<(u16, Option<u16>)> {
    applied.lock().unwrap().clone()
}

#[tokio::test]
async fn stays_down_until_a_value_is_published() {
    let (_registry, source, tile, log) = setup("listener-tile");

    tile.start().unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(tile.state(), TileState::Started);
    assert_eq!(tile.status(), Status::Down);
    assert!(applied(&log).is_empty());

    source.publish([("listener", json!({"port": 8080}))]);
    wait_status(&tile, Status::Up).await;
    assert_eq!(applied(&log), vec![(8080, None)]);
}

#[tokio::test]
async fn equal_values_are_applied_once() {
    let (_registry, source, tile, log) = setup("listener-tile");
    source.publish([("listener", json!({"port": 8080}))]);

    tile.start().unwrap();
    wait_status(&tile, Status::Up).await;

    source.publish([("listener", json!({"port": 8080}))]);
    source.publish([("unrelated", json!(true))]);
    sleep(Duration::from_millis(50)).await;

    assert_eq!(applied(&log), vec![(8080, None)]);
    assert_eq!(tile.status(), Status::Up);
}

#[tokio::test]
async fn new_value_is_applied_with_the_previous_one() {
    let (_registry, source, tile, log) = setup("listener-tile");
    source.publish([("listener", json!({"port": 8080}))]);

    tile.start().unwrap();
    wait_status(&tile, Status::Up).await;

    source.publish([("listener", json!({"port": 9090}))]);
    timeout(Duration::from_secs(5), async {
        while applied(&log).len() < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second value never applied");
    wait_status(&tile, Status::Up).await;

    assert_eq!(applied(&log), vec![(8080, None), (9090, Some(8080))]);
}

#[tokio::test]
async fn parse_error_reports_error_until_a_valid_value_arrives() {
    let (_registry, source, tile, log) = setup("listener-tile");
    source.publish([("listener", json!({"port": "https"}))]);

    tile.start().unwrap();
    wait_status(&tile, Status::Error).await;
    assert_eq!(tile.state(), TileState::StoppedDueToError);
    assert!(applied(&log).is_empty());

    source.publish([("listener", json!({"port": 8443}))]);
    wait_status(&tile, Status::Up).await;
    assert_eq!(tile.state(), TileState::Started);
    assert_eq!(applied(&log), vec![(8443, None)]);
}

#[tokio::test]
async fn failed_apply_reports_error() {
    let (_registry, source, tile, _log) = setup("listener-tile");
    source.publish([("listener", json!({"port": 0}))]);

    tile.start().unwrap();
    wait_status(&tile, Status::Error).await;

    source.publish([("listener", json!({"port": 1}))]);
    wait_status(&tile, Status::Up).await;
}

#[tokio::test]
async fn restart_reapplies_from_scratch() {
    let (_registry, source, tile, log) = setup("listener-tile");
    source.publish([("listener", json!({"port": 8080}))]);

    tile.start().unwrap();
    wait_status(&tile, Status::Up).await;
    assert_eq!(source.handler_count(), 1);

    tile.stop().unwrap();
    wait_status(&tile, Status::Down).await;
    assert_eq!(source.handler_count(), 0);

    tile.start().unwrap();
    wait_status(&tile, Status::Up).await;
    assert_eq!(applied(&log), vec![(8080, None), (8080, None)]);

    tile.close();
    tile.terminated().await;
    assert_eq!(source.handler_count(), 0);
}

#[tokio::test]
async fn removed_key_is_ignored() {
    let (_registry, source, tile, log) = setup("listener-tile");
    source.publish([("listener", json!({"port": 8080}))]);

    tile.start().unwrap();
    wait_status(&tile, Status::Up).await;

    source.remove("listener");
    source.remove("listener");
    assert!(source.get("listener").is_none());
    sleep(Duration::from_millis(50)).await;
    assert_eq!(tile.status(), Status::Up);
    assert_eq!(tile.state(), TileState::Started);
    assert_eq!(applied(&log), vec![(8080, None)]);

    source.publish([("listener", json!({"port": 9090}))]);
    timeout(Duration::from_secs(5), async {
        while applied(&log).len() < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("value published after removal never applied");
    assert_eq!(applied(&log), vec![(8080, None), (9090, Some(8080))]);
}
