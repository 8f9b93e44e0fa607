//! # Example: tile_tree
//!
//! Builds a small tile tree, watches its status reports and shows how a
//! failing configuration value propagates to the root and recovers.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait to print every [`StatusReport`].
//! - Compose leaf, configuration-aware and composite tiles with [`TileBuilder`](tilevisor::TileBuilder).
//! - Check the tree with [`Tile::verify`] before starting it.
//!
//! ## Flow
//! ```text
//! gateway (composite)
//!   ├── db        (leaf, ready after an async warm-up)
//!   └── listener  (config-aware, key "listener")
//!
//! publish {"port": 8443}  ──► listener UP ──► gateway UP
//! publish {"port": "bad"} ──► listener ERROR ──► gateway ERROR (stopped)
//! publish {"port": 9443}  ──► listener UP; gateway.start() ──► gateway UP
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example tile_tree
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tilevisor::{
    Config, ConfigurationAwareBehavior, ConfigurationChangeHandler, HandlerError,
    InMemoryConfigSource, LeafFn, LifecycleRegistry, StartOutcome, Status, StatusReport, Subscribe,
    Tile,
};

/// Prints every status report to stdout.
struct ConsoleSubscriber;

#[async_trait::async_trait]
impl Subscribe for ConsoleSubscriber {
    async fn on_report(&self, report: &StatusReport) {
        if report.removed {
            println!("[sub] #{:<3} {} removed", report.seq, report.name);
            return;
        }
        println!(
            "[sub] #{:<3} {:<9} {:<5} {}",
            report.seq,
            report.name.as_str(),
            report.status.as_label(),
            report.reason.as_deref().unwrap_or("")
        );
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[derive(Deserialize, PartialEq, Debug)]
struct ListenerConfig {
    port: u16,
}

struct Rebind;

impl ConfigurationChangeHandler<ListenerConfig> for Rebind {
    fn apply_new_configuration(
        &mut self,
        new: &ListenerConfig,
        previous: Option<&ListenerConfig>,
    ) -> BoxFuture<'static, Result<(), HandlerError>> {
        println!("[listener] binding :{} (was {:?})", new.port, previous.map(|p| p.port));
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
        .boxed()
    }
}

async fn wait_for(tile: &Tile, want: Status) -> Result<(), Box<dyn std::error::Error>> {
    let mut rx = tile.coordinator().subscribe_status();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want)).await??;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(ConsoleSubscriber)];
    let registry = LifecycleRegistry::builder(Config::default())
        .with_subscribers(subs)
        .build();
    let source = InMemoryConfigSource::new();

    let db = Tile::builder("db")
        .behavior(LeafFn::new(|_ctx| {
            Ok(StartOutcome::Pending(
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                }
                .boxed(),
            ))
        }))
        .build(&registry)?;
    let listener = Tile::builder("listener")
        .behavior(ConfigurationAwareBehavior::<ListenerConfig, _>::json(
            "listener",
            Arc::new(source.clone()),
            Rebind,
        ))
        .build(&registry)?;
    let gateway = Tile::builder("gateway")
        .managed(db)
        .managed(listener.clone())
        .build(&registry)?;
    gateway.verify()?;

    source.publish([("listener", json!({"port": 8443}))]);
    gateway.start()?;
    wait_for(&gateway, Status::Up).await?;
    println!("[main] gateway is {}", gateway.state());

    source.publish([("listener", json!({"port": "bad"}))]);
    wait_for(&gateway, Status::Error).await?;
    println!("[main] gateway is {}", gateway.state());

    source.publish([("listener", json!({"port": 9443}))]);
    wait_for(&listener, Status::Up).await?;
    gateway.start()?;
    wait_for(&gateway, Status::Up).await?;
    println!("[main] gateway is {}", gateway.state());

    gateway.close();
    gateway.terminated().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
