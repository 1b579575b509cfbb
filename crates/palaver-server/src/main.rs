mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use palaver_api::{AppStateInner, build_router};
use palaver_gateway::dispatcher::Dispatcher;
use palaver_gossip::{GossipConfig, GossipEngine, SyncCoordinator};
use palaver_node::Node;

use config::Config;

/// Peers tried per on-demand room sync before giving up.
const SYNC_MAX_ATTEMPTS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and seed statically configured peers
    let db = Arc::new(palaver_db::Database::open(&PathBuf::from(&config.db_path))?);
    for addr in &config.peers {
        db.add_peer_if_absent(addr)?;
    }

    let dispatcher = Dispatcher::new();
    let node = palaver_node::shared_node();

    // Restart path: a persisted (or pre-seeded) identity brings the
    // node up initialized, clock rebuilt from the store.
    let identity = match db.node_identity()? {
        Some(identity) => Some(identity),
        None => match &config.node_id {
            Some(seed) => Some(db.persist_node_identity(seed)?),
            None => None,
        },
    };
    if let Some(identity) = identity {
        let restored = Node::restore(db.clone(), dispatcher.clone(), identity.clone()).await?;
        *node.write().await = Some(Arc::new(restored));
        info!("Node restored as '{}'", identity);
    } else {
        info!("Node awaiting initialization");
    }

    // Shared state
    let sync = SyncCoordinator::new(
        config.advertised_addr.clone(),
        config.peer_timeout,
        SYNC_MAX_ATTEMPTS,
    )?;
    let state = Arc::new(AppStateInner {
        db,
        dispatcher,
        node: node.clone(),
        sync,
    });

    // Background anti-entropy loop
    let engine = GossipEngine::new(
        node,
        GossipConfig {
            advertised_addr: config.advertised_addr.clone(),
            interval: config.gossip_interval,
            fanout: config.gossip_fanout,
            peer_timeout: config.peer_timeout,
            ..GossipConfig::default()
        },
    )?;
    let gossip_task = tokio::spawn(engine.run());

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Palaver node listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    // Ticks are independent; aborting between them loses nothing.
    gossip_task.abort();

    Ok(())
}
