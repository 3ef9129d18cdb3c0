//! netpool demo
//!
//! Starts a local echo server, seeds a pool against it, and runs a handful of
//! concurrent workers that check connections out, talk to the server, and hand
//! them back. One worker in every few marks its connection unusable so the pool
//! has to dial replacements.

use std::net::SocketAddr;

use anyhow::Context;
use netpool::{ConnectionConfig, Pool, PoolConfig, TcpConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

const WORKERS: usize = 6;
const ROUNDS: usize = 5;

async fn spawn_echo_server() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind echo listener")?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((mut stream, peer)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(%peer, error = %e, "echo connection failed");
                            break;
                        }
                    }
                }
            });
        }
    });

    Ok(addr)
}

async fn worker(pool: Pool<tokio::net::TcpStream>, target: ConnectionConfig, id: usize) -> anyhow::Result<()> {
    for round in 0..ROUNDS {
        let mut conn = pool.get(&target).await?;

        let message = format!("worker {id} round {round}");
        conn.write_all(message.as_bytes()).await?;
        let mut reply = vec![0u8; message.len()];
        conn.read_exact(&mut reply).await?;

        if (id + round) % 4 == 0 {
            conn.mark_unusable();
        }
        conn.close().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,netpool=debug".into()),
        )
        .with_target(true)
        .init();

    let addr = spawn_echo_server().await?;
    info!(%addr, "echo server listening");

    let target = ConnectionConfig::tcp(addr.to_string());
    let config = PoolConfig::builder(TcpConnector::new().connect_timeout_ms(2000))
        .initial_capacity(3)
        .max_capacity(4)
        .connection_configs(std::iter::repeat_n(target.clone(), 3))
        .debug_mode(true)
        .build()?;

    let pool = Pool::new(config).await.context("failed to bootstrap pool")?;
    info!(pool_id = %pool.id(), idle = pool.size(), "pool ready");

    let handles: Vec<_> = (0..WORKERS)
        .map(|id| tokio::spawn(worker(pool.clone(), target.clone(), id)))
        .collect();
    for handle in handles {
        handle.await??;
    }

    let stats = pool.stats();
    info!(
        hit_ratio = stats.hit_ratio(),
        created = stats.connections_created,
        "workers finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    pool.close().await?;
    info!(closed = pool.is_closed(), "pool shut down");
    Ok(())
}
