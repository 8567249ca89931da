//! Periodic background tasks.
//!
//! - transport ping to every open connection
//! - `server-heartbeat` event to every open connection
//! - stale session sweep
//! - expired room sweep
//!
//! The tasks are spawned together and aborted together when the returned
//! [`Maintenance`] handle is dropped.

use crate::rooms::RoomManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Task periods.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub ping_interval: Duration,
    pub heartbeat_interval: Duration,
    pub session_sweep_interval: Duration,
    pub room_sweep_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(45),
            session_sweep_interval: Duration::from_secs(10 * 60),
            room_sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Handle to the running tasks.
pub struct Maintenance {
    tasks: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawn every task on the current runtime.
    #[must_use]
    pub fn spawn(manager: Arc<RoomManager>, config: &MaintenanceConfig) -> Self {
        let tasks = vec![
            every(config.ping_interval, {
                let manager = manager.clone();
                move || {
                    let manager = manager.clone();
                    async move {
                        let sent = manager.router().ping_all();
                        trace!(connections = sent, "Ping sent");
                    }
                }
            }),
            every(config.heartbeat_interval, {
                let manager = manager.clone();
                move || {
                    let manager = manager.clone();
                    async move {
                        let sent = manager.router().heartbeat_all();
                        trace!(connections = sent, "Heartbeat sent");
                    }
                }
            }),
            every(config.session_sweep_interval, {
                let manager = manager.clone();
                move || {
                    let manager = manager.clone();
                    async move {
                        match manager.expire_stale_sessions().await {
                            Ok(count) => debug!(count, "Session sweep complete"),
                            Err(err) => warn!(error = %err, "Session sweep failed"),
                        }
                    }
                }
            }),
            every(config.room_sweep_interval, move || {
                let manager = manager.clone();
                async move {
                    match manager.cleanup_expired_rooms().await {
                        Ok(count) => debug!(count, "Room sweep complete"),
                        Err(err) => warn!(error = %err, "Room sweep failed"),
                    }
                }
            }),
        ];
        Self { tasks }
    }

    /// Abort every task.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run `job` every `period`, starting one period from now.
fn every<F, Fut>(period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            job().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use crate::store::Store;
    use crate::test_support::Harness;
    use huddle_protocol::ServerEvent;

    #[tokio::test(start_paused = true)]
    async fn test_liveness_schedule() {
        let h = Harness::new();
        let mut client = h.connect();
        let _maintenance = Maintenance::spawn(h.manager.clone(), &MaintenanceConfig::default());

        time::sleep(Duration::from_secs(31)).await;
        assert!(matches!(client.drain().as_slice(), [Outbound::Ping]));

        time::sleep(Duration::from_secs(15)).await;
        match client.drain().as_slice() {
            [Outbound::Event(event)] => assert_eq!(**event, ServerEvent::ServerHeartbeat),
            other => panic!("Expected heartbeat, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_stop_on_drop() {
        let h = Harness::new();
        let mut client = h.connect();
        let maintenance = Maintenance::spawn(h.manager.clone(), &MaintenanceConfig::default());
        drop(maintenance);

        time::sleep(Duration::from_secs(120)).await;
        assert!(client.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_sweep_runs() {
        let h = Harness::new();
        let room = h
            .manager
            .create_room(crate::rooms::NewRoom {
                name: "Brief".into(),
                expires_at: Some(h.now() + 1_000),
                ..Default::default()
            })
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(2));

        let _maintenance = Maintenance::spawn(h.manager.clone(), &MaintenanceConfig::default());
        time::sleep(Duration::from_secs(301)).await;

        assert!(h.store.room(&room.id).await.unwrap().is_none());
    }
}
