/// Background cleanup of expired sessions and verification tokens
///
/// Expired rows are already ignored by every lookup; this only keeps the
/// tables from growing.

use foundry_shared::models::{session::Session, verification::Verification};
use sqlx::PgPool;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

pub const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Deletes expired sessions and verification tokens once
pub async fn purge_expired(pool: &PgPool) -> Result<(u64, u64), sqlx::Error> {
    let sessions = Session::purge_expired(pool).await?;
    let verifications = Verification::purge_expired(pool).await?;
    Ok((sessions, verifications))
}

/// Runs [`purge_expired`] every `every` until `shutdown` flips to `true`
pub fn spawn_purge_task(
    pool: PgPool,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match purge_expired(&pool).await {
                        Ok((sessions, verifications)) => {
                            if sessions > 0 || verifications > 0 {
                                tracing::info!(sessions, verifications, "Purged expired rows");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to purge expired rows"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Purge task stopping");
                        break;
                    }
                }
            }
        }
    })
}
