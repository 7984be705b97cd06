use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::oneshot::Receiver;
use tokio::time::sleep;

use crate::node::finger_entry::FingerEntry;
use crate::threads::chord::is_reachable;
use crate::utils::config::Config;

/// Periodically pings the predecessor and clears the handle when it stops
/// answering. A replacement arrives with the next valid notify.
pub async fn check_predecessor_periodically(
    rx: Receiver<Arc<Mutex<Option<FingerEntry>>>>,
    config: Config,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let predecessor_option_arc = rx.await?;
    let interval = Duration::from_millis(config.check_predecessor_interval_ms);

    loop {
        sleep(interval).await;

        let snapshot = { predecessor_option_arc.lock().unwrap().clone() };
        let predecessor = match snapshot {
            Some(predecessor) => predecessor,
            None => continue,
        };

        if is_reachable(&predecessor.address, config.ping_timeout()).await {
            debug!("Predecessor {} is alive", predecessor.address);
            continue;
        }

        warn!("Predecessor {} is dead.", predecessor.address);
        let mut guard = predecessor_option_arc.lock().unwrap();
        // only clear if nobody replaced it while we were pinging
        if guard
            .as_ref()
            .map(|current| current.address == predecessor.address)
            .unwrap_or(false)
        {
            *guard = None;
        }
    }
}
