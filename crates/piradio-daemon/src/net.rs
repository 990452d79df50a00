//! Network helpers: the startup liveness probe and the local address shown
//! on the first station's tuning screen.

use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const OFFLINE_LABEL: &str = "offline";

/// GET `url` every `retry` until any response comes back. Returns false if
/// `cancel` fires first.
pub async fn wait_until_reachable(
    url: &str,
    retry: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("net: cannot build http client: {}", e);
            return false;
        }
    };

    let mut attempts = 0u64;
    loop {
        attempts += 1;
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return false,
            res = client.get(url).send() => res,
        };
        match attempt {
            Ok(response) => {
                info!(
                    "net: {} reachable ({}) after {} attempt(s)",
                    url,
                    response.status(),
                    attempts
                );
                return true;
            }
            Err(e) => trace!("net: {} not reachable yet: {}", url, e),
        }
        if attempts == 1 {
            info!("net: waiting for {}", url);
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(retry) => {}
        }
    }
}

/// Address of the interface holding the default route. The UDP connect
/// sends nothing; it only selects a source address.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let local_addr = socket.local_addr().ok()?;
    Some(local_addr.ip())
}

pub fn address_label() -> String {
    match local_ip() {
        Some(ip) => {
            debug!("net: local address {}", ip);
            ip.to_string()
        }
        None => OFFLINE_LABEL.to_string(),
    }
}
