//! Fire-and-forget dashboard sync for voice phase changes.

use super::state::VoicePhase;
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::Serialize;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);
const NOTIFY_QUEUE: usize = 16;

#[derive(Serialize)]
struct SyncBody<'a> {
    state: &'a str,
}

/// Posts `{"state": ...}` to `{dashboard}/api/sync/voice` from a background
/// thread. Publishing never blocks; a full queue drops the update.
pub struct DashboardNotifier {
    sender: Mutex<Option<Sender<VoicePhase>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DashboardNotifier {
    pub fn start(dashboard_url: &str, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()?;
        let endpoint = format!("{}/api/sync/voice", dashboard_url.trim_end_matches('/'));
        let (sender, receiver) = bounded::<VoicePhase>(NOTIFY_QUEUE);
        let worker = thread::Builder::new()
            .name("voice-notify".into())
            .spawn(move || {
                for phase in receiver {
                    let mut request = client.post(&endpoint).json(&SyncBody {
                        state: phase.label(),
                    });
                    if let Some(key) = api_key.as_deref() {
                        request = request.bearer_auth(key);
                    }
                    match request.send() {
                        Ok(response) if !response.status().is_success() => {
                            tracing::debug!(status = %response.status(), "dashboard sync rejected");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::debug!(error = %err, "dashboard sync failed"),
                    }
                }
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn dashboard notifier");
                None
            }
        };
        tracing::info!(url = %dashboard_url, "dashboard sync enabled");
        Ok(Self {
            sender: Mutex::new(worker.as_ref().map(|_| sender)),
            worker: Mutex::new(worker),
        })
    }

    pub fn publish(&self, phase: VoicePhase) {
        let guard = crate::lock_or_recover(&self.sender, "dashboard_sender");
        let Some(sender) = guard.as_ref() else {
            return;
        };
        match sender.try_send(phase) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::debug!("dashboard sync queue full, dropping update"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Close the queue and wait for in-flight posts.
    pub fn shutdown(&self) {
        crate::lock_or_recover(&self.sender, "dashboard_sender").take();
        if let Some(handle) = crate::lock_or_recover(&self.worker, "dashboard_worker").take() {
            if handle.join().is_err() {
                tracing::error!("dashboard notifier panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    #[test]
    fn posts_state_with_bearer_token() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .unwrap();
            request
        });

        let notifier =
            DashboardNotifier::start(&format!("http://{addr}/"), Some("s3cret".into())).unwrap();
        notifier.publish(VoicePhase::Listening);
        notifier.shutdown();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/sync/voice "));
        assert!(request.to_lowercase().contains("authorization: bearer s3cret"));
        assert!(request.contains(r#"{"state":"listening"}"#));
    }

    #[test]
    fn publish_after_shutdown_is_ignored() {
        let notifier = DashboardNotifier::start("http://127.0.0.1:9", None).unwrap();
        notifier.shutdown();
        notifier.publish(VoicePhase::Idle);
    }
}
