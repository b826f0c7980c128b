use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use chromiumoxide::{
    browser::{Browser, BrowserConfigBuilder, HeadlessMode},
    cdp::browser_protocol::{
        network::{DisableParams as NetworkDisableParams, EnableParams as NetworkEnableParams, EventResponseReceived, ResourceType},
        page::StopLoadingParams,
    },
    Page,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{CallResult, RunnerError, CACHE_DIR_NAME, NETWORK_EVENT_BUFFER_SIZE};

/// A [`ChromeRunner`] drives a headless Chromium browser over the remote
/// debug (CDP) protocol, via the `chromiumoxide` crate.
pub struct ChromeRunner {
    pub id: usize,
    pub cache_dir: PathBuf,
    page: Option<Page>,
    events: Arc<Mutex<VecDeque<EventResponseReceived>>>,
    handler_task: Option<JoinHandle<()>>,
    forward_task: Option<JoinHandle<()>>,
    cleanup_task: Option<JoinHandle<()>>,
}

impl ChromeRunner {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            cache_dir: PathBuf::new(),
            page: None,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(NETWORK_EVENT_BUFFER_SIZE))),
            handler_task: None,
            forward_task: None,
            cleanup_task: None,
        }
    }

    /// Launches a headless browser scoped to `cancel`: the browser, the
    /// network-event listener and the per-runner cache directory are all
    /// released once `cancel` fires.
    pub async fn derive_context(&mut self, cancel: CancellationToken) -> Result<(), RunnerError> {
        let cache_dir = std::env::temp_dir()
            .join(CACHE_DIR_NAME)
            .join(self.id.to_string());
        std::fs::create_dir_all(&cache_dir)?;
        self.cache_dir = cache_dir.clone();

        let mut builder = BrowserConfigBuilder::default()
            .user_data_dir(cache_dir.clone())
            .arg("--disable-gpu")
            .headless_mode(HeadlessMode::default());
        builder = builder.arg("--no-sandbox");
        let config = builder
            .build()
            .map_err(RunnerError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(component = "runner", error = %e, "browser handler error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        let mut event_stream = page.event_listener::<EventResponseReceived>().await?;

        let events = self.events.clone();
        let forward_cancel = cancel.clone();
        let forward_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_cancel.cancelled() => break,
                    ev = event_stream.next() => {
                        let Some(ev) = ev else { break };
                        if ev.r#type != ResourceType::Document {
                            continue;
                        }
                        let mut buf = events.lock().expect("event buffer poisoned");
                        if buf.len() < NETWORK_EVENT_BUFFER_SIZE {
                            buf.push_back((*ev).clone());
                        }
                        // else: buffer full, drop. Load generation must not stall.
                    }
                }
            }
        });

        let id = self.id;
        let cleanup_cache_dir = cache_dir.clone();
        // Leaking `browser` into the cleanup task keeps the child process
        // alive until cancellation; dropping it here would kill it early.
        let cleanup_task = tokio::spawn(async move {
            cancel.cancelled().await;
            let _browser = browser;

            tracing::debug!(component = "runner", id, cachedir = %cleanup_cache_dir.display(), "delete cache");

            let mut last_err = None;
            for _ in 0..10 {
                match std::fs::remove_dir_all(&cleanup_cache_dir) {
                    Ok(()) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
            if let Some(e) = last_err {
                tracing::warn!(component = "runner", id, error = %e, "can't delete cache");
            }
        });

        self.page = Some(page);
        self.handler_task = Some(handler_task);
        self.forward_task = Some(forward_task);
        self.cleanup_task = Some(cleanup_task);

        Ok(())
    }

    pub async fn call(&mut self, url: &str) -> Result<CallResult, RunnerError> {
        tracing::debug!(component = "runner", id = self.id, url, "call url");

        let page = self
            .page
            .as_ref()
            .expect("derive_context must be called before call");

        page.execute(NetworkEnableParams::default()).await?;
        page.goto(url).await?;
        page.execute(StopLoadingParams::default()).await?;
        page.execute(NetworkDisableParams::default()).await?;

        let mut buf = self.events.lock().expect("event buffer poisoned");
        if buf.is_empty() {
            return Err(RunnerError::NoNetworkEventFound);
        }

        let mut result: Option<CallResult> = None;
        for ev in buf.drain(..) {
            let response_url = ev.response.url.strip_suffix('/').unwrap_or(&ev.response.url);
            if response_url != url {
                continue;
            }

            let (ttfb, cached) = if ev.response.timing.as_ref().map(|t| t.connect_start) == Some(-1.0) {
                (Duration::ZERO, true)
            } else {
                let timing = ev.response.timing.as_ref();
                let ms = timing
                    .map(|t| (t.receive_headers_end - t.connect_start).max(0.0))
                    .unwrap_or(0.0);
                (Duration::from_millis(ms as u64), false)
            };

            result = Some(CallResult {
                ttfb,
                http_status_code: ev.response.status as i32,
                http_status_message: ev.response.status_text.clone(),
                cached,
            });
        }

        result.ok_or(RunnerError::NoNetworkEventFound)
    }
}
