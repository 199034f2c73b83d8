//! Headless Chrome implementation of the rendering capability.
//!
//! One browser process per session and one tab per context. Every CDP call
//! blocks, so each runs on the blocking pool. Fragments are injected into an
//! `about:blank` document instead of being loaded from disk, so they have no
//! file origin and cannot read files local to the server.

use std::{
    collections::HashSet,
    ffi::OsStr,
    fmt,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use headless_chrome::{
    Browser, LaunchOptions, Tab,
    protocol::cdp::{Network, Page, types::Event},
    types::PrintToPdfOptions,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::application::render::{
    RenderContext, RenderEngine, RenderEngineError, RenderSession, RenderTarget,
};
use crate::domain::request::PdfOptions;

/// Document every context starts from before its fragment is injected.
const BLANK_DOCUMENT: &str = "about:blank";
const IDLE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct ChromeEngineConfig {
    /// Explicit browser binary; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    /// How long the network must stay quiet before a fragment counts as loaded.
    pub settle: Duration,
    /// Upper bound on waiting for a fragment's network to go idle.
    pub load_timeout: Duration,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ChromeEngine {
    config: Arc<ChromeEngineConfig>,
}

impl ChromeEngine {
    pub fn new(config: ChromeEngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn open_session(&self) -> Result<Arc<dyn RenderSession>, RenderEngineError> {
        let config = Arc::clone(&self.config);
        let started_at = Instant::now();

        let browser = blocking(RenderEngineError::Launch, move || {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .path(config.chrome_path.clone())
                .idle_browser_timeout(config.idle_timeout)
                .args(vec![OsStr::new("--disable-setuid-sandbox")])
                .build()
                .map_err(|err| RenderEngineError::Launch(err.to_string()))?;
            Browser::new(options).map_err(|err| RenderEngineError::Launch(err.to_string()))
        })
        .await?;

        info!(
            target = "presswork::infra::chrome",
            op = "chrome::launch",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "browser launched"
        );

        Ok(Arc::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            borrows: Arc::new(BrowserBorrows::default()),
            config: Arc::clone(&self.config),
        }))
    }
}

/// Counts browser handles lent to blocking calls.
///
/// The process only exits when the last handle is dropped, so closing a
/// session waits until every lent handle has come back.
#[derive(Debug, Default)]
struct BrowserBorrows {
    outstanding: AtomicUsize,
    returned: Notify,
}

impl BrowserBorrows {
    fn lend(self: &Arc<Self>) -> BrowserBorrow {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        BrowserBorrow(Arc::clone(self))
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Returns `false` if handles were still lent out when `limit` elapsed.
    async fn wait_returned(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let returned = self.returned.notified();
            if self.outstanding() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, returned).await.is_err() {
                return self.outstanding() == 0;
            }
        }
    }
}

struct BrowserBorrow(Arc<BrowserBorrows>);

impl Drop for BrowserBorrow {
    fn drop(&mut self) {
        self.0.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.0.returned.notify_waiters();
    }
}

struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    borrows: Arc<BrowserBorrows>,
    config: Arc<ChromeEngineConfig>,
}

impl ChromeSession {
    fn browser(&self) -> Result<Browser, RenderEngineError> {
        self.browser
            .lock()
            .map_err(|_| RenderEngineError::Context("browser handle poisoned".to_string()))?
            .clone()
            .ok_or_else(|| RenderEngineError::Context("session already closed".to_string()))
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, RenderEngineError> {
        let browser = self.browser()?;
        let borrow = self.borrows.lend();
        let tab = blocking(RenderEngineError::Context, move || {
            let tab = browser
                .new_tab()
                .map_err(|err| RenderEngineError::Context(err.to_string()));
            drop(browser);
            drop(borrow);
            tab
        })
        .await?;

        Ok(Box::new(ChromeContext {
            tab,
            config: Arc::clone(&self.config),
        }))
    }

    async fn close(&self) -> Result<(), RenderEngineError> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| RenderEngineError::Close("browser handle poisoned".to_string()))?
            .take();
        let Some(browser) = browser else {
            return Ok(());
        };

        if !self.borrows.wait_returned(self.config.load_timeout).await {
            warn!(
                target = "presswork::infra::chrome",
                op = "chrome::close",
                outstanding = self.borrows.outstanding(),
                "browser handles still lent out; process exits when they return"
            );
        }

        // Dropping the last handle terminates the browser process.
        blocking(RenderEngineError::Close, move || {
            drop(browser);
            Ok(())
        })
        .await
    }
}

/// In-flight requests of one tab, fed from CDP network events.
#[derive(Debug)]
struct NetworkActivity {
    state: Mutex<ActivityState>,
}

#[derive(Debug)]
struct ActivityState {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    fn new() -> Self {
        Self {
            state: Mutex::new(ActivityState {
                in_flight: HashSet::new(),
                last_change: Instant::now(),
            }),
        }
    }

    fn observe(&self, event: &Event) {
        match event {
            Event::NetworkRequestWillBeSent(sent) => self.started(&sent.params.request_id),
            Event::NetworkLoadingFinished(done) => self.finished(&done.params.request_id),
            Event::NetworkLoadingFailed(failed) => self.finished(&failed.params.request_id),
            _ => {}
        }
    }

    fn started(&self, request_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight.insert(request_id.to_string());
            state.last_change = Instant::now();
        }
    }

    fn finished(&self, request_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            if state.in_flight.remove(request_id) {
                state.last_change = Instant::now();
            }
        }
    }

    /// Time since the last request finished, or `None` while any is in flight.
    fn quiet_for(&self) -> Option<Duration> {
        let state = self.state.lock().ok()?;
        state
            .in_flight
            .is_empty()
            .then(|| state.last_change.elapsed())
    }

    /// Resolves once no request has been in flight for `quiet`.
    async fn wait_idle(&self, quiet: Duration, limit: Duration) -> Result<(), RenderEngineError> {
        let started_at = Instant::now();
        loop {
            if self.quiet_for().is_some_and(|elapsed| elapsed >= quiet) {
                return Ok(());
            }
            if started_at.elapsed() >= limit {
                return Err(RenderEngineError::Load(format!(
                    "network did not go idle within {limit:?}"
                )));
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }
}

struct ChromeContext {
    tab: Arc<Tab>,
    config: Arc<ChromeEngineConfig>,
}

#[async_trait]
impl RenderContext for ChromeContext {
    async fn load_content(&mut self, html: &str) -> Result<(), RenderEngineError> {
        let started_at = Instant::now();
        let activity = Arc::new(NetworkActivity::new());
        let tab = Arc::clone(&self.tab);
        let observer = Arc::clone(&activity);
        let html = html.to_string();

        let listener = blocking(RenderEngineError::Load, move || {
            tab.call_method(Network::Enable {
                max_total_buffer_size: None,
                max_resource_buffer_size: None,
                max_post_data_size: None,
                report_direct_socket_traffic: None,
                enable_durable_messages: None,
            })
            .map_err(load)?;
            tab.navigate_to(BLANK_DOCUMENT)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(load)?;

            let listener = tab
                .add_event_listener(Arc::new(move |event: &Event| observer.observe(event)))
                .map_err(load)?;
            let frame_id = tab
                .call_method(Page::GetFrameTree(None))
                .map_err(load)?
                .frame_tree
                .frame
                .id;
            tab.call_method(Page::SetDocumentContent { frame_id, html })
                .map_err(load)?;
            Ok(listener)
        })
        .await?;

        let idle = activity
            .wait_idle(self.config.settle, self.config.load_timeout)
            .await;
        let _ = self.tab.remove_event_listener(&listener);

        debug!(
            target = "presswork::infra::chrome",
            op = "chrome::load_content",
            result = if idle.is_ok() { "ok" } else { "error" },
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "fragment loaded"
        );
        idle
    }

    async fn render(
        &mut self,
        options: &PdfOptions,
        target: RenderTarget,
    ) -> Result<(), RenderEngineError> {
        let tab = Arc::clone(&self.tab);
        let print_options = print_options(options);
        let bytes = blocking(RenderEngineError::Render, move || {
            tab.print_to_pdf(Some(print_options))
                .map_err(|err| RenderEngineError::Render(err.to_string()))
        })
        .await?;

        debug!(
            target = "presswork::infra::chrome",
            op = "chrome::print_to_pdf",
            index = target.index(),
            bytes = bytes.len(),
            "page printed"
        );
        target.write_pdf(&bytes).await
    }

    async fn close(self: Box<Self>) -> Result<(), RenderEngineError> {
        let tab = self.tab;
        blocking(RenderEngineError::Close, move || {
            tab.close(false)
                .map(|_| ())
                .map_err(|err| RenderEngineError::Close(err.to_string()))
        })
        .await
    }
}

fn load(err: impl fmt::Display) -> RenderEngineError {
    RenderEngineError::Load(err.to_string())
}

/// Margins default to zero rather than the browser's own print margins.
pub(crate) fn print_options(options: &PdfOptions) -> PrintToPdfOptions {
    let paper = options.paper();
    PrintToPdfOptions {
        landscape: Some(options.landscape),
        display_header_footer: Some(options.display_header_footer),
        print_background: Some(options.print_background),
        scale: options.scale,
        paper_width: Some(paper.width),
        paper_height: Some(paper.height),
        margin_top: Some(options.margins.top.unwrap_or(0.0)),
        margin_bottom: Some(options.margins.bottom.unwrap_or(0.0)),
        margin_left: Some(options.margins.left.unwrap_or(0.0)),
        margin_right: Some(options.margins.right.unwrap_or(0.0)),
        page_ranges: options.page_ranges.clone(),
        header_template: options.header_template.clone(),
        footer_template: options.footer_template.clone(),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        ..Default::default()
    }
}

async fn blocking<T, F>(
    on_join_error: fn(String) -> RenderEngineError,
    call: F,
) -> Result<T, RenderEngineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RenderEngineError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| on_join_error(format!("blocking call failed: {err}")))?
}
