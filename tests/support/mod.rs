//! Scripted rendering engine for exercising the render pipeline without a browser.
#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use presswork::{
    application::render::{
        BrowserSessionManager, RenderContext, RenderCoordinator, RenderEngine, RenderEngineError,
        RenderLimits, RenderSession, RenderTarget, TempResourceManager,
    },
    domain::request::PdfOptions,
    infra::http::{AppState, build_router},
};
use tempfile::TempDir;

/// Counters observed by the tests.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub completed: Mutex<Vec<String>>,
}

impl EngineStats {
    pub fn opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().expect("completion log").clone()
    }
}

/// Behaviour keyed by fragment HTML. A fragment `"B1|B2"` renders two pages.
#[derive(Debug, Default, Clone)]
pub struct FakeEngine {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    garbage: HashSet<String>,
    panics: HashSet<String>,
    launch_fails: bool,
    stats: Arc<EngineStats>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, html: &str, millis: u64) -> Self {
        self.delays
            .insert(html.to_string(), Duration::from_millis(millis));
        self
    }

    pub fn fail(mut self, html: &str) -> Self {
        self.failures.insert(html.to_string());
        self
    }

    /// Render invalid bytes instead of a PDF for this fragment.
    pub fn garbage(mut self, html: &str) -> Self {
        self.garbage.insert(html.to_string());
        self
    }

    /// Panic while loading this fragment.
    pub fn panic(mut self, html: &str) -> Self {
        self.panics.insert(html.to_string());
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.launch_fails = true;
        self
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn open_session(&self) -> Result<Arc<dyn RenderSession>, RenderEngineError> {
        if self.launch_fails {
            return Err(RenderEngineError::Launch("no browser available".to_string()));
        }
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            engine: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeSession {
    engine: FakeEngine,
    closed: AtomicBool,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, RenderEngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderEngineError::Context("session closed".to_string()));
        }
        let stats = &self.engine.stats;
        stats.contexts_opened.fetch_add(1, Ordering::SeqCst);
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakeContext {
            engine: self.engine.clone(),
            html: None,
        }))
    }

    async fn close(&self) -> Result<(), RenderEngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(RenderEngineError::Close("session closed twice".to_string()));
        }
        self.engine
            .stats
            .sessions_closed
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    engine: FakeEngine,
    html: Option<String>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn load_content(&mut self, html: &str) -> Result<(), RenderEngineError> {
        if let Some(delay) = self.engine.delays.get(html) {
            tokio::time::sleep(*delay).await;
        }
        if self.engine.panics.contains(html) {
            panic!("engine crashed on `{html}`");
        }
        if self.engine.failures.contains(html) {
            return Err(RenderEngineError::Load(format!("cannot load `{html}`")));
        }
        self.html = Some(html.to_string());
        Ok(())
    }

    async fn render(
        &mut self,
        _options: &PdfOptions,
        target: RenderTarget,
    ) -> Result<(), RenderEngineError> {
        let html = self
            .html
            .clone()
            .ok_or_else(|| RenderEngineError::Render("nothing loaded".to_string()))?;

        let bytes = if self.engine.garbage.contains(&html) {
            b"not a pdf".to_vec()
        } else {
            let labels: Vec<&str> = html.split('|').collect();
            labelled_pdf(&labels)
        };
        target.write_pdf(&bytes).await?;

        self.engine
            .stats
            .completed
            .lock()
            .expect("completion log")
            .push(html);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RenderEngineError> {
        self.engine
            .stats
            .contexts_closed
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.engine.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One page per label; each page shows its label.
pub fn labelled_pdf(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for label in labels {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 18.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*label)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save pdf");
    buffer
}

/// Labels of every page in page order.
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|page_id| {
            let content = doc.get_page_content(*page_id).expect("page content");
            Content::decode(&content)
                .expect("decode content")
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| op.operands.first())
                .filter_map(|operand| operand.as_str().ok())
                .map(|text| String::from_utf8_lossy(text).into_owned())
                .collect::<String>()
        })
        .collect()
}

pub struct Harness {
    pub dir: TempDir,
    pub stats: Arc<EngineStats>,
    pub coordinator: Arc<RenderCoordinator>,
}

impl Harness {
    pub fn new(engine: FakeEngine) -> Self {
        Self::with_limits(engine, 8, Duration::from_secs(10))
    }

    pub fn with_limits(engine: FakeEngine, max_concurrent_pages: usize, timeout: Duration) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let stats = engine.stats();
        let artifacts =
            TempResourceManager::new(dir.path().join("artifacts")).expect("artifact manager");
        let sessions = BrowserSessionManager::new(
            Arc::new(engine),
            NonZeroUsize::new(4).expect("non-zero"),
        );
        let coordinator = RenderCoordinator::new(
            sessions,
            artifacts,
            RenderLimits {
                max_concurrent_pages: NonZeroUsize::new(max_concurrent_pages)
                    .expect("non-zero concurrency"),
                request_timeout: timeout,
            },
        );

        Self {
            dir,
            stats,
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    /// Files left in the artifact directory.
    pub fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.artifact_dir())
            .expect("read artifact dir")
            .count()
    }

    pub fn router(&self, max_pages: usize) -> Router {
        build_router(
            AppState::new(Arc::clone(&self.coordinator), max_pages),
            1024 * 1024,
        )
    }
}
