//! Recording collaborators for controller tests

use crate::{
    engine::{EngineFactory, MediaEngine, MediaSurface, PlayRejection, ReadyState},
    presenter::{ActionKind, Connectivity, Notice, PlaybackErrorKind, Presenter},
    resume::ResumeStore,
    session::{ActionTrigger, PlaybackController},
    types::SessionId,
    Error, Result, SupervisorConfig,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Attach,
    Detach,
    LoadSource(String),
    StartLoad(Option<f64>),
    StopLoad,
    RecoverMediaError,
    Destroy,
}

#[derive(Debug, Default)]
pub struct EngineLog {
    calls: Mutex<Vec<EngineCall>>,
}

impl EngineLog {
    fn push(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

struct MockEngine {
    log: Arc<EngineLog>,
    fail_teardown: bool,
}

impl MockEngine {
    fn teardown_result(&self) -> Result<()> {
        if self.fail_teardown {
            Err(Error::engine("teardown failure"))
        } else {
            Ok(())
        }
    }
}

impl MediaEngine for MockEngine {
    fn attach_media(&mut self, _surface: Arc<dyn MediaSurface>) -> Result<()> {
        self.log.push(EngineCall::Attach);
        Ok(())
    }

    fn detach_media(&mut self) -> Result<()> {
        self.log.push(EngineCall::Detach);
        self.teardown_result()
    }

    fn load_source(&mut self, url: &str) -> Result<()> {
        self.log.push(EngineCall::LoadSource(url.to_string()));
        Ok(())
    }

    fn start_load(&mut self, start_position: Option<f64>) -> Result<()> {
        self.log.push(EngineCall::StartLoad(start_position));
        Ok(())
    }

    fn stop_load(&mut self) -> Result<()> {
        self.log.push(EngineCall::StopLoad);
        self.teardown_result()
    }

    fn recover_media_error(&mut self) -> Result<()> {
        self.log.push(EngineCall::RecoverMediaError);
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.log.push(EngineCall::Destroy);
        self.teardown_result()
    }
}

pub struct MockEngineFactory {
    supported: AtomicBool,
    fail_teardown: AtomicBool,
    fail_creates: AtomicUsize,
    engines: Mutex<Vec<Arc<EngineLog>>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self {
            supported: AtomicBool::new(true),
            fail_teardown: AtomicBool::new(false),
            fail_creates: AtomicUsize::new(0),
            engines: Mutex::new(Vec::new()),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    pub fn fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `create` fail
    pub fn fail_next_creates(&self, count: usize) {
        self.fail_creates.store(count, Ordering::SeqCst);
    }

    /// Engines created so far
    pub fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn engine(&self, index: usize) -> Arc<EngineLog> {
        Arc::clone(&self.engines.lock().unwrap()[index])
    }
}

impl EngineFactory for MockEngineFactory {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn create(&self, _session: SessionId) -> Result<Box<dyn MediaEngine>> {
        let failing = self
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::engine("engine construction failed"));
        }
        let log = Arc::new(EngineLog::default());
        self.engines.lock().unwrap().push(Arc::clone(&log));
        Ok(Box::new(MockEngine {
            log,
            fail_teardown: self.fail_teardown.load(Ordering::SeqCst),
        }))
    }
}

struct SurfaceState {
    current_time: f64,
    duration: f64,
    paused: bool,
    ended: bool,
    ready_state: ReadyState,
    native_hls: bool,
    source: Option<String>,
    play_results: VecDeque<std::result::Result<(), PlayRejection>>,
    play_calls: usize,
    seeks: Vec<f64>,
}

pub struct MockSurface {
    state: Mutex<SurfaceState>,
}

impl MockSurface {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                current_time: 0.0,
                duration: f64::INFINITY,
                paused: true,
                ended: false,
                ready_state: ReadyState::HaveEnoughData,
                native_hls: false,
                source: None,
                play_results: VecDeque::new(),
                play_calls: 0,
                seeks: Vec::new(),
            }),
        }
    }

    /// Move the playhead without recording a seek
    pub fn set_current_time_value(&self, position: f64) {
        self.state.lock().unwrap().current_time = position;
    }

    pub fn set_duration(&self, duration: f64) {
        self.state.lock().unwrap().duration = duration;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().unwrap().ready_state = ready_state;
    }

    pub fn set_native_hls(&self, native: bool) {
        self.state.lock().unwrap().native_hls = native;
    }

    /// Queue the outcome of the next `play()`; unqueued calls succeed
    pub fn push_play_result(&self, result: std::result::Result<(), PlayRejection>) {
        self.state.lock().unwrap().play_results.push_back(result);
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }
}

#[async_trait]
impl MediaSurface for MockSurface {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    fn set_current_time(&self, position: f64) {
        let mut state = self.state.lock().unwrap();
        state.current_time = position;
        state.seeks.push(position);
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn ended(&self) -> bool {
        self.state.lock().unwrap().ended
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready_state
    }

    async fn play(&self) -> std::result::Result<(), PlayRejection> {
        let mut state = self.state.lock().unwrap();
        state.play_calls += 1;
        let result = state.play_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            state.paused = false;
        }
        result
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn load(&self) {}

    fn set_source(&self, url: Option<&str>) {
        self.state.lock().unwrap().source = url.map(str::to_string);
    }

    fn supports_native_hls(&self) -> bool {
        self.state.lock().unwrap().native_hls
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenterCall {
    ShowLoading(String),
    HideLoading,
    ShowError(PlaybackErrorKind, Vec<ActionKind>),
    ShowOverlay(PlaybackErrorKind, Vec<ActionKind>),
    Notify(PlaybackErrorKind),
    Dismiss(PlaybackErrorKind),
    Clear,
}

#[derive(Default)]
pub struct MockPresenter {
    calls: Mutex<Vec<PresenterCall>>,
    notices: Mutex<Vec<Notice>>,
}

impl MockPresenter {
    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &PresenterCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    /// Kinds passed to `show_error`, in order
    pub fn errors(&self) -> Vec<PlaybackErrorKind> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                PresenterCall::ShowError(kind, _) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    /// Kinds passed to `show_overlay`, in order
    pub fn overlays(&self) -> Vec<PlaybackErrorKind> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                PresenterCall::ShowOverlay(kind, _) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<PlaybackErrorKind> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                PresenterCall::Notify(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    /// Latest notice of `kind` shown as an error or overlay
    pub fn last_notice(&self, kind: PlaybackErrorKind) -> Option<Notice> {
        self.notices.lock().unwrap().iter().rev().find(|n| n.kind == kind).cloned()
    }

    /// Trigger of the latest notice of `kind` with an `action` button
    pub fn trigger(&self, kind: PlaybackErrorKind, action: ActionKind) -> Option<ActionTrigger> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|n| n.kind == kind)
            .flat_map(|n| n.actions.iter())
            .find(|a| a.kind == action)
            .map(|a| a.trigger.clone())
    }

    fn record(&self, call: PresenterCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Presenter for MockPresenter {
    fn show_loading(&self, name: &str) {
        self.record(PresenterCall::ShowLoading(name.to_string()));
    }

    fn hide_loading(&self) {
        self.record(PresenterCall::HideLoading);
    }

    fn show_error(&self, notice: Notice) {
        self.record(PresenterCall::ShowError(notice.kind, notice.action_kinds()));
        self.notices.lock().unwrap().push(notice);
    }

    fn show_overlay(&self, notice: Notice) {
        self.record(PresenterCall::ShowOverlay(notice.kind, notice.action_kinds()));
        self.notices.lock().unwrap().push(notice);
    }

    fn notify(&self, kind: PlaybackErrorKind, _message: &str) {
        self.record(PresenterCall::Notify(kind));
    }

    fn dismiss(&self, kind: PlaybackErrorKind) {
        self.record(PresenterCall::Dismiss(kind));
    }

    fn clear(&self) {
        self.record(PresenterCall::Clear);
    }
}

pub struct MockConnectivity {
    online: AtomicBool,
}

impl MockConnectivity {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for MockConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Controller wired to recording collaborators
pub struct Harness {
    pub controller: PlaybackController,
    pub factory: Arc<MockEngineFactory>,
    pub surface: Arc<MockSurface>,
    pub presenter: Arc<MockPresenter>,
    pub connectivity: Arc<MockConnectivity>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(SupervisorConfig::default(), None)
    }

    pub fn with_resume(store: Arc<dyn ResumeStore>) -> Self {
        Self::build(SupervisorConfig::default(), Some(store))
    }

    pub fn with_config(config: SupervisorConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: SupervisorConfig, store: Option<Arc<dyn ResumeStore>>) -> Self {
        let factory = Arc::new(MockEngineFactory::new());
        let surface = Arc::new(MockSurface::new());
        let presenter = Arc::new(MockPresenter::default());
        let connectivity = Arc::new(MockConnectivity {
            online: AtomicBool::new(true),
        });

        let mut builder = PlaybackController::builder(factory.clone(), surface.clone(), presenter.clone())
            .config(config)
            .connectivity(connectivity.clone());
        if let Some(store) = store {
            builder = builder.resume_store(store);
        }
        let controller = builder.build().unwrap();

        Self {
            controller,
            factory,
            surface,
            presenter,
            connectivity,
        }
    }
}
