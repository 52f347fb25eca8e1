//! Playback Session Controller - main orchestrator for one stream
//!
//! Coordinates:
//! - Engine lifecycle (create, attach, load, tear down)
//! - State machine transitions
//! - Pre-start retries with backoff
//! - Post-start buffering health and in-band recovery
//! - Signal-loss latching
//! - Escalation to the presenter
//!
//! All entry points are serialised through one lock on the session slot, so
//! engine callbacks, timer ticks and user actions interleave one at a time.
//! Every delayed callback carries the [`SessionId`] it was scheduled for and
//! is inert once that session is gone.

use crate::{
    config::SupervisorConfig,
    engine::{
        EngineErrorEvent, EngineEvent, EngineFactory, ErrorDetails, ErrorType, MediaEngine,
        MediaSurface, PlayRejection, SurfaceEvent,
    },
    fragments::{FragmentErrorKind, FragmentErrorLog},
    health::{classify, BufferingEventKind, BufferingLog, HealthAction, PlayheadSampler},
    presenter::{Action, ActionKind, AlwaysOnline, Connectivity, Notice, PlaybackErrorKind, Presenter},
    resume::{ResumeRecord, ResumeStore},
    retry::RetryPolicy,
    stream_end::StreamEndDetector,
    types::*,
    Error, Result,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One playback attempt against one stream URL
struct Session {
    id: SessionId,
    request: PlaybackRequest,
    state: PlaybackState,
    playback_started: bool,
    autoplay_blocked_shown: bool,
    autoplay_dialog_open: bool,
    engine: Option<Box<dyn MediaEngine>>,
    /// Surface plays the URL itself; only surface events drive the session
    native: bool,
    retry: RetryPolicy,
    retry_pending: bool,
    buffering: BufferingLog,
    sampler: PlayheadSampler,
    recovery_attempts: u32,
    recovery_in_flight: bool,
    severe_shown: bool,
    fragments: FragmentErrorLog,
    stream_end: StreamEndDetector,
    /// Overlay currently on screen
    overlay: Option<PlaybackErrorKind>,
    /// Playhead to restore after a background reload
    pending_restore: Option<f64>,
    /// Root token; cancelled on tear-down
    cancel: CancellationToken,
    /// Loading timeout, network check, retry back-off
    loading: CancellationToken,
    /// Health sampling, resume saves, recovery phases
    monitors: CancellationToken,
}

impl Session {
    fn new(id: SessionId, request: PlaybackRequest, config: &SupervisorConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            id,
            request,
            state: PlaybackState::Idle,
            playback_started: false,
            autoplay_blocked_shown: false,
            autoplay_dialog_open: false,
            engine: None,
            native: false,
            retry: RetryPolicy::new(config.retry.clone()),
            retry_pending: false,
            buffering: BufferingLog::new(config.health.clone()),
            sampler: PlayheadSampler::default(),
            recovery_attempts: 0,
            recovery_in_flight: false,
            severe_shown: false,
            fragments: FragmentErrorLog::new(config.fragments.clone()),
            stream_end: StreamEndDetector::new(),
            overlay: None,
            pending_restore: None,
            loading: cancel.child_token(),
            monitors: cancel.child_token(),
            cancel,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            url: self.request.url.clone(),
            name: self.request.name.clone(),
            state: self.state,
            playback_started: self.playback_started,
            stream_ended: self.stream_end.is_latched(),
            autoplay_blocked_shown: self.autoplay_blocked_shown,
            native_playback: self.native,
            retry_attempts: self.retry.attempts(),
            recovery_attempts: self.recovery_attempts,
            buffering_events: self.buffering.len(),
            fragment_errors: self.fragments.len(),
        }
    }

    fn renew_loading_token(&mut self) {
        self.loading.cancel();
        self.loading = self.cancel.child_token();
    }

    fn renew_monitor_token(&mut self) {
        self.monitors.cancel();
        self.monitors = self.cancel.child_token();
    }
}

/// Delayed work owned by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Retry,
    LoadingTimeout,
    NetworkCheck,
    HealthTick,
    ResumeSave,
    AutoplayCheck,
    RecoveryReload { attempt: u32 },
    RecoverySeek { attempt: u32 },
}

/// Why the surface is asked to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayIntent {
    /// First play of the session; rejections are start failures
    Start,
    /// Recovery, restore or user gesture; rejections are logged
    Resume,
}

/// Work left for after the session lock is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    Nothing,
    Play(PlayIntent),
}

struct Shared {
    config: SupervisorConfig,
    factory: Arc<dyn EngineFactory>,
    surface: Arc<dyn MediaSurface>,
    presenter: Arc<dyn Presenter>,
    connectivity: Arc<dyn Connectivity>,
    resume: Option<Arc<dyn ResumeStore>>,
    generation: AtomicU64,
    state_tx: watch::Sender<PlaybackState>,
    session: Mutex<Option<Session>>,
}

/// Button callback captured when a notice is created
///
/// Holds only a weak reference to the controller and the id of the session
/// that showed the notice; firing it after that session is gone does nothing.
#[derive(Clone)]
pub struct ActionTrigger {
    controller: Weak<Shared>,
    session: SessionId,
    kind: ActionKind,
}

impl ActionTrigger {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Run the action against the session that created it
    ///
    /// Fails with [`Error::StaleSession`] once that session has been closed
    /// or replaced, and with [`Error::NoSession`] once the controller is gone.
    pub async fn fire(&self) -> Result<()> {
        let shared = self.controller.upgrade().ok_or(Error::NoSession)?;
        let controller = PlaybackController { shared };
        if controller.current_session().await != Some(self.session) {
            debug!(session = %self.session, kind = ?self.kind, "Trigger for stale session");
            return Err(Error::StaleSession {
                session: self.session.generation(),
            });
        }
        controller.handle_action(self.session, self.kind).await;
        Ok(())
    }
}

impl std::fmt::Debug for ActionTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTrigger")
            .field("session", &self.session)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Builder for [`PlaybackController`]
pub struct PlaybackControllerBuilder {
    factory: Arc<dyn EngineFactory>,
    surface: Arc<dyn MediaSurface>,
    presenter: Arc<dyn Presenter>,
    config: SupervisorConfig,
    connectivity: Arc<dyn Connectivity>,
    resume: Option<Arc<dyn ResumeStore>>,
}

impl PlaybackControllerBuilder {
    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn resume_store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.resume = Some(store);
        self
    }

    pub fn build(self) -> Result<PlaybackController> {
        self.config.validate()?;
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Ok(PlaybackController {
            shared: Arc::new(Shared {
                config: self.config,
                factory: self.factory,
                surface: self.surface,
                presenter: self.presenter,
                connectivity: self.connectivity,
                resume: self.resume,
                generation: AtomicU64::new(0),
                state_tx,
                session: Mutex::new(None),
            }),
        })
    }
}

/// Supervisor for one media surface; cheap to clone
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    /// Start building a controller around its collaborators
    pub fn builder(
        factory: Arc<dyn EngineFactory>,
        surface: Arc<dyn MediaSurface>,
        presenter: Arc<dyn Presenter>,
    ) -> PlaybackControllerBuilder {
        PlaybackControllerBuilder {
            factory,
            surface,
            presenter,
            config: SupervisorConfig::default(),
            connectivity: Arc::new(AlwaysOnline),
            resume: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        *self.shared.state_tx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state_tx.subscribe()
    }

    /// Id of the live session, if any
    pub async fn current_session(&self) -> Option<SessionId> {
        self.shared.session.lock().await.as_ref().map(|s| s.id)
    }

    /// Flags and counters of the live session
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.session.lock().await.as_ref().map(Session::snapshot)
    }

    /// Open a session for `url`, tearing down any previous one first
    pub async fn play(&self, url: impl Into<String>, name: impl Into<String>) -> SessionId {
        self.play_request(PlaybackRequest::new(url, name)).await
    }

    /// Open a session from a full request
    #[instrument(skip(self, request), fields(url = %request.url, name = %request.name))]
    pub async fn play_request(&self, request: PlaybackRequest) -> SessionId {
        let mut slot = self.shared.session.lock().await;
        if let Some(previous) = slot.take() {
            self.teardown(previous);
        }

        let id = SessionId(self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1);
        let mut session = Session::new(id, request, &self.shared.config);
        info!(session = %id, "Opening session");

        self.transition(&mut session, PlaybackState::Loading);
        self.start_engine(&mut session, true);
        if session.state == PlaybackState::Loading {
            self.schedule_loading_timers(&session);
        }

        *slot = Some(session);
        id
    }

    /// Re-enter loading with fresh counters and a fresh engine
    #[instrument(skip(self))]
    pub async fn retry(&self) -> Result<()> {
        let mut slot = self.shared.session.lock().await;
        let session = slot.as_mut().ok_or(Error::NoSession)?;
        self.restart(session)
    }

    /// Re-create the engine without the loading UI, restoring the playhead
    #[instrument(skip(self))]
    pub async fn reload_in_background(&self) -> Result<()> {
        let mut slot = self.shared.session.lock().await;
        let session = slot.as_mut().ok_or(Error::NoSession)?;
        if session.stream_end.is_latched() {
            return Err(Error::StreamEnded);
        }
        if !session.state.is_post_start() {
            return Err(Error::InvalidOperation {
                operation: "reload_in_background",
                state: session.state.to_string(),
            });
        }
        self.background_reload(session);
        Ok(())
    }

    /// Tear down the session; no-op when idle
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let mut slot = self.shared.session.lock().await;
        self.close_slot(&mut slot);
    }

    /// Latch signal loss for `session` (idempotent)
    pub async fn handle_no_signal(&self, session: SessionId) {
        let mut slot = self.shared.session.lock().await;
        let Some(session) = Self::current(&mut slot, session) else {
            return;
        };
        if session.stream_end.latch() {
            self.enter_no_signal(session);
        }
    }

    /// Feed an engine event for `session`
    #[instrument(skip(self, event))]
    pub async fn handle_engine_event(&self, session: SessionId, event: EngineEvent) {
        let follow_up = {
            let mut slot = self.shared.session.lock().await;
            let Some(session) = Self::current(&mut slot, session) else {
                debug!(?event, "Engine event for stale session ignored");
                return;
            };
            if session.stream_end.is_latched() {
                debug!(?event, "Engine event ignored after signal loss");
                return;
            }
            self.on_engine_event(session, event)
        };
        self.follow_up(session, follow_up).await;
    }

    /// Feed a media surface event for `session`
    #[instrument(skip(self, event))]
    pub async fn handle_surface_event(&self, session: SessionId, event: SurfaceEvent) {
        let follow_up = {
            let mut slot = self.shared.session.lock().await;
            let Some(session) = Self::current(&mut slot, session) else {
                debug!(?event, "Surface event for stale session ignored");
                return;
            };
            if session.stream_end.is_latched() {
                debug!(?event, "Surface event ignored after signal loss");
                return;
            }
            self.on_surface_event(session, event)
        };
        self.follow_up(session, follow_up).await;
    }

    /// Run a notice button for `session`
    #[instrument(skip(self))]
    pub async fn handle_action(&self, session: SessionId, kind: ActionKind) {
        let follow_up = {
            let mut slot = self.shared.session.lock().await;
            if kind == ActionKind::Close {
                if matches!(&*slot, Some(current) if current.id == session) {
                    self.close_slot(&mut slot);
                }
                return;
            }
            let Some(current) = Self::current(&mut slot, session) else {
                debug!("Action for stale session ignored");
                return;
            };
            self.on_action(current, kind)
        };
        self.follow_up(session, follow_up).await;
    }

    fn current(slot: &mut Option<Session>, id: SessionId) -> Option<&mut Session> {
        slot.as_mut().filter(|s| s.id == id)
    }

    fn close_slot(&self, slot: &mut Option<Session>) {
        if let Some(session) = slot.take() {
            self.teardown(session);
            self.shared.state_tx.send_replace(PlaybackState::Idle);
        }
    }

    /// Transition to new state
    fn transition(&self, session: &mut Session, to: PlaybackState) -> bool {
        let from = session.state;
        if from == to && to != PlaybackState::Loading {
            return true;
        }
        if !from.can_transition_to(to) {
            let err = Error::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            };
            warn!(session = %session.id, error = %err, "Rejected state transition");
            return false;
        }
        session.state = to;
        self.shared.state_tx.send_replace(to);
        info!(session = %session.id, from = %from, to = %to, "State transition");
        true
    }

    // ---------------------------------------------------------------------
    // Engine lifecycle
    // ---------------------------------------------------------------------

    fn start_engine(&self, session: &mut Session, show_loading: bool) {
        if show_loading {
            self.shared.presenter.show_loading(&session.request.name);
        }

        if !self.shared.factory.is_supported() {
            if self.shared.surface.supports_native_hls() {
                info!(session = %session.id, "Engine unsupported; using native playback");
                session.native = true;
                self.shared.surface.set_source(Some(&session.request.url));
                self.shared.surface.load();
            } else {
                self.fail_terminal(session, PlaybackErrorKind::Unsupported, None);
            }
            return;
        }

        match self.create_engine(session.id, &session.request.url) {
            Ok(engine) => session.engine = Some(engine),
            Err(Error::EngineUnavailable) => {
                self.fail_terminal(session, PlaybackErrorKind::Unsupported, None);
            }
            Err(e) if e.is_recoverable() => {
                warn!(session = %session.id, error = %e, code = e.error_code(), "Engine start failed");
                self.schedule_retry(session, "engine start failed");
            }
            Err(e) => {
                warn!(session = %session.id, error = %e, code = e.error_code(), "Engine cannot start");
                self.fail_terminal(session, PlaybackErrorKind::StreamFailedToStart, Some(e.to_string()));
            }
        }
    }

    fn create_engine(&self, id: SessionId, url: &str) -> Result<Box<dyn MediaEngine>> {
        let mut engine = self.shared.factory.create(id)?;
        let started = engine
            .attach_media(Arc::clone(&self.shared.surface))
            .and_then(|_| engine.load_source(url));
        if let Err(e) = started {
            if let Err(destroy_err) = engine.destroy() {
                warn!(error = %destroy_err, "Engine destroy failed after start error");
            }
            return Err(e);
        }
        debug!(session = %id, "Engine attached and loading");
        Ok(engine)
    }

    /// Stop, detach and destroy the engine; failures are logged only
    fn release_engine(&self, session: &mut Session) {
        let Some(mut engine) = session.engine.take() else {
            return;
        };
        if let Err(e) = engine.stop_load() {
            warn!(session = %session.id, error = %e, "Engine stop failed during tear-down");
        }
        if let Err(e) = engine.detach_media() {
            warn!(session = %session.id, error = %e, "Engine detach failed during tear-down");
        }
        if let Err(e) = engine.destroy() {
            warn!(session = %session.id, error = %e, "Engine destroy failed during tear-down");
        }
    }

    fn stop_loading(&self, session: &mut Session) {
        if let Some(engine) = session.engine.as_mut() {
            if let Err(e) = engine.stop_load() {
                warn!(session = %session.id, error = %e, "Engine stop failed");
            }
        }
    }

    fn teardown(&self, mut session: Session) {
        info!(session = %session.id, state = %session.state, "Tearing down session");
        session.cancel.cancel();
        if session.playback_started {
            self.save_resume(&session);
        }
        self.release_engine(&mut session);

        let surface = &self.shared.surface;
        surface.pause();
        surface.set_source(None);
        surface.load();

        self.shared.presenter.clear();
    }

    /// Full restart behind `retry()` and the Retry button
    fn restart(&self, session: &mut Session) -> Result<()> {
        if session.stream_end.is_latched() {
            return Err(Error::StreamEnded);
        }
        if !matches!(
            session.state,
            PlaybackState::FailedToStart | PlaybackState::Playing | PlaybackState::Recovering
        ) {
            return Err(Error::InvalidOperation {
                operation: "retry",
                state: session.state.to_string(),
            });
        }

        info!(session = %session.id, "Manual retry");
        session.renew_loading_token();
        session.renew_monitor_token();
        session.retry.reset();
        session.retry_pending = false;
        session.recovery_attempts = 0;
        session.recovery_in_flight = false;
        session.severe_shown = false;
        session.buffering.clear();
        session.fragments.clear();
        session.playback_started = false;
        session.pending_restore = None;
        session.overlay = None;
        session.autoplay_dialog_open = false;
        self.shared.presenter.clear();

        self.release_engine(session);
        self.transition(session, PlaybackState::Loading);
        self.start_engine(session, true);
        if session.state == PlaybackState::Loading {
            self.schedule_loading_timers(session);
        }
        Ok(())
    }

    fn background_reload(&self, session: &mut Session) {
        if session.stream_end.is_latched() {
            return;
        }
        let position = self.shared.surface.current_time();
        info!(session = %session.id, position, "Reloading engine in background");

        // Pending phases of an earlier recovery target the old engine
        session.recovery_in_flight = false;

        if session.native {
            self.shared.surface.set_source(Some(&session.request.url));
            self.shared.surface.load();
        } else {
            self.release_engine(session);
            match self.create_engine(session.id, &session.request.url) {
                Ok(engine) => session.engine = Some(engine),
                Err(e) => {
                    warn!(session = %session.id, error = %e, "Background reload failed");
                    self.show_overlay(
                        session,
                        Notice::new(PlaybackErrorKind::StreamInterrupted),
                        &[ActionKind::Retry, ActionKind::Close],
                    );
                    return;
                }
            }
        }

        if position > 0.0 {
            session.pending_restore = Some(position);
        }
    }

    // ---------------------------------------------------------------------
    // Event handling
    // ---------------------------------------------------------------------

    fn on_engine_event(&self, session: &mut Session, event: EngineEvent) -> FollowUp {
        match event {
            EngineEvent::ManifestParsed => {
                debug!(session = %session.id, "Manifest parsed");
                if !session.playback_started && !session.native {
                    return FollowUp::Play(PlayIntent::Start);
                }
            }
            EngineEvent::ManifestLoaded { playlist } | EngineEvent::LevelLoaded { playlist } => {
                if session.stream_end.observe(&playlist) {
                    self.enter_no_signal(session);
                }
            }
            EngineEvent::FragmentLoaded { url } => {
                debug!(session = %session.id, url, "Fragment loaded");
                self.on_progress(session);
            }
            EngineEvent::Error(err) => self.on_engine_error(session, err),
        }
        FollowUp::Nothing
    }

    fn on_engine_error(&self, session: &mut Session, err: EngineErrorEvent) {
        debug!(
            session = %session.id,
            error_type = ?err.error_type,
            details = ?err.details,
            fatal = err.fatal,
            "Engine error"
        );

        if session.state == PlaybackState::FailedToStart {
            return;
        }

        if let Some(url) = err.fragment_url.as_deref() {
            if session.stream_end.observe_fragment_error(url) {
                self.enter_no_signal(session);
                return;
            }
        }

        if err.details.is_fragment() {
            let kind = if err.details == ErrorDetails::FragmentTimeout {
                FragmentErrorKind::Timeout
            } else {
                FragmentErrorKind::LoadError
            };
            let url = err.fragment_url.clone().unwrap_or_default();
            session.fragments.record(url, kind, Instant::now());
            if session.fragments.is_full() {
                self.on_fragment_log_full(session);
                return;
            }
        }

        if !err.fatal {
            if err.details == ErrorDetails::BufferStalled && session.playback_started {
                session.buffering.record(BufferingEventKind::BufferStalled, Instant::now());
            }
            return;
        }

        let retryable_pre_start = err.error_type == ErrorType::Network
            || err.details.is_manifest()
            || err.details.is_fragment();

        match (session.playback_started, err.error_type) {
            (false, _) if retryable_pre_start => {
                self.schedule_retry(session, "fatal network error");
            }
            (false, ErrorType::Media) => {
                self.fail_terminal(session, PlaybackErrorKind::MediaError, None);
            }
            (false, _) => {
                self.fail_terminal(session, PlaybackErrorKind::HlsFatal, None);
            }
            (true, ErrorType::Network) => {
                warn!(session = %session.id, details = ?err.details, "Network lost after start");
                self.show_overlay(
                    session,
                    Notice::new(PlaybackErrorKind::StreamInterrupted),
                    &[ActionKind::Retry, ActionKind::KeepTrying],
                );
            }
            (true, ErrorType::Media) => {
                if !self.start_recovery(session, "media error") && !session.recovery_in_flight {
                    self.show_overlay(
                        session,
                        Notice::new(PlaybackErrorKind::MediaRecoveryFailed),
                        &[ActionKind::Reload, ActionKind::Retry],
                    );
                }
            }
            (true, ErrorType::Other) => {
                self.show_overlay(
                    session,
                    Notice::new(PlaybackErrorKind::HlsFatal),
                    &[ActionKind::Retry, ActionKind::Close],
                );
            }
        }
    }

    fn on_fragment_log_full(&self, session: &mut Session) {
        if session.fragments.all_same_sentinel() {
            if session.stream_end.latch() {
                self.enter_no_signal(session);
            }
            return;
        }

        let max_recovery = self.shared.config.health.max_recovery_attempts;
        if session.state.is_post_start() && session.recovery_attempts < max_recovery {
            if !session.recovery_in_flight {
                self.start_recovery(session, "fragment errors");
            }
            session.buffering.record(BufferingEventKind::BufferStalled, Instant::now());
            session.fragments.trim_to_recent();
            return;
        }

        warn!(
            session = %session.id,
            errors = session.fragments.len(),
            "Persistent fragment errors"
        );
        self.stop_loading(session);
        session.monitors.cancel();
        session.fragments.clear();
        if !session.playback_started {
            session.loading.cancel();
            session.retry_pending = false;
            self.transition(session, PlaybackState::FailedToStart);
            self.shared.presenter.hide_loading();
        }
        let notice = Notice::new(PlaybackErrorKind::StreamInterrupted)
            .with_message("The stream keeps failing to load. Check your connection and retry.");
        let notice = self.with_actions(session, notice, &[ActionKind::Retry]);
        self.shared.presenter.show_error(notice);
    }

    fn on_surface_event(&self, session: &mut Session, event: SurfaceEvent) -> FollowUp {
        match event {
            SurfaceEvent::LoadedMetadata => {
                if let Some(position) = session.pending_restore.take() {
                    let rewind = self.shared.config.timers.background_reload_rewind_secs;
                    let target = (position - rewind).max(0.0);
                    debug!(session = %session.id, position, target, "Restoring playhead");
                    self.shared.surface.set_current_time(target);
                    return FollowUp::Play(PlayIntent::Resume);
                }
            }
            SurfaceEvent::CanPlay => {
                if session.native && !session.playback_started {
                    return FollowUp::Play(PlayIntent::Start);
                }
            }
            SurfaceEvent::Playing => {
                self.on_progress(session);
                self.dismiss_autoplay(session);
            }
            SurfaceEvent::Pause => {
                if session.playback_started {
                    self.save_resume(session);
                }
            }
            SurfaceEvent::Ended => self.on_media_ended(session),
            SurfaceEvent::Stalled => self.record_buffering(session, BufferingEventKind::Stalled),
            SurfaceEvent::Waiting => self.record_buffering(session, BufferingEventKind::Waiting),
            SurfaceEvent::Error { message } => {
                if !session.native {
                    debug!(session = %session.id, message, "Surface error; engine events drive recovery");
                } else if !session.playback_started {
                    warn!(session = %session.id, message, "Native playback failed before start");
                    self.schedule_retry(session, "surface error");
                } else {
                    warn!(session = %session.id, message, "Native playback error");
                    self.show_overlay(
                        session,
                        Notice::new(PlaybackErrorKind::VideoError),
                        &[ActionKind::Retry, ActionKind::Close],
                    );
                }
            }
        }
        FollowUp::Nothing
    }

    fn on_action(&self, session: &mut Session, kind: ActionKind) -> FollowUp {
        if session.stream_end.is_latched() {
            debug!(session = %session.id, ?kind, "Action ignored after signal loss");
            return FollowUp::Nothing;
        }
        match kind {
            ActionKind::Retry => {
                if let Err(e) = self.restart(session) {
                    warn!(session = %session.id, error = %e, "Retry action rejected");
                }
            }
            ActionKind::Reload => {
                self.dismiss_overlay(session);
                session.severe_shown = false;
                session.buffering.clear();
                self.background_reload(session);
            }
            ActionKind::KeepTrying => {
                self.dismiss_overlay(session);
                if let Some(engine) = session.engine.as_mut() {
                    if let Err(e) = engine.start_load(None) {
                        warn!(session = %session.id, error = %e, "Restarting load failed");
                    }
                }
            }
            ActionKind::Continue => {
                self.dismiss_overlay(session);
                session.severe_shown = false;
                session.buffering.clear();
            }
            ActionKind::TapToPlay => {
                self.dismiss_autoplay(session);
                return FollowUp::Play(PlayIntent::Resume);
            }
            ActionKind::Close => {}
        }
        FollowUp::Nothing
    }

    fn record_buffering(&self, session: &mut Session, kind: BufferingEventKind) {
        if session.playback_started {
            session.buffering.record(kind, Instant::now());
        }
    }

    /// First fragment or `playing` event; also ends a recovery
    fn on_progress(&self, session: &mut Session) {
        if session.state == PlaybackState::FailedToStart {
            return;
        }
        if !session.playback_started {
            self.mark_started(session);
        } else if session.state == PlaybackState::Recovering {
            info!(session = %session.id, attempts = session.recovery_attempts, "Recovered");
            self.transition(session, PlaybackState::Playing);
        }
    }

    fn mark_started(&self, session: &mut Session) {
        session.playback_started = true;
        session.retry.reset();
        session.retry_pending = false;
        session.loading.cancel();

        self.transition(session, PlaybackState::Playing);
        self.shared.presenter.hide_loading();
        self.dismiss_autoplay(session);

        if let Some(position) = session.request.start_position.take() {
            debug!(session = %session.id, position, "Restoring saved position");
            self.shared.surface.set_current_time(position);
        }

        session.sampler = PlayheadSampler::starting_at(self.shared.surface.current_time());
        self.schedule_every(
            &session.monitors,
            session.id,
            self.shared.config.health.sample_interval(),
            Wake::HealthTick,
        );
        if self.shared.resume.is_some() && session.request.movie_id.is_some() {
            self.schedule_every(
                &session.monitors,
                session.id,
                Duration::from_millis(self.shared.config.resume.save_interval_ms),
                Wake::ResumeSave,
            );
        }
        info!(session = %session.id, "Playback started");
    }

    fn on_media_ended(&self, session: &mut Session) {
        let (Some(store), Some(movie_id)) = (&self.shared.resume, &session.request.movie_id) else {
            return;
        };
        let duration = self.shared.surface.duration();
        let position = self.shared.surface.current_time();
        let complete = duration.is_finite()
            && duration > 0.0
            && position / duration >= self.shared.config.resume.complete_ratio;
        if complete {
            debug!(session = %session.id, movie_id, "Finished; dropping resume record");
            if let Err(e) = store.remove(movie_id) {
                warn!(error = %e, "Failed to drop resume record");
            }
        } else {
            self.save_resume(session);
        }
    }

    // ---------------------------------------------------------------------
    // Retry, recovery, health
    // ---------------------------------------------------------------------

    fn schedule_retry(&self, session: &mut Session, reason: &str) {
        if session.retry_pending {
            debug!(session = %session.id, reason, "Retry already pending");
            return;
        }
        match session.retry.next_delay_ms() {
            Some(delay_ms) => {
                info!(
                    session = %session.id,
                    attempt = session.retry.attempts(),
                    max = session.retry.max_attempts(),
                    delay_ms,
                    reason,
                    "Retrying stream"
                );
                session.retry_pending = true;
                self.stop_loading(session);
                self.schedule(&session.loading, session.id, Duration::from_millis(delay_ms), Wake::Retry);
            }
            None => {
                warn!(session = %session.id, attempts = session.retry.attempts(), reason, "Retry budget exhausted");
                self.release_engine(session);
                self.fail_terminal(session, PlaybackErrorKind::StreamFailedToStart, None);
            }
        }
    }

    fn on_retry_due(&self, session: &mut Session) {
        if !session.retry_pending || session.playback_started || session.state != PlaybackState::Loading {
            return;
        }
        session.retry_pending = false;
        self.release_engine(session);
        self.transition(session, PlaybackState::Loading);
        session.renew_loading_token();
        self.start_engine(session, false);
        if session.state == PlaybackState::Loading {
            self.schedule_loading_timers(session);
        }
    }

    /// In-band recovery phase one; false when the budget is spent or a
    /// recovery is already running
    fn start_recovery(&self, session: &mut Session, reason: &str) -> bool {
        let max = self.shared.config.health.max_recovery_attempts;
        if session.recovery_in_flight || session.recovery_attempts >= max {
            return false;
        }
        session.recovery_attempts += 1;
        session.recovery_in_flight = true;
        let attempt = session.recovery_attempts;
        info!(session = %session.id, attempt, max, reason, "Starting in-band recovery");

        self.transition(session, PlaybackState::Recovering);
        if let Some(engine) = session.engine.as_mut() {
            if let Err(e) = engine.recover_media_error() {
                warn!(session = %session.id, error = %e, "recover_media_error failed");
            }
        }
        self.schedule(
            &session.monitors,
            session.id,
            Duration::from_millis(self.shared.config.health.reload_phase_delay_ms),
            Wake::RecoveryReload { attempt },
        );
        true
    }

    fn on_recovery_reload(&self, session: &mut Session, attempt: u32) {
        if attempt != session.recovery_attempts || !session.recovery_in_flight {
            return;
        }
        let surface = &self.shared.surface;
        if !surface.is_stuck() {
            debug!(session = %session.id, attempt, "Progressing after buffer flush");
            session.recovery_in_flight = false;
            return;
        }

        let from = (surface.current_time() - self.shared.config.health.reload_rewind_secs).max(0.0);
        debug!(session = %session.id, attempt, from, "Recovery: restarting load");
        if let Some(engine) = session.engine.as_mut() {
            if let Err(e) = engine.start_load(Some(from)) {
                warn!(session = %session.id, error = %e, "Recovery start_load failed");
            }
        }
        self.schedule(
            &session.monitors,
            session.id,
            Duration::from_millis(self.shared.config.health.seek_phase_delay_ms),
            Wake::RecoverySeek { attempt },
        );
    }

    fn on_recovery_seek(&self, session: &mut Session, attempt: u32) -> FollowUp {
        if attempt != session.recovery_attempts || !session.recovery_in_flight {
            return FollowUp::Nothing;
        }
        session.recovery_in_flight = false;
        let surface = &self.shared.surface;
        if !surface.is_stuck() {
            return FollowUp::Nothing;
        }
        let target = (surface.current_time() - self.shared.config.health.seek_rewind_secs).max(0.0);
        debug!(session = %session.id, attempt, target, "Recovery: seeking and resuming");
        surface.set_current_time(target);
        FollowUp::Play(PlayIntent::Resume)
    }

    fn on_health_tick(&self, session: &mut Session) -> bool {
        if session.stream_end.is_latched() || session.state.is_terminal() {
            return false;
        }
        let surface = &self.shared.surface;
        if surface.paused() || surface.ended() {
            return true;
        }

        let now = Instant::now();
        if session.sampler.sample(surface.current_time()) {
            session.buffering.record(BufferingEventKind::NoProgress, now);
        }

        let recent = session.buffering.recent(now);
        let action = classify(recent, session.recovery_attempts, &self.shared.config.health);
        if action != HealthAction::Healthy {
            debug!(session = %session.id, recent, attempts = session.recovery_attempts, ?action, "Buffering health");
        }

        match action {
            HealthAction::Healthy => {}
            HealthAction::Recover => {
                self.start_recovery(session, "buffering");
            }
            HealthAction::BackgroundReload => {
                session.recovery_attempts += 1;
                self.shared
                    .presenter
                    .notify(PlaybackErrorKind::BufferingIssues, "Improving stream quality…");
                self.background_reload(session);
            }
            HealthAction::Severe => {
                if !session.severe_shown {
                    session.severe_shown = true;
                    warn!(session = %session.id, recent, "Severe buffering");
                    self.show_overlay(
                        session,
                        Notice::new(PlaybackErrorKind::BufferingIssues),
                        &[ActionKind::Reload, ActionKind::Continue],
                    );
                }
            }
        }
        true
    }

    // ---------------------------------------------------------------------
    // Terminal conditions and escalation
    // ---------------------------------------------------------------------

    /// Called once, right after the stream-end latch was set
    fn enter_no_signal(&self, session: &mut Session) {
        warn!(session = %session.id, url = %session.request.url, "Signal lost");
        self.stop_loading(session);
        self.shared.surface.pause();

        session.loading.cancel();
        session.monitors.cancel();
        session.retry_pending = false;
        session.recovery_in_flight = false;
        session.pending_restore = None;
        session.buffering.clear();
        session.fragments.clear();

        self.transition(session, PlaybackState::Ended);
        self.shared.presenter.hide_loading();
        self.dismiss_autoplay(session);
        self.dismiss_overlay(session);

        let notice = self.with_actions(session, Notice::new(PlaybackErrorKind::NoSignal), &[ActionKind::Close]);
        self.shared.presenter.show_error(notice);
    }

    /// Terminal error before start (or unusable platform)
    fn fail_terminal(&self, session: &mut Session, kind: PlaybackErrorKind, message: Option<String>) {
        warn!(session = %session.id, kind = %kind, "Playback cannot continue");
        self.stop_loading(session);
        session.loading.cancel();
        session.retry_pending = false;
        self.transition(session, PlaybackState::FailedToStart);
        self.shared.presenter.hide_loading();

        let mut notice = Notice::new(kind);
        if let Some(message) = message {
            notice = notice.with_message(message);
        }
        let actions: &[ActionKind] = if kind == PlaybackErrorKind::Unsupported {
            &[ActionKind::Close]
        } else {
            &[ActionKind::Retry, ActionKind::Close]
        };
        let notice = self.with_actions(session, notice, actions);
        self.shared.presenter.show_error(notice);
    }

    fn on_loading_timeout(&self, session: &mut Session) {
        if session.playback_started || session.retry_pending || session.state != PlaybackState::Loading {
            return;
        }
        let message = if self.shared.connectivity.is_online() {
            None
        } else {
            Some("The stream took too long to load. Your device appears to be offline.".to_string())
        };
        self.fail_terminal(session, PlaybackErrorKind::LoadingTimeout, message);
    }

    fn on_network_check(&self, session: &mut Session) -> bool {
        if session.playback_started || session.state != PlaybackState::Loading {
            return false;
        }
        if self.shared.connectivity.is_online() {
            return true;
        }
        self.fail_terminal(session, PlaybackErrorKind::NoInternet, None);
        false
    }

    fn show_autoplay_dialog(&self, session: &mut Session) {
        if session.autoplay_dialog_open || session.playback_started {
            return;
        }
        info!(session = %session.id, "Autoplay blocked");
        session.autoplay_blocked_shown = true;
        session.autoplay_dialog_open = true;
        self.shared.presenter.hide_loading();

        let notice = self.with_actions(
            session,
            Notice::new(PlaybackErrorKind::AutoplayFailed),
            &[ActionKind::TapToPlay],
        );
        self.shared.presenter.show_overlay(notice);
        self.schedule_every(
            &session.cancel,
            session.id,
            Duration::from_millis(self.shared.config.timers.autoplay_check_ms),
            Wake::AutoplayCheck,
        );
    }

    fn dismiss_autoplay(&self, session: &mut Session) {
        if session.autoplay_dialog_open {
            session.autoplay_dialog_open = false;
            self.shared.presenter.dismiss(PlaybackErrorKind::AutoplayFailed);
        }
    }

    fn on_autoplay_check(&self, session: &mut Session) -> bool {
        if !session.autoplay_dialog_open {
            return false;
        }
        if session.playback_started || !self.shared.surface.paused() {
            self.dismiss_autoplay(session);
            return false;
        }
        true
    }

    fn show_overlay(&self, session: &mut Session, notice: Notice, actions: &[ActionKind]) {
        if session.overlay == Some(notice.kind) {
            return;
        }
        self.dismiss_overlay(session);
        session.overlay = Some(notice.kind);
        let notice = self.with_actions(session, notice, actions);
        self.shared.presenter.show_overlay(notice);
    }

    fn dismiss_overlay(&self, session: &mut Session) {
        if let Some(kind) = session.overlay.take() {
            self.shared.presenter.dismiss(kind);
        }
    }

    fn with_actions(&self, session: &Session, mut notice: Notice, actions: &[ActionKind]) -> Notice {
        for &kind in actions {
            notice = notice.with_action(Action {
                kind,
                label: kind.label().to_string(),
                trigger: ActionTrigger {
                    controller: Arc::downgrade(&self.shared),
                    session: session.id,
                    kind,
                },
            });
        }
        notice
    }

    fn save_resume(&self, session: &Session) {
        let (Some(store), Some(movie_id)) = (&self.shared.resume, &session.request.movie_id) else {
            return;
        };
        let surface = &self.shared.surface;
        let duration = surface.duration();
        let position = surface.current_time();
        if !duration.is_finite() || duration <= 0.0 || position <= 0.0 {
            return;
        }
        let record = ResumeRecord {
            movie_id: movie_id.clone(),
            position_secs: position,
            duration_secs: duration,
            title: session.request.name.clone(),
            poster: session.request.poster.clone(),
            updated_at: chrono::Utc::now(),
        };
        if let Err(e) = store.save(record) {
            warn!(session = %session.id, error = %e, "Failed to save resume position");
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    fn schedule_loading_timers(&self, session: &Session) {
        let timers = &self.shared.config.timers;
        self.schedule(
            &session.loading,
            session.id,
            Duration::from_millis(timers.loading_timeout_ms),
            Wake::LoadingTimeout,
        );
        self.schedule_every(
            &session.loading,
            session.id,
            Duration::from_millis(timers.network_check_interval_ms),
            Wake::NetworkCheck,
        );
    }

    /// One-shot timer bound to `token` and `id`
    fn schedule(&self, token: &CancellationToken, id: SessionId, delay: Duration, wake: Wake) {
        let shared = Arc::downgrade(&self.shared);
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(delay) => {
                    if let Some(shared) = shared.upgrade() {
                        PlaybackController { shared }.wake(id, wake).await;
                    }
                }
            }
        });
    }

    /// Periodic timer; stops when cancelled or when the handler says so
    fn schedule_every(&self, token: &CancellationToken, id: SessionId, period: Duration, wake: Wake) {
        let shared = Arc::downgrade(&self.shared);
        let token = token.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(shared) = shared.upgrade() else { break };
                        if !(PlaybackController { shared }).wake(id, wake).await {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Timer dispatch; returns whether a periodic timer should keep running
    async fn wake(&self, id: SessionId, wake: Wake) -> bool {
        let (keep, follow_up) = {
            let mut slot = self.shared.session.lock().await;
            let Some(session) = Self::current(&mut slot, id) else {
                debug!(session = %id, ?wake, "Timer for stale session ignored");
                return false;
            };
            match wake {
                Wake::Retry => {
                    self.on_retry_due(session);
                    (false, FollowUp::Nothing)
                }
                Wake::LoadingTimeout => {
                    self.on_loading_timeout(session);
                    (false, FollowUp::Nothing)
                }
                Wake::NetworkCheck => (self.on_network_check(session), FollowUp::Nothing),
                Wake::HealthTick => (self.on_health_tick(session), FollowUp::Nothing),
                Wake::ResumeSave => {
                    if session.state.is_post_start() {
                        self.save_resume(session);
                    }
                    (true, FollowUp::Nothing)
                }
                Wake::AutoplayCheck => (self.on_autoplay_check(session), FollowUp::Nothing),
                Wake::RecoveryReload { attempt } => {
                    if !session.stream_end.is_latched() {
                        self.on_recovery_reload(session, attempt);
                    }
                    (false, FollowUp::Nothing)
                }
                Wake::RecoverySeek { attempt } => {
                    let follow_up = if session.stream_end.is_latched() {
                        FollowUp::Nothing
                    } else {
                        self.on_recovery_seek(session, attempt)
                    };
                    (false, follow_up)
                }
            }
        };
        self.follow_up(id, follow_up).await;
        keep
    }

    async fn follow_up(&self, id: SessionId, follow_up: FollowUp) {
        if let FollowUp::Play(intent) = follow_up {
            self.request_play(id, intent).await;
        }
    }

    /// Ask the surface to play; the lock is not held while the request is
    /// pending, so the outcome is applied only if `id` is still current
    async fn request_play(&self, id: SessionId, intent: PlayIntent) {
        let Err(rejection) = self.shared.surface.play().await else {
            return;
        };

        let mut slot = self.shared.session.lock().await;
        let Some(session) = Self::current(&mut slot, id) else {
            return;
        };
        if session.stream_end.is_latched() {
            return;
        }

        match rejection {
            PlayRejection::NotAllowed => self.show_autoplay_dialog(session),
            PlayRejection::Abort => {
                debug!(session = %session.id, "play() superseded");
            }
            PlayRejection::NotSupported if !session.playback_started => {
                self.fail_terminal(session, PlaybackErrorKind::Unsupported, None);
            }
            PlayRejection::Other(msg) if intent == PlayIntent::Start && !session.playback_started => {
                self.fail_terminal(session, PlaybackErrorKind::PlaybackFailed, Some(msg));
            }
            other => {
                warn!(session = %session.id, rejection = %other, ?intent, "play() rejected");
            }
        }
    }
}
