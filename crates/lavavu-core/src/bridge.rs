//! Render bridge
//!
//! Owns the backend and decides which thread runs each call. Three modes:
//! - `Direct`: every call runs inline on the caller's thread
//! - `Thread`: a dedicated render thread runs a FIFO of work items; callers
//!   either wait for the result or fire and forget
//! - `Async`: the render loop is a task on a tokio runtime and calls run
//!   inline; callers touching the graphics context must be on that runtime
//!
//! Every mode shares the same per-frame [`tick`]. Only the methods listed in
//! [`RenderMethod`] are routed; everything else locks the backend directly.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::error::BridgeError;
use crate::input::{to_command, ClosePolicy, WindowEvent};

/// Backend methods that must run on the render thread
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderMethod {
    Run,
    Close,
    Image,
    Video,
    Web,
    Contour,
    IsoSurface,
    Commands,
    ImageDiff,
    LoadFile,
    UpdateColourMap,
    ClearAll,
    ClearTexture,
    GlVersion,
}

impl RenderMethod {
    pub const ALL: [RenderMethod; 14] = [
        RenderMethod::Run,
        RenderMethod::Close,
        RenderMethod::Image,
        RenderMethod::Video,
        RenderMethod::Web,
        RenderMethod::Contour,
        RenderMethod::IsoSurface,
        RenderMethod::Commands,
        RenderMethod::ImageDiff,
        RenderMethod::LoadFile,
        RenderMethod::UpdateColourMap,
        RenderMethod::ClearAll,
        RenderMethod::ClearTexture,
        RenderMethod::GlVersion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMethod::Run => "run",
            RenderMethod::Close => "close",
            RenderMethod::Image => "image",
            RenderMethod::Video => "video",
            RenderMethod::Web => "web",
            RenderMethod::Contour => "contour",
            RenderMethod::IsoSurface => "isoSurface",
            RenderMethod::Commands => "commands",
            RenderMethod::ImageDiff => "imageDiff",
            RenderMethod::LoadFile => "loadFile",
            RenderMethod::UpdateColourMap => "updateColourMap",
            RenderMethod::ClearAll => "clearAll",
            RenderMethod::ClearTexture => "clearTexture",
            RenderMethod::GlVersion => "gl_version",
        }
    }
}

/// A native window the bridge drives alongside the backend
pub trait WindowHost: Send {
    /// Events received since the last poll
    fn poll_events(&mut self) -> Vec<WindowEvent>;
    fn swap_buffers(&mut self);
    fn set_visible(&mut self, _visible: bool) {}
}

/// Render loop timing and window behaviour
pub struct LoopSettings {
    /// Animation timer rate
    pub fps: u32,
    pub close_policy: ClosePolicy,
    pub window: Option<Box<dyn WindowHost>>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            close_policy: ClosePolicy::default(),
            window: None,
        }
    }
}

impl LoopSettings {
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// How the bridge schedules backend calls
#[derive(Clone, Debug)]
pub enum BridgeMode {
    Direct,
    Thread,
    Async(tokio::runtime::Handle),
}

type Job = Box<dyn FnOnce(&mut dyn Backend) + Send>;
type JobResult = Result<Box<dyn Any + Send>, BridgeError>;

pub(crate) type SharedBackend = Arc<Mutex<Box<dyn Backend>>>;

fn lock(backend: &SharedBackend) -> MutexGuard<'_, Box<dyn Backend>> {
    backend.lock().unwrap_or_else(|e| e.into_inner())
}

/// Result slot shared with the render thread
#[derive(Default)]
struct Slot {
    result: Option<JobResult>,
    closed: bool,
}

#[derive(Default)]
struct Waiter {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Waiter {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver(&self, result: JobResult) {
        self.slot().result = Some(result);
        self.ready.notify_all();
    }

    /// Release anyone waiting; later waits fail immediately
    fn close(&self) {
        self.slot().closed = true;
        self.ready.notify_all();
    }
}

enum Scheduler {
    Direct(Mutex<LoopState>),
    Thread {
        sender: Mutex<Option<Sender<Job>>>,
        handle: Mutex<Option<JoinHandle<()>>>,
    },
    Async,
}

/// Routes backend calls according to the scheduling mode
pub struct RenderBridge {
    backend: SharedBackend,
    scheduler: Scheduler,
    waiter: Arc<Waiter>,
    /// Serialises synchronous callers so one result slot suffices
    sync_lock: Mutex<()>,
    closing: Arc<AtomicBool>,
    shut_down: AtomicBool,
    ticks: Arc<AtomicU64>,
}

/// State the loop carries between ticks
struct LoopState {
    frame: u64,
    close_policy: ClosePolicy,
    window: Option<Box<dyn WindowHost>>,
}

/// One frame: poll window and backend events, run queued commands, redisplay
/// every second tick and swap. Returns false once the loop should stop.
fn tick(backend: &mut dyn Backend, state: &mut LoopState) -> bool {
    let mut keep_running = true;
    if let Some(window) = state.window.as_mut() {
        for event in window.poll_events() {
            match event {
                WindowEvent::Close => match state.close_policy {
                    ClosePolicy::Hide => {
                        backend.hide();
                        window.set_visible(false);
                    }
                    ClosePolicy::Quit => {
                        backend.close();
                        keep_running = false;
                    }
                },
                other => {
                    if let Some(line) = to_command(&other) {
                        backend.queue_commands(&line);
                    }
                }
            }
        }
    }
    if !backend.events() {
        keep_running = false;
    }
    if let Err(err) = backend.execute() {
        warn!(error = %err, "queued commands failed");
    }
    if state.frame % 2 == 0 {
        if let Err(err) = backend.display() {
            warn!(error = %err, "display failed");
        }
        if let Some(window) = state.window.as_mut() {
            window.swap_buffers();
        }
    }
    state.frame += 1;
    keep_running
}

fn run_job(backend: &mut dyn Backend, job: Job) {
    // A panicking job must not take the render thread down
    if catch_unwind(AssertUnwindSafe(|| job(backend))).is_err() {
        error!("render job panicked");
    }
}

impl RenderBridge {
    /// Create the bridge and, in thread or async mode, start the render loop
    pub fn new(
        backend: Box<dyn Backend>,
        mode: BridgeMode,
        settings: LoopSettings,
    ) -> Result<Self, BridgeError> {
        let backend: SharedBackend = Arc::new(Mutex::new(backend));
        let waiter = Arc::new(Waiter::default());
        let closing = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let interval = settings.interval();
        let mut state = LoopState {
            frame: 0,
            close_policy: settings.close_policy,
            window: settings.window,
        };

        let scheduler = match mode {
            BridgeMode::Direct => Scheduler::Direct(Mutex::new(state)),
            BridgeMode::Thread => {
                let (sender, receiver) = mpsc::channel::<Job>();
                let (backend, waiter, closing, ticks) =
                    (backend.clone(), waiter.clone(), closing.clone(), ticks.clone());
                let handle = thread::Builder::new()
                    .name("lavavu-render".into())
                    .spawn(move || {
                        info!("render thread started");
                        while !closing.load(Ordering::SeqCst) {
                            // Sleep one tick, waking early for new work
                            let job = match receiver.recv_timeout(interval) {
                                Ok(job) => Some(job),
                                Err(RecvTimeoutError::Timeout) => None,
                                Err(RecvTimeoutError::Disconnected) => break,
                            };
                            let mut guard = lock(&backend);
                            if let Some(job) = job {
                                run_job(&mut **guard, job);
                            }
                            let running = tick(&mut **guard, &mut state);
                            ticks.fetch_add(1, Ordering::SeqCst);
                            if !running {
                                debug!("backend requested quit");
                                closing.store(true, Ordering::SeqCst);
                            }
                        }
                        lock(&backend).destroy();
                        waiter.close();
                        info!("render thread stopped");
                    })
                    .map_err(|e| BridgeError::Spawn {
                        message: e.to_string(),
                    })?;
                Scheduler::Thread {
                    sender: Mutex::new(Some(sender)),
                    handle: Mutex::new(Some(handle)),
                }
            }
            BridgeMode::Async(runtime) => {
                let (backend, waiter, closing, ticks) =
                    (backend.clone(), waiter.clone(), closing.clone(), ticks.clone());
                runtime.spawn(async move {
                    info!("render task started");
                    while !closing.load(Ordering::SeqCst) {
                        let running = {
                            let mut guard = lock(&backend);
                            tick(&mut **guard, &mut state)
                        };
                        ticks.fetch_add(1, Ordering::SeqCst);
                        if !running {
                            closing.store(true, Ordering::SeqCst);
                            break;
                        }
                        tokio::time::sleep(interval).await;
                    }
                    lock(&backend).destroy();
                    waiter.close();
                    info!("render task stopped");
                });
                Scheduler::Async
            }
        };

        Ok(Self {
            backend,
            scheduler,
            waiter,
            sync_lock: Mutex::new(()),
            closing,
            shut_down: AtomicBool::new(false),
            ticks,
        })
    }

    pub fn mode_name(&self) -> &'static str {
        match self.scheduler {
            Scheduler::Direct(_) => "direct",
            Scheduler::Thread { .. } => "thread",
            Scheduler::Async => "async",
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.shut_down.load(Ordering::SeqCst)
    }

    /// Render loop iterations so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Run `f` against the backend on the calling thread, under the lock
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Backend) -> R) -> R {
        let mut guard = lock(&self.backend);
        f(&mut **guard)
    }

    /// Run a routed method and wait for its result
    pub fn call<R, F>(&self, method: RenderMethod, f: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Backend) -> R + Send + 'static,
    {
        let sender = match &self.scheduler {
            Scheduler::Direct(_) | Scheduler::Async => {
                if self.shut_down.load(Ordering::SeqCst) {
                    return Err(BridgeError::Closed);
                }
                let mut guard = lock(&self.backend);
                return catch_unwind(AssertUnwindSafe(|| f(&mut **guard))).map_err(|_| {
                    BridgeError::Panicked {
                        method: method.as_str().to_string(),
                    }
                });
            }
            Scheduler::Thread { sender, .. } => sender,
        };

        let _serial = self.sync_lock.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut slot = self.waiter.slot();
            if slot.closed {
                return Err(BridgeError::Closed);
            }
            slot.result = None;
        }

        let waiter = self.waiter.clone();
        let name = method.as_str();
        let job: Job = Box::new(move |backend: &mut dyn Backend| {
            let result = catch_unwind(AssertUnwindSafe(|| f(backend)))
                .map(|r| Box::new(r) as Box<dyn Any + Send>)
                .map_err(|_| BridgeError::Panicked {
                    method: name.to_string(),
                });
            waiter.deliver(result);
        });
        {
            let sender = sender.lock().unwrap_or_else(|e| e.into_inner());
            match sender.as_ref() {
                Some(tx) => tx.send(job).map_err(|_| BridgeError::Closed)?,
                None => return Err(BridgeError::Closed),
            }
        }

        let mut slot = self.waiter.slot();
        loop {
            if let Some(result) = slot.result.take() {
                return result?.downcast::<R>().map(|r| *r).map_err(|_| BridgeError::Panicked {
                    method: name.to_string(),
                });
            }
            if slot.closed {
                return Err(BridgeError::Closed);
            }
            slot = self.ready_wait(slot);
        }
    }

    fn ready_wait<'a>(&self, slot: MutexGuard<'a, Slot>) -> MutexGuard<'a, Slot> {
        self.waiter.ready.wait(slot).unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a routed method without waiting; runs inline outside thread mode
    pub fn submit<F>(&self, method: RenderMethod, f: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut dyn Backend) + Send + 'static,
    {
        match &self.scheduler {
            Scheduler::Thread { sender, .. } => {
                let sender = sender.lock().unwrap_or_else(|e| e.into_inner());
                let tx = sender.as_ref().ok_or(BridgeError::Closed)?;
                debug!(method = method.as_str(), "queued");
                tx.send(Box::new(f)).map_err(|_| BridgeError::Closed)
            }
            _ => self.call(method, f),
        }
    }

    /// Run one loop iteration now; the loop itself does this in thread and async modes
    pub fn pump(&self) -> bool {
        match &self.scheduler {
            Scheduler::Direct(state) => {
                if self.is_closed() {
                    return false;
                }
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                let running = self.with(|backend| tick(backend, &mut state));
                self.ticks.fetch_add(1, Ordering::SeqCst);
                if !running {
                    self.closing.store(true, Ordering::SeqCst);
                }
                running
            }
            _ => !self.is_closed(),
        }
    }

    /// Stop the loop and release the backend; later calls fail with `Closed`.
    /// Runs once; repeat calls are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closing.store(true, Ordering::SeqCst);
        match &self.scheduler {
            Scheduler::Direct(_) => {
                self.with(|backend| {
                    backend.close();
                    backend.destroy();
                });
                self.waiter.close();
            }
            Scheduler::Thread { sender, handle } => {
                // Dropping the sender wakes the loop
                sender.lock().unwrap_or_else(|e| e.into_inner()).take();
                let handle = handle.lock().unwrap_or_else(|e| e.into_inner()).take();
                if let Some(handle) = handle {
                    if handle.thread().id() == thread::current().id() {
                        return;
                    }
                    if handle.join().is_err() {
                        error!("render thread panicked during shutdown");
                    }
                }
                self.waiter.close();
            }
            // The task exits at its next tick and destroys the backend there
            Scheduler::Async => {}
        }
    }
}

impl Drop for RenderBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, ImageFormat, ImageRequest};

    fn thread_bridge() -> (RenderBridge, crate::backend::CommandJournal) {
        let backend = HeadlessBackend::new();
        let journal = backend.journal();
        let bridge = RenderBridge::new(
            Box::new(backend),
            BridgeMode::Thread,
            LoopSettings::default().with_fps(200),
        )
        .unwrap();
        (bridge, journal)
    }

    #[test]
    fn test_method_names() {
        assert_eq!(RenderMethod::ALL.len(), 14);
        assert_eq!(RenderMethod::IsoSurface.as_str(), "isoSurface");
        assert_eq!(RenderMethod::GlVersion.as_str(), "gl_version");
    }

    #[test]
    fn test_call_runs_on_render_thread() {
        let (bridge, _) = thread_bridge();
        let name = bridge
            .call(RenderMethod::GlVersion, |_| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("lavavu-render"));
    }

    #[test]
    fn test_sync_image_from_other_thread() {
        let (bridge, _) = thread_bridge();
        let bridge = Arc::new(bridge);
        let worker = {
            let bridge = bridge.clone();
            thread::spawn(move || {
                bridge.call(RenderMethod::Image, |backend| {
                    backend.image(&ImageRequest {
                        width: 1,
                        height: 1,
                        format: ImageFormat::Jpeg,
                        ..ImageRequest::default()
                    })
                })
            })
        };
        let bytes = worker.join().unwrap().unwrap().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let (bridge, journal) = thread_bridge();
        for n in 0..20 {
            bridge
                .submit(RenderMethod::Commands, move |backend| {
                    let _ = backend.parse_commands(&format!("zoom {}", n + 1));
                })
                .unwrap();
        }
        bridge.call(RenderMethod::Commands, |_| ()).unwrap();
        let expected: Vec<String> = (0..20).map(|n| format!("zoom {}", n + 1)).collect();
        assert_eq!(journal.entries(), expected);
    }

    #[test]
    fn test_panic_is_reported() {
        let (bridge, _) = thread_bridge();
        let result: Result<(), _> = bridge.call(RenderMethod::Web, |_| panic!("boom"));
        assert_eq!(
            result,
            Err(BridgeError::Panicked {
                method: "web".into()
            })
        );
        assert_eq!(bridge.call(RenderMethod::GlVersion, |b| b.gl_version()).unwrap(), "headless");
    }

    #[test]
    fn test_shutdown_releases_callers() {
        let (bridge, _) = thread_bridge();
        bridge.shutdown();
        bridge.shutdown();
        assert!(bridge.is_closed());
        assert_eq!(
            bridge.call(RenderMethod::GlVersion, |b| b.gl_version()),
            Err(BridgeError::Closed)
        );
    }

    #[test]
    fn test_quit_stops_loop() {
        let (bridge, _) = thread_bridge();
        bridge
            .submit(RenderMethod::Commands, |backend| backend.queue_commands("quit"))
            .unwrap();
        for _ in 0..200 {
            if bridge.is_closed() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(bridge.is_closed());
    }

    #[test]
    fn test_direct_mode_inline() {
        let bridge = RenderBridge::new(
            Box::new(HeadlessBackend::new()),
            BridgeMode::Direct,
            LoopSettings::default(),
        )
        .unwrap();
        assert_eq!(bridge.mode_name(), "direct");
        bridge
            .submit(RenderMethod::Commands, |b| b.queue_commands("zoom 2"))
            .unwrap();
        assert!(bridge.pump());
        let zoom = bridge.with(|b| {
            let state: serde_json::Value = serde_json::from_str(&b.get_state()).unwrap();
            state["views"][0]["zoom"].as_f64()
        });
        assert_eq!(zoom, Some(2.0));
    }

    #[tokio::test]
    async fn test_async_mode_ticks() {
        let bridge = RenderBridge::new(
            Box::new(HeadlessBackend::new()),
            BridgeMode::Async(tokio::runtime::Handle::current()),
            LoopSettings::default().with_fps(100),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bridge.ticks() > 0);
        let version = bridge.call(RenderMethod::GlVersion, |b| b.gl_version()).unwrap();
        assert_eq!(version, "headless");
        bridge.shutdown();
    }
}
