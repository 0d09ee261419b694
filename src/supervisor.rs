//! Owns the single remote surface of the process: coalesced connects,
//! periodic capture into the frame cache and serialized input.
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::actions::{Action, ActionVocabulary};
use crate::errors::{PilotError, PilotResult};
use crate::perception::{CachedFrame, Compositor, Frame, FrameCache};
use crate::surface::{RemoteSurface, SurfaceFactory, SurfaceKind};

pub type SharedSurface = Arc<Mutex<Box<dyn RemoteSurface>>>;

type ConnectFuture = Shared<BoxFuture<'static, Result<SharedSurface, Arc<PilotError>>>>;

pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct SupervisorState {
    surface: Option<SharedSurface>,
    connecting: Option<ConnectFuture>,
    capture_task: Option<JoinHandle<()>>,
    /// Bumped by `release`; a connect that finishes under an older generation is discarded.
    generation: u64,
}

pub struct ConnectionSupervisor {
    factory: Arc<dyn SurfaceFactory>,
    compositor: Compositor,
    cache: Arc<FrameCache>,
    capture_interval: Duration,
    state: StdMutex<SupervisorState>,
}

impl ConnectionSupervisor {
    pub fn new(factory: Arc<dyn SurfaceFactory>, cache: Arc<FrameCache>) -> Self {
        Self::with_interval(factory, cache, DEFAULT_CAPTURE_INTERVAL)
    }

    pub fn with_interval(
        factory: Arc<dyn SurfaceFactory>,
        cache: Arc<FrameCache>,
        capture_interval: Duration,
    ) -> Self {
        let compositor = Compositor::new(factory.indicator());
        Self {
            factory,
            compositor,
            cache,
            capture_interval,
            state: StdMutex::new(SupervisorState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> Option<SharedSurface> {
        self.lock_state().surface.clone()
    }

    pub fn kind(&self) -> SurfaceKind {
        self.factory.kind()
    }

    pub fn vocabulary(&self) -> ActionVocabulary {
        self.factory.vocabulary()
    }

    /// Return the connected surface, joining an in-flight connect or starting one.
    pub async fn acquire(self: &Arc<Self>) -> PilotResult<SharedSurface> {
        if let Some(surface) = self.current() {
            if surface.lock().await.is_connected() {
                return Ok(surface);
            }
        }

        let pending = {
            let mut state = self.lock_state();
            if let Some(pending) = state.connecting.clone() {
                pending
            } else {
                let stale = state.surface.take();
                if let Some(task) = state.capture_task.take() {
                    task.abort();
                }
                let fut = Arc::clone(self)
                    .establish(stale, state.generation)
                    .boxed()
                    .shared();
                state.connecting = Some(fut.clone());
                fut
            }
        };

        pending.await.map_err(PilotError::from_shared)
    }

    async fn establish(
        self: Arc<Self>,
        stale: Option<SharedSurface>,
        generation: u64,
    ) -> Result<SharedSurface, Arc<PilotError>> {
        if let Some(old) = stale {
            old.lock().await.disconnect().await;
        }

        tracing::info!(kind = ?self.factory.kind(), "connecting remote surface");
        let surface = match self.connect_fresh().await {
            Ok(surface) => surface,
            Err(e) => {
                tracing::warn!(error = %e, "remote surface connect failed");
                let mut state = self.lock_state();
                if state.generation == generation {
                    state.connecting = None;
                }
                return Err(Arc::new(e));
            }
        };

        let shared: SharedSurface = Arc::new(Mutex::new(surface));
        let installed = {
            let mut state = self.lock_state();
            if state.generation == generation {
                state.connecting = None;
                state.surface = Some(Arc::clone(&shared));
                state.capture_task = Some(tokio::spawn(capture_loop(
                    Arc::downgrade(&self),
                    Arc::clone(&shared),
                    self.capture_interval,
                )));
                true
            } else {
                false
            }
        };

        if !installed {
            shared.lock().await.disconnect().await;
            return Err(Arc::new(PilotError::Connect(
                "connection released while connecting".into(),
            )));
        }
        tracing::info!("remote surface connected");
        Ok(shared)
    }

    async fn connect_fresh(&self) -> PilotResult<Box<dyn RemoteSurface>> {
        let mut surface = self.factory.create();
        surface.connect().await?;
        match surface.capture_frame().await {
            Ok(frame) => {
                if let Err(e) = self.publish(frame).await {
                    tracing::warn!(error = %e, "initial frame could not be composited");
                }
            }
            Err(e) => tracing::warn!(error = %e, "initial capture failed"),
        }
        Ok(surface)
    }

    /// Composite on the blocking pool and store the result in the cache.
    async fn publish(&self, frame: Frame) -> PilotResult<Arc<CachedFrame>> {
        let compositor = self.compositor;
        let encoded = tokio::task::spawn_blocking(move || compositor.composite(&frame))
            .await
            .map_err(|e| PilotError::Capture(format!("compositor task failed: {e}")))??;
        Ok(self.cache.store(encoded))
    }

    /// Stop periodic capture, disconnect and forget the cached frame.
    pub async fn release(&self) {
        let (surface, task) = {
            let mut state = self.lock_state();
            state.generation += 1;
            state.connecting = None;
            (state.surface.take(), state.capture_task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Some(surface) = surface {
            surface.lock().await.disconnect().await;
            tracing::info!("remote surface released");
        }
        self.cache.clear();
    }

    pub fn latest_frame(&self) -> Option<Arc<CachedFrame>> {
        self.cache.latest()
    }

    /// Fresh capture for the decision service; also refreshes the cache.
    pub async fn capture_for_agent(&self) -> PilotResult<Arc<CachedFrame>> {
        let surface = self.current().ok_or(PilotError::NotConnected)?;
        let frame = {
            let mut surface = surface.lock().await;
            surface.capture_frame().await?
        };
        self.publish(frame).await
    }

    pub async fn is_connected(&self) -> bool {
        match self.current() {
            Some(surface) => surface.lock().await.is_connected(),
            None => false,
        }
    }

    pub async fn execute(&self, action: &Action) -> PilotResult<()> {
        let surface = self.current().ok_or(PilotError::NotConnected)?;
        let mut surface = surface.lock().await;
        surface.execute(action).await
    }
}

async fn capture_loop(
    supervisor: Weak<ConnectionSupervisor>,
    surface: SharedSurface,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(supervisor) = supervisor.upgrade() else {
            break;
        };
        let frame = {
            let mut surface = surface.lock().await;
            if !surface.is_connected() {
                continue;
            }
            surface.capture_frame().await
        };
        match frame {
            Ok(frame) => {
                if let Err(e) = supervisor.publish(frame).await {
                    tracing::debug!(error = %e, "periodic frame dropped");
                }
            }
            Err(e) => tracing::debug!(error = %e, "periodic capture failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::actions::PointerAction;
    use crate::surface::mock::MockFactory;

    fn supervisor(factory: MockFactory) -> Arc<ConnectionSupervisor> {
        Arc::new(ConnectionSupervisor::with_interval(
            Arc::new(factory),
            Arc::new(FrameCache::new()),
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn concurrent_acquires_connect_once() {
        let factory = MockFactory::new();
        let state = Arc::clone(&factory.state);
        let sup = supervisor(factory);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sup = Arc::clone(&sup);
                tokio::spawn(async move { sup.acquire().await })
            })
            .collect();
        let mut surfaces = Vec::new();
        for handle in handles {
            surfaces.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(state.connects.load(Ordering::SeqCst), 1);
        assert!(surfaces.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(sup.is_connected().await);
    }

    #[tokio::test]
    async fn acquire_publishes_initial_frame() {
        let sup = supervisor(MockFactory::new());
        assert!(sup.latest_frame().is_none());
        sup.acquire().await.unwrap();
        let frame = sup.latest_frame().expect("initial frame cached");
        assert_eq!((frame.width, frame.height), (8, 8));
        assert!(frame.png.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn failed_connect_is_shared_then_retried() {
        let factory = MockFactory::new();
        let state = Arc::clone(&factory.state);
        state.fail_connect.store(true, Ordering::SeqCst);
        let sup = supervisor(factory);

        let (a, b) = tokio::join!(sup.acquire(), sup.acquire());
        assert!(matches!(a, Err(PilotError::Connect(_))));
        assert!(matches!(b, Err(PilotError::Connect(_))));
        assert_eq!(state.connects.load(Ordering::SeqCst), 1);

        state.fail_connect.store(false, Ordering::SeqCst);
        sup.acquire().await.unwrap();
        assert_eq!(state.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_connection_reconnects_with_fresh_surface() {
        let factory = MockFactory::new();
        let state = Arc::clone(&factory.state);
        let sup = supervisor(factory);

        let first = sup.acquire().await.unwrap();
        state.drop_connection();
        assert!(!sup.is_connected().await);
        let second = sup.acquire().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(state.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn release_disconnects_and_clears_cache() {
        let factory = MockFactory::new();
        let state = Arc::clone(&factory.state);
        let sup = supervisor(factory);
        sup.acquire().await.unwrap();

        sup.release().await;
        assert!(!sup.is_connected().await);
        assert!(sup.latest_frame().is_none());
        assert_eq!(state.disconnects.load(Ordering::SeqCst), 1);
        assert!(matches!(
            sup.execute(&Action::Pointer(PointerAction::Wait { ms: 1 })).await,
            Err(PilotError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn capture_for_agent_advances_sequence() {
        let sup = supervisor(MockFactory::new());
        sup.acquire().await.unwrap();
        let initial = sup.latest_frame().unwrap();
        let fresh = sup.capture_for_agent().await.unwrap();
        assert!(fresh.sequence > initial.sequence);
        assert!(fresh.timestamp_ms > initial.timestamp_ms);
    }

    #[tokio::test]
    async fn periodic_capture_refreshes_cache() {
        let factory = MockFactory::new();
        let state = Arc::clone(&factory.state);
        let sup = Arc::new(ConnectionSupervisor::with_interval(
            Arc::new(factory),
            Arc::new(FrameCache::new()),
            Duration::from_millis(10),
        ));
        sup.acquire().await.unwrap();
        let before = state.captures.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.captures.load(Ordering::SeqCst) > before);
        sup.release().await;
    }
}
