//! In-memory surface used by supervisor and agent loop tests.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::{Action, ActionVocabulary};
use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{Frame, FramePixels, IndicatorStyle};
use crate::surface::{RemoteSurface, SurfaceFactory, SurfaceKind};

/// Observable state shared by every surface a [`MockFactory`] creates.
#[derive(Default)]
pub struct MockState {
    pub connects: AtomicU32,
    pub disconnects: AtomicU32,
    pub captures: AtomicU32,
    pub connected: AtomicBool,
    pub fail_connect: AtomicBool,
    pub executed: Mutex<Vec<Action>>,
}

impl MockState {
    pub fn executed(&self) -> Vec<Action> {
        self.executed.lock().unwrap().clone()
    }

    /// Simulate the transport dropping underneath the surface.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

pub struct MockSurface {
    state: Arc<MockState>,
    connect_delay: Duration,
}

#[async_trait]
impl RemoteSurface for MockSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Vnc
    }

    fn vocabulary(&self) -> ActionVocabulary {
        ActionVocabulary::pointer(8, 8)
    }

    fn indicator(&self) -> IndicatorStyle {
        IndicatorStyle::cursor()
    }

    async fn connect(&mut self) -> PilotResult<()> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.connect_delay).await;
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(PilotError::Connect("mock refused".into()));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn capture_frame(&mut self) -> PilotResult<Frame> {
        if !self.is_connected() {
            return Err(PilotError::NotConnected);
        }
        self.state.captures.fetch_add(1, Ordering::SeqCst);
        Ok(Frame {
            pixels: FramePixels::Rgba { width: 8, height: 8, data: vec![40; 8 * 8 * 4] },
            logical_width: 8,
            logical_height: 8,
            indicator: Some((4, 4)),
        })
    }

    async fn execute(&mut self, action: &Action) -> PilotResult<()> {
        if !self.is_connected() {
            return Err(PilotError::NotConnected);
        }
        self.state.executed.lock().unwrap().push(action.clone());
        Ok(())
    }
}

pub struct MockFactory {
    pub state: Arc<MockState>,
    pub connect_delay: Duration,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            connect_delay: Duration::from_millis(50),
        }
    }
}

impl SurfaceFactory for MockFactory {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Vnc
    }

    fn vocabulary(&self) -> ActionVocabulary {
        ActionVocabulary::pointer(8, 8)
    }

    fn indicator(&self) -> IndicatorStyle {
        IndicatorStyle::cursor()
    }

    fn create(&self) -> Box<dyn RemoteSurface> {
        Box::new(MockSurface {
            state: Arc::clone(&self.state),
            connect_delay: self.connect_delay,
        })
    }
}
