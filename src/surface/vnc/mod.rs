//! Virtual desktop surface driven over VNC/RFB.
pub mod auth;
pub mod framebuffer;
pub mod keysym;
pub mod protocol;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::actions::{Action, ActionFamily, ActionVocabulary, PointerAction, ScrollDirection};
use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{Frame, FramePixels, IndicatorStyle};
use crate::surface::scaling::CoordinateScaler;
use crate::surface::{ensure_family, RemoteSurface, SurfaceFactory, SurfaceKind};

use framebuffer::Framebuffer;
use protocol::{PixelFormat, ServerMessage};

const TYPE_PAUSE: Duration = Duration::from_millis(20);
const SCROLL_PULSE: Duration = Duration::from_millis(30);
const SCROLL_UP_BIT: u8 = 8;
const SCROLL_DOWN_BIT: u8 = 16;

#[derive(Debug, Clone)]
pub struct VncSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Resolution the agent reasons in.
    pub width: u32,
    pub height: u32,
    pub connect_timeout: Duration,
    /// How long a capture waits for a fresh update before using what it has.
    pub update_wait: Duration,
}

impl Default for VncSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5900,
            password: None,
            width: 800,
            height: 600,
            connect_timeout: Duration::from_secs(30),
            update_wait: Duration::from_millis(100),
        }
    }
}

/// State shared between the surface and its background reader.
struct Shared {
    framebuffer: Mutex<Framebuffer>,
    connected: AtomicBool,
    updated: Notify,
}

struct Session {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PointerState {
    x: u32,
    y: u32,
    buttons: u8,
}

pub struct VncSurface {
    settings: VncSettings,
    session: Option<Session>,
    pointer: PointerState,
}

impl VncSurface {
    pub fn new(settings: VncSettings) -> Self {
        Self {
            settings,
            session: None,
            pointer: PointerState::default(),
        }
    }

    async fn dial(&mut self) -> PilotResult<()> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| PilotError::Connect(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        self.attach(stream).await
    }

    /// Handshake over an established byte stream and start the update reader.
    async fn attach<S>(&mut self, mut stream: S) -> PilotResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let init = protocol::handshake(&mut stream, self.settings.password.as_deref()).await?;
        tracing::info!(
            name = %init.name,
            width = init.width,
            height = init.height,
            version = ?init.version,
            "VNC session established"
        );

        let format = PixelFormat::bgrx32();
        let (read_half, mut writer) = tokio::io::split(stream);
        writer.write_all(&protocol::set_pixel_format(&format)).await?;
        writer
            .write_all(&protocol::set_encodings(&[
                protocol::ENCODING_RAW,
                protocol::ENCODING_COPY_RECT,
                protocol::ENCODING_DESKTOP_SIZE,
            ]))
            .await?;
        writer
            .write_all(&protocol::framebuffer_update_request(false, 0, 0, init.width, init.height))
            .await?;
        writer.flush().await?;

        let shared = Arc::new(Shared {
            framebuffer: Mutex::new(Framebuffer::new(
                u32::from(init.width),
                u32::from(init.height),
                format,
            )),
            connected: AtomicBool::new(true),
            updated: Notify::new(),
        });
        let reader = tokio::spawn(read_updates(read_half, Arc::clone(&shared), format));

        self.pointer = PointerState::default();
        self.session = Some(Session {
            writer: Box::new(writer),
            shared,
            reader,
        });
        Ok(())
    }

    fn live_session(&mut self) -> PilotResult<&mut Session> {
        match self.session.as_mut() {
            Some(session) if session.shared.connected.load(Ordering::SeqCst) => Ok(session),
            _ => Err(PilotError::NotConnected),
        }
    }

    fn framebuffer_size(&self) -> Option<(u32, u32)> {
        let session = self.session.as_ref()?;
        let fb = lock_framebuffer(&session.shared);
        Some((fb.width(), fb.height()))
    }

    fn scaler(&self) -> PilotResult<CoordinateScaler> {
        let device = self.framebuffer_size().ok_or(PilotError::NotConnected)?;
        Ok(CoordinateScaler::new(
            (self.settings.width, self.settings.height),
            device,
        ))
    }

    async fn send(&mut self, msg: &[u8]) -> PilotResult<()> {
        let session = self.live_session()?;
        let result = async {
            session.writer.write_all(msg).await?;
            session.writer.flush().await
        }
        .await;
        if let Err(e) = result {
            session.shared.connected.store(false, Ordering::SeqCst);
            return Err(PilotError::Io(e));
        }
        Ok(())
    }

    async fn send_pointer(&mut self, buttons: u8) -> PilotResult<()> {
        let (x, y) = self.scaler()?.to_device(self.pointer.x, self.pointer.y);
        let msg = protocol::pointer_event(buttons, clamp_u16(x), clamp_u16(y));
        self.send(&msg).await
    }

    async fn send_key(&mut self, down: bool, keysym: u32) -> PilotResult<()> {
        self.send(&protocol::key_event(down, keysym)).await
    }
}

fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

fn lock_framebuffer(shared: &Shared) -> std::sync::MutexGuard<'_, Framebuffer> {
    shared
        .framebuffer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_updates<S>(mut reader: ReadHalf<S>, shared: Arc<Shared>, format: PixelFormat)
where
    S: AsyncRead + Send + Unpin + 'static,
{
    loop {
        match protocol::read_server_message(&mut reader, &format).await {
            Ok(ServerMessage::FramebufferUpdate(rects)) => {
                {
                    let mut fb = lock_framebuffer(&shared);
                    for rect in &rects {
                        fb.apply(rect);
                    }
                }
                shared.updated.notify_waiters();
            }
            Ok(ServerMessage::Bell) => tracing::trace!("remote bell"),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "VNC connection closed");
                break;
            }
        }
    }
    shared.connected.store(false, Ordering::SeqCst);
    shared.updated.notify_waiters();
}

#[async_trait]
impl RemoteSurface for VncSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Vnc
    }

    fn vocabulary(&self) -> ActionVocabulary {
        ActionVocabulary::pointer(self.settings.width, self.settings.height)
    }

    fn indicator(&self) -> IndicatorStyle {
        IndicatorStyle::cursor()
    }

    async fn connect(&mut self) -> PilotResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.disconnect().await;
        let limit = self.settings.connect_timeout;
        match tokio::time::timeout(limit, self.dial()).await {
            Ok(result) => result,
            Err(_) => Err(PilotError::Connect(format!(
                "{}:{} did not complete the handshake within {}s",
                self.settings.host,
                self.settings.port,
                limit.as_secs()
            ))),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.shared.connected.store(false, Ordering::SeqCst);
            session.reader.abort();
            let _ = session.writer.shutdown().await;
            tracing::info!("VNC session closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.shared.connected.load(Ordering::SeqCst))
    }

    async fn capture_frame(&mut self) -> PilotResult<Frame> {
        let update_wait = self.settings.update_wait;
        let (width, height) = self.framebuffer_size().ok_or(PilotError::NotConnected)?;
        let session = self.live_session()?;
        let shared = Arc::clone(&session.shared);

        let notified = shared.updated.notified();
        let request =
            protocol::framebuffer_update_request(true, 0, 0, clamp_u16(width), clamp_u16(height));
        if let Err(e) = session.writer.write_all(&request).await {
            shared.connected.store(false, Ordering::SeqCst);
            return Err(PilotError::Capture(format!("update request failed: {e}")));
        }
        // A timeout is fine: the last known framebuffer is still valid.
        let _ = tokio::time::timeout(update_wait, notified).await;

        let (width, height, data) = {
            let fb = lock_framebuffer(&shared);
            (fb.width(), fb.height(), fb.to_rgba())
        };
        Ok(Frame {
            pixels: FramePixels::Rgba { width, height, data },
            logical_width: self.settings.width,
            logical_height: self.settings.height,
            indicator: Some((self.pointer.x, self.pointer.y)),
        })
    }

    async fn execute(&mut self, action: &Action) -> PilotResult<()> {
        ensure_family(action, ActionFamily::Pointer)?;
        let Action::Pointer(action) = action else {
            return Ok(());
        };
        self.live_session()?;

        match action {
            PointerAction::Move { x, y } => {
                self.pointer.x = (*x).min(self.settings.width);
                self.pointer.y = (*y).min(self.settings.height);
                self.send_pointer(self.pointer.buttons).await
            }
            PointerAction::Down { button } => {
                self.pointer.buttons |= button.mask_bit();
                self.send_pointer(self.pointer.buttons).await
            }
            PointerAction::Up { button } => {
                self.pointer.buttons &= !button.mask_bit();
                self.send_pointer(self.pointer.buttons).await
            }
            PointerAction::Press { key } => {
                let sym = keysym::keysym_for_key(key)?;
                self.send_key(true, sym).await
            }
            PointerAction::Release { key } => {
                let sym = keysym::keysym_for_key(key)?;
                self.send_key(false, sym).await
            }
            PointerAction::Type { text } => {
                for c in text.chars() {
                    let sym = keysym::keysym_for_char(c);
                    self.send_key(true, sym).await?;
                    tokio::time::sleep(TYPE_PAUSE).await;
                    self.send_key(false, sym).await?;
                    tokio::time::sleep(TYPE_PAUSE).await;
                }
                Ok(())
            }
            PointerAction::Scroll { direction } => {
                let bit = match direction {
                    ScrollDirection::Up => SCROLL_UP_BIT,
                    ScrollDirection::Down => SCROLL_DOWN_BIT,
                };
                self.send_pointer(self.pointer.buttons | bit).await?;
                tokio::time::sleep(SCROLL_PULSE).await;
                self.send_pointer(self.pointer.buttons).await
            }
            PointerAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(u64::from(*ms))).await;
                Ok(())
            }
        }
    }
}

impl Drop for VncSurface {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.reader.abort();
        }
    }
}

pub struct VncSurfaceFactory {
    settings: VncSettings,
}

impl VncSurfaceFactory {
    pub fn new(settings: VncSettings) -> Self {
        Self { settings }
    }
}

impl SurfaceFactory for VncSurfaceFactory {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Vnc
    }

    fn vocabulary(&self) -> ActionVocabulary {
        ActionVocabulary::pointer(self.settings.width, self.settings.height)
    }

    fn indicator(&self) -> IndicatorStyle {
        IndicatorStyle::cursor()
    }

    fn create(&self) -> Box<dyn RemoteSurface> {
        Box::new(VncSurface::new(self.settings.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::MouseButton;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn settings(width: u32, height: u32) -> VncSettings {
        VncSettings {
            width,
            height,
            update_wait: Duration::from_secs(5),
            ..VncSettings::default()
        }
    }

    /// Serve the handshake for a `width`x`height` desktop and swallow the
    /// client's setup messages.
    async fn serve_handshake(server: &mut DuplexStream, width: u16, height: u16) {
        server.write_all(b"RFB 003.008\n").await.unwrap();
        let mut banner = [0u8; 12];
        server.read_exact(&mut banner).await.unwrap();
        server.write_all(&[1, 1]).await.unwrap();
        assert_eq!(server.read_u8().await.unwrap(), 1);
        server.write_u32(0).await.unwrap();
        assert_eq!(server.read_u8().await.unwrap(), 1);
        server.write_u16(width).await.unwrap();
        server.write_u16(height).await.unwrap();
        server.write_all(&PixelFormat::bgrx32().encode()).await.unwrap();
        server.write_u32(4).await.unwrap();
        server.write_all(b"test").await.unwrap();

        let mut set_pf = [0u8; 20];
        server.read_exact(&mut set_pf).await.unwrap();
        assert_eq!(set_pf[0], 0);
        let mut enc_header = [0u8; 4];
        server.read_exact(&mut enc_header).await.unwrap();
        assert_eq!(enc_header[0], 2);
        let count = u16::from_be_bytes([enc_header[2], enc_header[3]]);
        let mut encodings = vec![0u8; usize::from(count) * 4];
        server.read_exact(&mut encodings).await.unwrap();
        let mut first_request = [0u8; 10];
        server.read_exact(&mut first_request).await.unwrap();
        assert_eq!(first_request[1], 0, "first request is non-incremental");
    }

    #[tokio::test]
    async fn capture_returns_normalised_pixels() {
        let (client, mut server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(async move {
            serve_handshake(&mut server, 2, 1).await;
            let mut request = [0u8; 10];
            server.read_exact(&mut request).await.unwrap();
            assert_eq!(request[..2], [3u8, 1]);
            let mut update = vec![0u8, 0, 0, 1, 0, 0, 0, 0, 0, 2, 0, 1, 0, 0, 0, 0];
            update.extend_from_slice(&[30, 20, 10, 0, 3, 2, 1, 0]);
            server.write_all(&update).await.unwrap();
            server
        });

        let mut surface = VncSurface::new(settings(2, 1));
        surface.attach(client).await.unwrap();
        assert!(surface.is_connected());
        let frame = surface.capture_frame().await.unwrap();
        assert_eq!(
            frame.pixels,
            FramePixels::Rgba { width: 2, height: 1, data: vec![10, 20, 30, 255, 1, 2, 3, 255] }
        );
        assert_eq!(frame.indicator, Some((0, 0)));
        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn pointer_actions_scale_and_track_buttons() {
        let (client, mut server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(async move {
            serve_handshake(&mut server, 1600, 1200).await;
            let mut events = Vec::new();
            for _ in 0..3 {
                let mut ev = [0u8; 6];
                server.read_exact(&mut ev).await.unwrap();
                events.push(ev);
            }
            events
        });

        let mut surface = VncSurface::new(settings(800, 600));
        surface.attach(client).await.unwrap();
        surface
            .execute(&Action::Pointer(PointerAction::Move { x: 400, y: 300 }))
            .await
            .unwrap();
        surface
            .execute(&Action::Pointer(PointerAction::Down { button: MouseButton::Right }))
            .await
            .unwrap();
        surface
            .execute(&Action::Pointer(PointerAction::Up { button: MouseButton::Right }))
            .await
            .unwrap();

        let events = server_task.await.unwrap();
        // 400/800 * 1600 = 800 = 0x0320, 300/600 * 1200 = 600 = 0x0258
        assert_eq!(events[0], [5, 0, 0x03, 0x20, 0x02, 0x58]);
        assert_eq!(events[1], [5, 4, 0x03, 0x20, 0x02, 0x58]);
        assert_eq!(events[2], [5, 0, 0x03, 0x20, 0x02, 0x58]);
    }

    #[tokio::test]
    async fn type_sends_press_release_pairs() {
        let (client, mut server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(async move {
            serve_handshake(&mut server, 10, 10).await;
            let mut keys = Vec::new();
            for _ in 0..4 {
                let mut ev = [0u8; 8];
                server.read_exact(&mut ev).await.unwrap();
                keys.push((ev[1], u32::from_be_bytes([ev[4], ev[5], ev[6], ev[7]])));
            }
            keys
        });

        let mut surface = VncSurface::new(settings(10, 10));
        surface.attach(client).await.unwrap();
        surface
            .execute(&Action::Pointer(PointerAction::Type { text: "a\n".into() }))
            .await
            .unwrap();
        let keys = server_task.await.unwrap();
        assert_eq!(keys, vec![(1, 0x61), (0, 0x61), (1, 0xff0d), (0, 0xff0d)]);
    }

    #[tokio::test]
    async fn unknown_key_fails_without_sending() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            serve_handshake(&mut server, 10, 10).await;
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
        });
        let mut surface = VncSurface::new(settings(10, 10));
        surface.attach(client).await.unwrap();
        let err = surface
            .execute(&Action::Pointer(PointerAction::Press { key: "hyperdrive".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::UnknownKey(_)));
    }

    #[tokio::test]
    async fn touch_actions_are_rejected() {
        let mut surface = VncSurface::new(settings(10, 10));
        let err = surface
            .execute(&Action::Touch(crate::actions::TouchAction::Wait { ms: 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Validation { .. }));
    }

    #[tokio::test]
    async fn operations_require_a_session() {
        let mut surface = VncSurface::new(settings(10, 10));
        assert!(!surface.is_connected());
        assert!(matches!(surface.capture_frame().await, Err(PilotError::NotConnected)));
        assert!(matches!(
            surface.execute(&Action::Pointer(PointerAction::Wait { ms: 1 })).await,
            Err(PilotError::NotConnected)
        ));
        surface.disconnect().await;
    }

    #[tokio::test]
    async fn server_hangup_marks_disconnected() {
        let (client, mut server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(async move {
            serve_handshake(&mut server, 10, 10).await;
            drop(server);
        });
        let mut surface = VncSurface::new(settings(10, 10));
        surface.attach(client).await.unwrap();
        server_task.await.unwrap();
        for _ in 0..50 {
            if !surface.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!surface.is_connected());
    }
}
