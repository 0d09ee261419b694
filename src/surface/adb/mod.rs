//! Android device surface driven through `adb` touch injection.
pub mod gesture;
pub mod shell;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::actions::{Action, ActionFamily, ActionVocabulary, TouchAction};
use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{Frame, FramePixels, IndicatorStyle};
use crate::retry::{BoundedRetry, RetryOutcome};
use crate::surface::scaling::CoordinateScaler;
use crate::surface::{ensure_family, RemoteSurface, SurfaceFactory, SurfaceKind};

pub use shell::{DeviceShell, DockerAdbShell};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const TAP_GESTURE_MS: u32 = 300;
const HOLD_SETTLE: Duration = Duration::from_millis(50);
const DRAG_PICKUP: Duration = Duration::from_millis(600);

#[derive(Debug, Clone)]
pub struct AdbSettings {
    /// Resolution the agent reasons in.
    pub target_width: u32,
    pub target_height: u32,
    pub display_density: Option<u32>,
    pub boot_poll_attempts: u32,
    pub boot_poll_interval: Duration,
    /// Upper bound on a single `adb` invocation.
    pub command_timeout: Duration,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            target_width: 1000,
            target_height: 1000,
            display_density: None,
            boot_poll_attempts: 60,
            boot_poll_interval: Duration::from_secs(2),
            command_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Down,
    Move,
    Up,
}

impl Motion {
    fn as_str(self) -> &'static str {
        match self {
            Motion::Down => "DOWN",
            Motion::Move => "MOVE",
            Motion::Up => "UP",
        }
    }
}

pub struct AdbSurface {
    settings: AdbSettings,
    shell: Arc<dyn DeviceShell>,
    connected: bool,
    scaler: CoordinateScaler,
    /// Last touch position, logical coordinates.
    last_touch: (u32, u32),
    /// Where the finger went down, while it is still down.
    touch_down: Option<(u32, u32)>,
}

impl AdbSurface {
    pub fn new(settings: AdbSettings, shell: Arc<dyn DeviceShell>) -> Self {
        let logical = (settings.target_width, settings.target_height);
        Self {
            scaler: CoordinateScaler::new(logical, logical),
            last_touch: (logical.0 / 2, logical.1 / 2),
            touch_down: None,
            connected: false,
            settings,
            shell,
        }
    }

    async fn shell(&self, args: &[&str]) -> PilotResult<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("shell");
        argv.extend_from_slice(args);
        let out = run_bounded(self.shell.as_ref(), &argv, self.settings.command_timeout).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn wait_for_boot(&self) -> PilotResult<()> {
        let retry = BoundedRetry::new(
            self.settings.boot_poll_attempts,
            self.settings.boot_poll_interval,
        );
        let outcome = retry
            .poll("adb boot", |_| {
                let shell = Arc::clone(&self.shell);
                let limit = self.settings.command_timeout;
                async move {
                    let args = ["shell", "getprop", "sys.boot_completed"];
                    match run_bounded(shell.as_ref(), &args, limit).await {
                        Ok(out) => String::from_utf8_lossy(&out).trim() == "1",
                        Err(e) => {
                            tracing::debug!(error = %e, "device not reachable yet");
                            false
                        }
                    }
                }
            })
            .await;
        match outcome {
            RetryOutcome::Ready { .. } => Ok(()),
            RetryOutcome::Exhausted { attempts } => Err(PilotError::DeviceNotReady { attempts }),
        }
    }

    async fn motion(&mut self, motion: Motion, x: u32, y: u32) -> PilotResult<()> {
        let (dx, dy) = self.scaler.to_device(x, y);
        self.shell(&[
            "input",
            "motionevent",
            motion.as_str(),
            &dx.to_string(),
            &dy.to_string(),
        ])
        .await?;
        self.last_touch = (x, y);
        Ok(())
    }

    async fn tap(&mut self, x: u32, y: u32) -> PilotResult<()> {
        let (dx, dy) = self.scaler.to_device(x, y);
        self.shell(&["input", "tap", &dx.to_string(), &dy.to_string()]).await?;
        self.last_touch = (x, y);
        Ok(())
    }

    /// MOVE events from `from` to `to` spread over `duration_ms`.
    async fn move_path(&mut self, from: (u32, u32), to: (u32, u32), duration_ms: u32) -> PilotResult<()> {
        let steps = gesture::path_steps(duration_ms);
        let delay = gesture::step_delay(duration_ms, steps);
        for (x, y) in gesture::interpolate_path(from, to, steps) {
            self.motion(Motion::Move, x, y).await?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn press(&mut self, x: u32, y: u32) -> PilotResult<()> {
        self.motion(Motion::Down, x, y).await?;
        self.touch_down = Some((x, y));
        Ok(())
    }

    /// Lift the finger at `(x, y)`, sliding there first if it went down elsewhere.
    async fn lift(&mut self, x: u32, y: u32, duration_ms: u32, settle: Option<Duration>) -> PilotResult<()> {
        let Some(start) = self.touch_down.take() else {
            return self.tap(x, y).await;
        };
        if start != (x, y) {
            self.move_path(start, (x, y), duration_ms).await?;
        }
        if let Some(settle) = settle {
            tokio::time::sleep(settle).await;
        }
        self.motion(Motion::Up, x, y).await
    }

    /// Lift a finger left down by an earlier press before starting a new gesture.
    async fn release_held(&mut self) -> PilotResult<()> {
        if self.touch_down.take().is_some() {
            let (x, y) = self.last_touch;
            self.motion(Motion::Up, x, y).await?;
        }
        Ok(())
    }

    fn clamp(&self, x: u32, y: u32) -> (u32, u32) {
        (x.min(self.settings.target_width), y.min(self.settings.target_height))
    }

    async fn run_touch(&mut self, action: &TouchAction) -> PilotResult<()> {
        match *action {
            TouchAction::Tap { x, y, pressed } => {
                let (x, y) = self.clamp(x, y);
                if pressed {
                    self.press(x, y).await
                } else {
                    self.lift(x, y, TAP_GESTURE_MS, None).await
                }
            }
            TouchAction::Hold { x, y, pressed, ms } => {
                let (x, y) = self.clamp(x, y);
                if pressed {
                    self.press(x, y).await?;
                    tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
                    Ok(())
                } else {
                    self.lift(x, y, ms, Some(HOLD_SETTLE)).await
                }
            }
            TouchAction::Swipe { start_x, start_y, end_x, end_y, ms } => {
                let (sx, sy) = self.clamp(start_x, start_y);
                let (ex, ey) = self.clamp(end_x, end_y);
                let (dsx, dsy) = self.scaler.to_device(sx, sy);
                let (dex, dey) = self.scaler.to_device(ex, ey);
                self.release_held().await?;
                self.shell(&[
                    "input",
                    "swipe",
                    &dsx.to_string(),
                    &dsy.to_string(),
                    &dex.to_string(),
                    &dey.to_string(),
                    &ms.to_string(),
                ])
                .await?;
                self.last_touch = (ex, ey);
                Ok(())
            }
            TouchAction::Drag { start_x, start_y, end_x, end_y, ms } => {
                let start = self.clamp(start_x, start_y);
                let end = self.clamp(end_x, end_y);
                self.release_held().await?;
                self.motion(Motion::Down, start.0, start.1).await?;
                tokio::time::sleep(DRAG_PICKUP).await;
                self.move_path(start, end, ms).await?;
                self.motion(Motion::Up, end.0, end.1).await
            }
            TouchAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
                Ok(())
            }
        }
    }

    /// Treat bridge failures that mean the device is gone as a disconnect.
    fn observe<T>(&mut self, result: PilotResult<T>) -> PilotResult<T> {
        if let Err(PilotError::Device(msg)) = &result {
            let lower = msg.to_ascii_lowercase();
            if ["device offline", "not found", "no devices", "failed to spawn", "timed out"]
                .iter()
                .any(|needle| lower.contains(needle))
            {
                tracing::warn!(error = %msg, "device bridge lost");
                self.connected = false;
            }
        }
        result
    }
}

/// Run one `adb` invocation, giving up after `limit`.
///
/// Dropping the pending call kills the child process.
async fn run_bounded(shell: &dyn DeviceShell, args: &[&str], limit: Duration) -> PilotResult<Vec<u8>> {
    match tokio::time::timeout(limit, shell.run(args)).await {
        Ok(result) => result,
        Err(_) => Err(PilotError::Device(format!(
            "`adb {}` timed out after {}s",
            args.join(" "),
            limit.as_secs_f32()
        ))),
    }
}

/// Parse `wm size` output, preferring an override over the physical size.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let re = Regex::new(r"(Override|Physical) size:\s*(\d+)x(\d+)").ok()?;
    let mut physical = None;
    for caps in re.captures_iter(output) {
        let size = (caps[2].parse().ok()?, caps[3].parse().ok()?);
        if &caps[1] == "Override" {
            return Some(size);
        }
        physical = Some(size);
    }
    physical
}

#[async_trait]
impl RemoteSurface for AdbSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Adb
    }

    fn vocabulary(&self) -> ActionVocabulary {
        ActionVocabulary::touch(self.settings.target_width, self.settings.target_height)
    }

    fn indicator(&self) -> IndicatorStyle {
        IndicatorStyle::touch()
    }

    async fn connect(&mut self) -> PilotResult<()> {
        if self.connected {
            return Ok(());
        }
        self.wait_for_boot().await?;

        let wm = self.shell(&["wm", "size"]).await.map_err(bridge_to_connect)?;
        let device = parse_wm_size(&wm).ok_or_else(|| {
            PilotError::Protocol(format!("unrecognised `wm size` output: {}", wm.trim()))
        })?;
        self.scaler = CoordinateScaler::new(
            (self.settings.target_width, self.settings.target_height),
            device,
        );

        if let Some(density) = self.settings.display_density {
            self.shell(&["wm", "density", &density.to_string()])
                .await
                .map_err(bridge_to_connect)?;
        }

        self.touch_down = None;
        self.connected = true;
        tracing::info!(width = device.0, height = device.1, "device bridge connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.connected {
            tracing::info!("device bridge disconnected");
        }
        self.connected = false;
        self.touch_down = None;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn capture_frame(&mut self) -> PilotResult<Frame> {
        if !self.connected {
            return Err(PilotError::NotConnected);
        }
        let args = ["exec-out", "screencap", "-p"];
        let result = run_bounded(self.shell.as_ref(), &args, self.settings.command_timeout).await;
        let png = self.observe(result)?;
        if png.is_empty() {
            return Err(PilotError::Capture("screencap returned no data".into()));
        }
        if !png.starts_with(PNG_MAGIC) {
            return Err(PilotError::Capture("screencap did not return a PNG".into()));
        }
        Ok(Frame {
            pixels: FramePixels::Encoded(png),
            logical_width: self.settings.target_width,
            logical_height: self.settings.target_height,
            indicator: Some(self.last_touch),
        })
    }

    async fn execute(&mut self, action: &Action) -> PilotResult<()> {
        ensure_family(action, ActionFamily::Touch)?;
        if !self.connected {
            return Err(PilotError::NotConnected);
        }
        let Action::Touch(touch) = action else {
            return Ok(());
        };
        let result = self.run_touch(touch).await;
        self.observe(result)
    }
}

fn bridge_to_connect(err: PilotError) -> PilotError {
    match err {
        PilotError::Device(msg) => PilotError::Connect(msg),
        other => other,
    }
}

pub struct AdbSurfaceFactory {
    settings: AdbSettings,
    shell: Arc<dyn DeviceShell>,
}

impl AdbSurfaceFactory {
    pub fn new(settings: AdbSettings, shell: Arc<dyn DeviceShell>) -> Self {
        Self { settings, shell }
    }
}

impl SurfaceFactory for AdbSurfaceFactory {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Adb
    }

    fn vocabulary(&self) -> ActionVocabulary {
        ActionVocabulary::touch(self.settings.target_width, self.settings.target_height)
    }

    fn indicator(&self) -> IndicatorStyle {
        IndicatorStyle::touch()
    }

    fn create(&self) -> Box<dyn RemoteSurface> {
        Box::new(AdbSurface::new(self.settings.clone(), Arc::clone(&self.shell)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every invocation and answers from a fixed script.
    pub(crate) struct ScriptedShell {
        pub calls: Mutex<Vec<String>>,
        pub booted_after: u32,
        pub wm_size: String,
        pub screencap: Vec<u8>,
        /// Invocations containing this never complete.
        pub hang_on: Option<&'static str>,
    }

    impl ScriptedShell {
        pub(crate) fn new(wm_size: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                booted_after: 1,
                wm_size: wm_size.to_string(),
                screencap: PNG_MAGIC.to_vec(),
                hang_on: None,
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceShell for ScriptedShell {
        async fn run(&self, args: &[&str]) -> PilotResult<Vec<u8>> {
            let line = args.join(" ");
            let boot_polls = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(line.clone());
                calls.iter().filter(|c| c.contains("boot_completed")).count() as u32
            };
            if self.hang_on.is_some_and(|needle| line.contains(needle)) {
                std::future::pending::<()>().await;
            }
            match line.as_str() {
                "shell getprop sys.boot_completed" => {
                    Ok(if boot_polls >= self.booted_after { b"1\n".to_vec() } else { b"\n".to_vec() })
                }
                "shell wm size" => Ok(self.wm_size.clone().into_bytes()),
                "exec-out screencap -p" => Ok(self.screencap.clone()),
                _ => Ok(Vec::new()),
            }
        }
    }

    fn input_calls(shell: &ScriptedShell) -> Vec<String> {
        shell
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("shell input"))
            .collect()
    }

    async fn connected(shell: Arc<ScriptedShell>) -> AdbSurface {
        let mut surface = AdbSurface::new(AdbSettings::default(), shell);
        surface.connect().await.unwrap();
        surface
    }

    #[test]
    fn wm_size_prefers_override() {
        assert_eq!(parse_wm_size("Physical size: 1080x2280\n"), Some((1080, 2280)));
        assert_eq!(
            parse_wm_size("Physical size: 1080x2280\nOverride size: 720x1520\n"),
            Some((720, 1520))
        );
        assert_eq!(parse_wm_size("garbage"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn hold_release_elsewhere_interpolates() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(Arc::clone(&shell)).await;

        let down = TouchAction::Hold { x: 100, y: 100, pressed: true, ms: 800 };
        let up = TouchAction::Hold { x: 400, y: 300, pressed: false, ms: 200 };
        surface.execute(&Action::Touch(down)).await.unwrap();
        surface.execute(&Action::Touch(up)).await.unwrap();

        let calls = input_calls(&shell);
        assert_eq!(calls.first().unwrap(), "shell input motionevent DOWN 100 100");
        assert_eq!(calls.last().unwrap(), "shell input motionevent UP 400 300");
        let moves: Vec<_> = calls.iter().filter(|c| c.contains("MOVE")).collect();
        assert!(moves.len() >= 10);
        assert_eq!(moves.last().unwrap().as_str(), "shell input motionevent MOVE 400 300");
        assert_eq!(surface.last_touch, (400, 300));
    }

    #[tokio::test(start_paused = true)]
    async fn tap_release_in_place_skips_path() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(Arc::clone(&shell)).await;
        surface
            .execute(&Action::Touch(TouchAction::Tap { x: 10, y: 20, pressed: true }))
            .await
            .unwrap();
        surface
            .execute(&Action::Touch(TouchAction::Tap { x: 10, y: 20, pressed: false }))
            .await
            .unwrap();
        assert_eq!(
            input_calls(&shell),
            ["shell input motionevent DOWN 10 20", "shell input motionevent UP 10 20"]
        );
    }

    #[tokio::test]
    async fn release_without_press_is_plain_tap() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1080x2280"));
        let mut surface = connected(Arc::clone(&shell)).await;
        surface
            .execute(&Action::Touch(TouchAction::Tap { x: 500, y: 500, pressed: false }))
            .await
            .unwrap();
        assert_eq!(input_calls(&shell), ["shell input tap 540 1140"]);
    }

    #[tokio::test]
    async fn swipe_scales_both_ends() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1080x2280"));
        let mut surface = connected(Arc::clone(&shell)).await;
        let swipe = TouchAction::Swipe { start_x: 0, start_y: 1000, end_x: 1000, end_y: 0, ms: 200 };
        surface.execute(&Action::Touch(swipe)).await.unwrap();
        assert_eq!(input_calls(&shell), ["shell input swipe 0 2279 1079 0 200"]);
    }

    #[tokio::test(start_paused = true)]
    async fn drag_picks_up_moves_and_drops() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(Arc::clone(&shell)).await;
        let drag = TouchAction::Drag { start_x: 0, start_y: 0, end_x: 500, end_y: 0, ms: 500 };
        let started = tokio::time::Instant::now();
        surface.execute(&Action::Touch(drag)).await.unwrap();
        assert!(started.elapsed() >= DRAG_PICKUP + Duration::from_millis(500));

        let calls = input_calls(&shell);
        assert_eq!(calls[0], "shell input motionevent DOWN 0 0");
        assert_eq!(calls[calls.len() - 2], "shell input motionevent MOVE 500 0");
        assert_eq!(calls[calls.len() - 1], "shell input motionevent UP 500 0");
    }

    #[tokio::test(start_paused = true)]
    async fn boot_timeout_is_device_not_ready() {
        let mut shell = ScriptedShell::new("Physical size: 1000x1000");
        shell.booted_after = u32::MAX;
        let shell = Arc::new(shell);
        let mut surface = AdbSurface::new(AdbSettings::default(), Arc::clone(&shell) as Arc<dyn DeviceShell>);
        let err = surface.connect().await.unwrap_err();
        assert!(matches!(err, PilotError::DeviceNotReady { attempts: 60 }));
        assert!(!surface.is_connected());
        assert_eq!(shell.calls().len(), 60);
    }

    #[tokio::test]
    async fn density_override_is_applied() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let settings = AdbSettings { display_density: Some(240), ..AdbSettings::default() };
        let mut surface = AdbSurface::new(settings, Arc::clone(&shell) as Arc<dyn DeviceShell>);
        surface.connect().await.unwrap();
        assert!(shell.calls().contains(&"shell wm density 240".to_string()));
    }

    #[tokio::test]
    async fn capture_rejects_non_png() {
        let mut shell = ScriptedShell::new("Physical size: 1000x1000");
        shell.screencap = b"error: closed".to_vec();
        let mut surface = connected(Arc::new(shell)).await;
        assert!(matches!(surface.capture_frame().await, Err(PilotError::Capture(_))));
    }

    #[tokio::test]
    async fn capture_reports_last_touch() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(shell).await;
        let frame = surface.capture_frame().await.unwrap();
        assert_eq!(frame.indicator, Some((500, 500)));
        assert!(matches!(frame.pixels, FramePixels::Encoded(_)));
    }

    #[tokio::test]
    async fn pointer_actions_are_rejected() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(shell).await;
        let err = surface
            .execute(&Action::Pointer(crate::actions::PointerAction::Wait { ms: 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn press_then_swipe_lifts_first() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(Arc::clone(&shell)).await;
        surface
            .execute(&Action::Touch(TouchAction::Tap { x: 10, y: 10, pressed: true }))
            .await
            .unwrap();
        let swipe = TouchAction::Swipe { start_x: 100, start_y: 100, end_x: 200, end_y: 200, ms: 200 };
        surface.execute(&Action::Touch(swipe)).await.unwrap();
        assert_eq!(
            input_calls(&shell),
            [
                "shell input motionevent DOWN 10 10",
                "shell input motionevent UP 10 10",
                "shell input swipe 100 100 200 200 200",
            ]
        );
        assert_eq!(surface.touch_down, None);
    }

    #[tokio::test(start_paused = true)]
    async fn press_then_drag_lifts_first() {
        let shell = Arc::new(ScriptedShell::new("Physical size: 1000x1000"));
        let mut surface = connected(Arc::clone(&shell)).await;
        surface
            .execute(&Action::Touch(TouchAction::Hold { x: 10, y: 10, pressed: true, ms: 100 }))
            .await
            .unwrap();
        let drag = TouchAction::Drag { start_x: 0, start_y: 0, end_x: 300, end_y: 0, ms: 300 };
        surface.execute(&Action::Touch(drag)).await.unwrap();

        let calls = input_calls(&shell);
        assert_eq!(
            calls[..3],
            [
                "shell input motionevent DOWN 10 10",
                "shell input motionevent UP 10 10",
                "shell input motionevent DOWN 0 0",
            ]
        );
        assert_eq!(calls.last().unwrap(), "shell input motionevent UP 300 0");
        assert_eq!(calls.iter().filter(|c| c.contains(" UP ")).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_boot_check_exhausts_attempts() {
        let mut shell = ScriptedShell::new("Physical size: 1000x1000");
        shell.hang_on = Some("boot_completed");
        let settings = AdbSettings {
            boot_poll_attempts: 3,
            command_timeout: Duration::from_secs(1),
            ..AdbSettings::default()
        };
        let mut surface = AdbSurface::new(settings, Arc::new(shell));
        let started = tokio::time::Instant::now();
        let err = surface.connect().await.unwrap_err();
        assert!(matches!(err, PilotError::DeviceNotReady { attempts: 3 }));
        assert!(started.elapsed() <= Duration::from_secs(10));
        assert!(!surface.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_wm_size_fails_connect() {
        let mut shell = ScriptedShell::new("Physical size: 1000x1000");
        shell.hang_on = Some("wm size");
        let mut surface = AdbSurface::new(AdbSettings::default(), Arc::new(shell));
        let started = tokio::time::Instant::now();
        match surface.connect().await {
            Err(PilotError::Connect(msg)) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected connect error, got {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_secs(31));
        assert!(!surface.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_input_drops_the_connection() {
        let mut shell = ScriptedShell::new("Physical size: 1000x1000");
        shell.hang_on = Some("shell input");
        let mut surface = connected(Arc::new(shell)).await;
        let err = surface
            .execute(&Action::Touch(TouchAction::Tap { x: 5, y: 5, pressed: false }))
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Device(_)));
        assert!(!surface.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_screencap_drops_the_connection() {
        let mut shell = ScriptedShell::new("Physical size: 1000x1000");
        shell.hang_on = Some("screencap");
        let mut surface = connected(Arc::new(shell)).await;
        assert!(matches!(surface.capture_frame().await, Err(PilotError::Device(_))));
        assert!(!surface.is_connected());
        assert!(matches!(surface.capture_frame().await, Err(PilotError::NotConnected)));
    }
}
