pub mod adb;
#[cfg(test)]
pub(crate) mod mock;
pub mod scaling;
pub mod vnc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::actions::{Action, ActionFamily, ActionVocabulary};
use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{Frame, IndicatorStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Virtual desktop over VNC/RFB.
    Vnc,
    /// Android device over adb.
    Adb,
}

/// A controllable remote screen.
///
/// Implementations are not safe for concurrent use; callers serialize access
/// (the supervisor keeps each surface behind a single async mutex).
#[async_trait]
pub trait RemoteSurface: Send {
    fn kind(&self) -> SurfaceKind;

    fn vocabulary(&self) -> ActionVocabulary;

    fn indicator(&self) -> IndicatorStyle;

    async fn connect(&mut self) -> PilotResult<()>;

    /// Idempotent.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    async fn capture_frame(&mut self) -> PilotResult<Frame>;

    async fn execute(&mut self, action: &Action) -> PilotResult<()>;
}

/// Builds fresh, unconnected surfaces for the supervisor.
pub trait SurfaceFactory: Send + Sync {
    fn kind(&self) -> SurfaceKind;

    fn vocabulary(&self) -> ActionVocabulary;

    fn indicator(&self) -> IndicatorStyle;

    fn create(&self) -> Box<dyn RemoteSurface>;
}

/// Reject actions from the other family before touching the transport.
pub(crate) fn ensure_family(action: &Action, expected: ActionFamily) -> PilotResult<()> {
    if action.family() == expected {
        Ok(())
    } else {
        Err(PilotError::validation(
            "action",
            format!(
                "`{}` belongs to the {:?} family, surface expects {:?}",
                action.name(),
                action.family(),
                expected
            ),
        ))
    }
}
