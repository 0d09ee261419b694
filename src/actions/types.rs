use serde::{Deserialize, Serialize};

/// Which action family a surface speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFamily {
    Pointer,
    Touch,
}

impl ActionFamily {
    /// JSON key carrying the discriminant for this family.
    pub fn tag_key(self) -> &'static str {
        match self {
            ActionFamily::Pointer => "action",
            ActionFamily::Touch => "type",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "middle" => Some(Self::Middle),
            _ => None,
        }
    }

    /// RFB pointer button-mask bit.
    pub fn mask_bit(self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Desktop-style input over the display protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PointerAction {
    Move { x: u32, y: u32 },
    Down { button: MouseButton },
    Up { button: MouseButton },
    Press { key: String },
    Release { key: String },
    Type { text: String },
    Scroll { direction: ScrollDirection },
    Wait { ms: u32 },
}

/// Touch gestures over the device bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TouchAction {
    Tap {
        x: u32,
        y: u32,
        pressed: bool,
    },
    Hold {
        x: u32,
        y: u32,
        pressed: bool,
        ms: u32,
    },
    Swipe {
        #[serde(rename = "startX")]
        start_x: u32,
        #[serde(rename = "startY")]
        start_y: u32,
        #[serde(rename = "endX")]
        end_x: u32,
        #[serde(rename = "endY")]
        end_y: u32,
        ms: u32,
    },
    Drag {
        #[serde(rename = "startX")]
        start_x: u32,
        #[serde(rename = "startY")]
        start_y: u32,
        #[serde(rename = "endX")]
        end_x: u32,
        #[serde(rename = "endY")]
        end_y: u32,
        ms: u32,
    },
    Wait {
        ms: u32,
    },
}

/// One atomic, validated input primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Pointer(PointerAction),
    Touch(TouchAction),
}

impl Action {
    pub fn family(&self) -> ActionFamily {
        match self {
            Action::Pointer(_) => ActionFamily::Pointer,
            Action::Touch(_) => ActionFamily::Touch,
        }
    }

    /// Short tag used in logs and history.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Pointer(p) => match p {
                PointerAction::Move { .. } => "move",
                PointerAction::Down { .. } => "down",
                PointerAction::Up { .. } => "up",
                PointerAction::Press { .. } => "press",
                PointerAction::Release { .. } => "release",
                PointerAction::Type { .. } => "type",
                PointerAction::Scroll { .. } => "scroll",
                PointerAction::Wait { .. } => "wait",
            },
            Action::Touch(t) => match t {
                TouchAction::Tap { .. } => "tap",
                TouchAction::Hold { .. } => "hold",
                TouchAction::Swipe { .. } => "swipe",
                TouchAction::Drag { .. } => "drag",
                TouchAction::Wait { .. } => "wait",
            },
        }
    }
}

/// Ordered batch returned by the decision service. Never empty once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub actions: Vec<Action>,
}
