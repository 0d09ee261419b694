//! Static description of every action tag and its fields.
//!
//! Both the validator in `vocabulary.rs` and the structured-output schema
//! handed to the decision service are generated from these tables, so the
//! bounds enforced locally are exactly the bounds advertised to the model.
use serde_json::{json, Map, Value};

use crate::actions::types::ActionFamily;
use crate::actions::vocabulary::ActionVocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Horizontal coordinate, bounded by the logical width.
    X,
    /// Vertical coordinate, bounded by the logical height.
    Y,
    /// Duration in milliseconds, bounded by `max_wait_ms`.
    Millis,
    Button,
    Direction,
    Key,
    Text,
    Pressed,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Value used when the field is omitted. `None` means the field is required.
    pub default: Option<FieldDefault>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldDefault {
    Millis(u32),
    Button(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct TagSpec {
    pub tag: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

impl TagSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec { name, kind, default: None, description }
}

const fn optional(
    name: &'static str,
    kind: FieldKind,
    default: FieldDefault,
    description: &'static str,
) -> FieldSpec {
    FieldSpec { name, kind, default: Some(default), description }
}

pub const POINTER_TAGS: &[TagSpec] = &[
    TagSpec {
        tag: "move",
        description: "MOVE: reposition the cursor to absolute screen coordinates. Does not click. \
                      The red dot overlay shows the current cursor position.",
        fields: &[
            required("x", FieldKind::X, "X coordinate in pixels, 0 = left edge."),
            required("y", FieldKind::Y, "Y coordinate in pixels, 0 = top edge."),
        ],
    },
    TagSpec {
        tag: "down",
        description: "DOWN: press and hold a mouse button until a matching UP. \
                      Click = DOWN, UP. Drag = DOWN, MOVE, UP.",
        fields: &[optional(
            "button",
            FieldKind::Button,
            FieldDefault::Button("left"),
            "Mouse button: left (default), right (context menu) or middle.",
        )],
    },
    TagSpec {
        tag: "up",
        description: "UP: release a held mouse button. Must match the preceding DOWN.",
        fields: &[optional(
            "button",
            FieldKind::Button,
            FieldDefault::Button("left"),
            "Mouse button to release.",
        )],
    },
    TagSpec {
        tag: "press",
        description: "PRESS: press and hold a key until RELEASE. For Ctrl+C: PRESS ctrl, PRESS c, \
                      RELEASE c, RELEASE ctrl.",
        fields: &[required(
            "key",
            FieldKind::Key,
            "Key name: ctrl, alt, shift, win, enter, tab, backspace, delete, space, escape, \
             up, down, left, right, home, end, pageup, pagedown, f1-f12, or a single character.",
        )],
    },
    TagSpec {
        tag: "release",
        description: "RELEASE: release a key held by PRESS. Release in reverse order of pressing.",
        fields: &[required("key", FieldKind::Key, "Key name previously pressed.")],
    },
    TagSpec {
        tag: "type",
        description: "TYPE: enter text character by character into the focused element. \
                      Use PRESS/RELEASE for special keys.",
        fields: &[required("text", FieldKind::Text, "Text to type.")],
    },
    TagSpec {
        tag: "scroll",
        description: "SCROLL: turn the mouse wheel at the current cursor position.",
        fields: &[required(
            "direction",
            FieldKind::Direction,
            "'up' reveals content above, 'down' reveals content below.",
        )],
    },
    TagSpec {
        tag: "wait",
        description: "WAIT: pause before the next action. Use sparingly.",
        fields: &[required("ms", FieldKind::Millis, "Wait duration in milliseconds.")],
    },
];

pub const TOUCH_TAGS: &[TagSpec] = &[
    TagSpec {
        tag: "tap",
        description: "TAP: touch down (pressed=true) or lift (pressed=false) at a point. \
                      Lifting at a different point than the touch-down drags between them. \
                      A lift without a prior touch-down is a quick tap.",
        fields: &[
            required("x", FieldKind::X, "X coordinate, 0 = left edge."),
            required("y", FieldKind::Y, "Y coordinate, 0 = top edge."),
            required("pressed", FieldKind::Pressed, "true = finger down, false = finger up."),
        ],
    },
    TagSpec {
        tag: "hold",
        description: "HOLD: long-press. pressed=true keeps the finger down for ms; \
                      pressed=false lifts it, dragging first if the point moved.",
        fields: &[
            required("x", FieldKind::X, "X coordinate, 0 = left edge."),
            required("y", FieldKind::Y, "Y coordinate, 0 = top edge."),
            required("pressed", FieldKind::Pressed, "true = finger down, false = finger up."),
            optional("ms", FieldKind::Millis, FieldDefault::Millis(800), "Hold duration in milliseconds."),
        ],
    },
    TagSpec {
        tag: "swipe",
        description: "SWIPE: fast fling from start to end, e.g. scrolling a list.",
        fields: &[
            required("startX", FieldKind::X, "Start X coordinate."),
            required("startY", FieldKind::Y, "Start Y coordinate."),
            required("endX", FieldKind::X, "End X coordinate."),
            required("endY", FieldKind::Y, "End Y coordinate."),
            optional("ms", FieldKind::Millis, FieldDefault::Millis(200), "Swipe duration in milliseconds."),
        ],
    },
    TagSpec {
        tag: "drag",
        description: "DRAG: pick up at start, move slowly and drop at end, e.g. moving an icon.",
        fields: &[
            required("startX", FieldKind::X, "Start X coordinate."),
            required("startY", FieldKind::Y, "Start Y coordinate."),
            required("endX", FieldKind::X, "End X coordinate."),
            required("endY", FieldKind::Y, "End Y coordinate."),
            optional("ms", FieldKind::Millis, FieldDefault::Millis(500), "Drag duration in milliseconds."),
        ],
    },
    TagSpec {
        tag: "wait",
        description: "WAIT: pause before the next action, e.g. while an app launches.",
        fields: &[required("ms", FieldKind::Millis, "Wait duration in milliseconds.")],
    },
];

pub fn tags_for(family: ActionFamily) -> &'static [TagSpec] {
    match family {
        ActionFamily::Pointer => POINTER_TAGS,
        ActionFamily::Touch => TOUCH_TAGS,
    }
}

fn field_schema(field: &FieldSpec, vocab: &ActionVocabulary) -> Value {
    let mut schema = match field.kind {
        FieldKind::X => json!({ "type": "integer", "minimum": 0, "maximum": vocab.width() }),
        FieldKind::Y => json!({ "type": "integer", "minimum": 0, "maximum": vocab.height() }),
        FieldKind::Millis => json!({ "type": "integer", "minimum": 0, "maximum": vocab.max_wait_ms() }),
        FieldKind::Button => json!({ "type": "string", "enum": ["left", "right", "middle"] }),
        FieldKind::Direction => json!({ "type": "string", "enum": ["up", "down"] }),
        FieldKind::Key => json!({ "type": "string", "minLength": 1 }),
        FieldKind::Text => json!({ "type": "string", "minLength": 1 }),
        FieldKind::Pressed => json!({ "type": "boolean" }),
    };
    schema["description"] = Value::String(field.description.to_string());
    match field.default {
        Some(FieldDefault::Millis(ms)) => schema["default"] = json!(ms),
        Some(FieldDefault::Button(b)) => schema["default"] = json!(b),
        None => {}
    }
    schema
}

fn tag_schema(spec: &TagSpec, vocab: &ActionVocabulary) -> Value {
    let tag_key = vocab.family().tag_key();
    let mut properties = Map::new();
    properties.insert(tag_key.to_string(), json!({ "const": spec.tag }));
    let mut required = vec![Value::String(tag_key.to_string())];
    for field in spec.fields {
        properties.insert(field.name.to_string(), field_schema(field, vocab));
        if field.default.is_none() {
            required.push(Value::String(field.name.to_string()));
        }
    }
    json!({
        "type": "object",
        "description": spec.description,
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// JSON schema of an `AgentResponse` for this vocabulary.
pub fn response_schema(vocab: &ActionVocabulary) -> Value {
    let items: Vec<Value> = tags_for(vocab.family())
        .iter()
        .map(|spec| tag_schema(spec, vocab))
        .collect();
    json!({
        "type": "object",
        "description": format!(
            "Next input actions for a {}x{} screen. The red dot overlay marks the last {} position.",
            vocab.width(),
            vocab.height(),
            match vocab.family() {
                ActionFamily::Pointer => "cursor",
                ActionFamily::Touch => "touch",
            },
        ),
        "properties": {
            "actions": {
                "type": "array",
                "description": "Ordered input actions, executed sequentially with a short pause between them.",
                "minItems": 1,
                "maxItems": vocab.max_actions(),
                "items": { "oneOf": items },
            }
        },
        "required": ["actions"],
        "additionalProperties": false,
    })
}
