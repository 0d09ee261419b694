use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::schema::{self, FieldDefault, FieldKind, TagSpec};
use crate::actions::types::{
    Action, ActionFamily, AgentResponse, MouseButton, PointerAction, ScrollDirection, TouchAction,
};
use crate::errors::{PilotError, PilotResult};

pub const MAX_WAIT_MS: u32 = 10_000;
pub const MAX_POINTER_ACTIONS: usize = 20;
pub const MAX_TOUCH_ACTIONS: usize = 100;

/// Bounds of the action language a surface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionVocabulary {
    family: ActionFamily,
    width: u32,
    height: u32,
    max_actions: usize,
    max_wait_ms: u32,
}

#[derive(Debug, Clone)]
enum FieldValue {
    Uint(u32),
    Bool(bool),
    Str(String),
    Button(MouseButton),
    Direction(ScrollDirection),
}

struct Checked(HashMap<&'static str, FieldValue>);

impl Checked {
    fn uint(&self, name: &str) -> u32 {
        match self.0.get(name) {
            Some(FieldValue::Uint(v)) => *v,
            _ => 0,
        }
    }

    fn flag(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(FieldValue::Bool(true)))
    }

    fn text(&mut self, name: &str) -> String {
        match self.0.remove(name) {
            Some(FieldValue::Str(s)) => s,
            _ => String::new(),
        }
    }

    fn button(&self) -> MouseButton {
        match self.0.get("button") {
            Some(FieldValue::Button(b)) => *b,
            _ => MouseButton::Left,
        }
    }

    fn direction(&self) -> ScrollDirection {
        match self.0.get("direction") {
            Some(FieldValue::Direction(d)) => *d,
            _ => ScrollDirection::Down,
        }
    }
}

impl ActionVocabulary {
    /// Desktop vocabulary (move/down/up/press/release/type/scroll/wait).
    pub fn pointer(width: u32, height: u32) -> Self {
        Self {
            family: ActionFamily::Pointer,
            width,
            height,
            max_actions: MAX_POINTER_ACTIONS,
            max_wait_ms: MAX_WAIT_MS,
        }
    }

    /// Touch vocabulary (tap/hold/swipe/drag/wait).
    pub fn touch(width: u32, height: u32) -> Self {
        Self {
            family: ActionFamily::Touch,
            width,
            height,
            max_actions: MAX_TOUCH_ACTIONS,
            max_wait_ms: MAX_WAIT_MS,
        }
    }

    pub fn family(&self) -> ActionFamily {
        self.family
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn max_actions(&self) -> usize {
        self.max_actions
    }

    pub fn max_wait_ms(&self) -> u32 {
        self.max_wait_ms
    }

    pub fn json_schema(&self) -> Value {
        schema::response_schema(self)
    }

    /// Parse the raw text returned by the decision service.
    /// Tolerates a surrounding markdown code fence.
    pub fn parse_response(&self, content: &str) -> PilotResult<AgentResponse> {
        let body = strip_code_fence(content);
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PilotError::validation("response", format!("not valid JSON: {e}")))?;
        self.validate_response(&value)
    }

    pub fn validate_response(&self, raw: &Value) -> PilotResult<AgentResponse> {
        let obj = raw
            .as_object()
            .ok_or_else(|| PilotError::validation("response", "must be an object"))?;
        if let Some(extra) = obj.keys().find(|k| k.as_str() != "actions") {
            return Err(PilotError::validation(extra.as_str(), "unexpected field"));
        }
        let items = obj
            .get("actions")
            .ok_or_else(|| PilotError::validation("actions", "is required"))?
            .as_array()
            .ok_or_else(|| PilotError::validation("actions", "must be an array"))?;
        if items.is_empty() {
            return Err(PilotError::validation("actions", "must contain at least 1 action"));
        }
        if items.len() > self.max_actions {
            return Err(PilotError::validation(
                "actions",
                format!("must contain at most {} actions, got {}", self.max_actions, items.len()),
            ));
        }
        let actions = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.validate_at(item, &format!("actions[{i}]")))
            .collect::<PilotResult<Vec<_>>>()?;
        Ok(AgentResponse { actions })
    }

    pub fn validate_action(&self, raw: &Value) -> PilotResult<Action> {
        self.validate_at(raw, "action")
    }

    fn validate_at(&self, raw: &Value, path: &str) -> PilotResult<Action> {
        let obj = raw
            .as_object()
            .ok_or_else(|| PilotError::validation(path, "must be an object"))?;
        let tag_key = self.family.tag_key();
        let tag_path = format!("{path}.{tag_key}");
        let tag = obj
            .get(tag_key)
            .ok_or_else(|| PilotError::validation(&tag_path, "is required"))?
            .as_str()
            .ok_or_else(|| PilotError::validation(&tag_path, "must be a string"))?;

        let tags = schema::tags_for(self.family);
        let spec = tags.iter().find(|s| s.tag == tag).ok_or_else(|| {
            let known: Vec<&str> = tags.iter().map(|s| s.tag).collect();
            PilotError::validation(
                &tag_path,
                format!("unknown action `{tag}`, expected one of {}", known.join(", ")),
            )
        })?;

        for key in obj.keys() {
            if key != tag_key && spec.field(key).is_none() {
                return Err(PilotError::validation(format!("{path}.{key}"), "unexpected field"));
            }
        }

        let checked = self.check_fields(spec, obj, path)?;
        Ok(build_action(self.family, spec.tag, checked))
    }

    fn check_fields(
        &self,
        spec: &TagSpec,
        obj: &serde_json::Map<String, Value>,
        path: &str,
    ) -> PilotResult<Checked> {
        let mut values = HashMap::new();
        for field in spec.fields {
            let field_path = format!("{path}.{}", field.name);
            let value = match obj.get(field.name) {
                None | Some(Value::Null) => match field.default {
                    Some(FieldDefault::Millis(ms)) => FieldValue::Uint(ms),
                    Some(FieldDefault::Button(b)) => {
                        FieldValue::Button(MouseButton::parse(b).unwrap_or_default())
                    }
                    None => return Err(PilotError::validation(field_path, "is required")),
                },
                Some(v) => self.check_value(field.kind, v, &field_path)?,
            };
            values.insert(field.name, value);
        }
        Ok(Checked(values))
    }

    fn check_value(&self, kind: FieldKind, v: &Value, path: &str) -> PilotResult<FieldValue> {
        match kind {
            FieldKind::X => bounded_uint(v, self.width, path).map(FieldValue::Uint),
            FieldKind::Y => bounded_uint(v, self.height, path).map(FieldValue::Uint),
            FieldKind::Millis => bounded_uint(v, self.max_wait_ms, path).map(FieldValue::Uint),
            FieldKind::Pressed => v
                .as_bool()
                .map(FieldValue::Bool)
                .ok_or_else(|| PilotError::validation(path, "must be a boolean")),
            FieldKind::Button => {
                let s = v
                    .as_str()
                    .ok_or_else(|| PilotError::validation(path, "must be a string"))?;
                MouseButton::parse(s)
                    .map(FieldValue::Button)
                    .ok_or_else(|| {
                        PilotError::validation(path, format!("`{s}` is not one of left, right, middle"))
                    })
            }
            FieldKind::Direction => {
                let s = v
                    .as_str()
                    .ok_or_else(|| PilotError::validation(path, "must be a string"))?;
                ScrollDirection::parse(s)
                    .map(FieldValue::Direction)
                    .ok_or_else(|| PilotError::validation(path, format!("`{s}` is not one of up, down")))
            }
            FieldKind::Key | FieldKind::Text => {
                let s = v
                    .as_str()
                    .ok_or_else(|| PilotError::validation(path, "must be a string"))?;
                if s.is_empty() {
                    return Err(PilotError::validation(path, "must not be empty"));
                }
                Ok(FieldValue::Str(s.to_string()))
            }
        }
    }
}

fn bounded_uint(v: &Value, max: u32, path: &str) -> PilotResult<u32> {
    if let Some(n) = v.as_u64() {
        if n > u64::from(max) {
            return Err(PilotError::validation(path, format!("must be <= {max}, got {n}")));
        }
        return Ok(n as u32);
    }
    if let Some(n) = v.as_i64() {
        return Err(PilotError::validation(path, format!("must be >= 0, got {n}")));
    }
    Err(PilotError::validation(path, "must be an integer"))
}

fn build_action(family: ActionFamily, tag: &str, mut c: Checked) -> Action {
    match family {
        ActionFamily::Pointer => Action::Pointer(match tag {
            "move" => PointerAction::Move { x: c.uint("x"), y: c.uint("y") },
            "down" => PointerAction::Down { button: c.button() },
            "up" => PointerAction::Up { button: c.button() },
            "press" => PointerAction::Press { key: c.text("key") },
            "release" => PointerAction::Release { key: c.text("key") },
            "type" => PointerAction::Type { text: c.text("text") },
            "scroll" => PointerAction::Scroll { direction: c.direction() },
            _ => PointerAction::Wait { ms: c.uint("ms") },
        }),
        ActionFamily::Touch => Action::Touch(match tag {
            "tap" => TouchAction::Tap {
                x: c.uint("x"),
                y: c.uint("y"),
                pressed: c.flag("pressed"),
            },
            "hold" => TouchAction::Hold {
                x: c.uint("x"),
                y: c.uint("y"),
                pressed: c.flag("pressed"),
                ms: c.uint("ms"),
            },
            "swipe" => TouchAction::Swipe {
                start_x: c.uint("startX"),
                start_y: c.uint("startY"),
                end_x: c.uint("endX"),
                end_y: c.uint("endY"),
                ms: c.uint("ms"),
            },
            "drag" => TouchAction::Drag {
                start_x: c.uint("startX"),
                start_y: c.uint("startY"),
                end_x: c.uint("endX"),
                end_y: c.uint("endY"),
                ms: c.uint("ms"),
            },
            _ => TouchAction::Wait { ms: c.uint("ms") },
        }),
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desktop() -> ActionVocabulary {
        ActionVocabulary::pointer(800, 600)
    }

    fn tablet() -> ActionVocabulary {
        ActionVocabulary::touch(1000, 1000)
    }

    fn field_of(err: PilotError) -> String {
        match err {
            PilotError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn serialized_actions_validate_back_to_themselves() {
        let pointer = vec![
            PointerAction::Move { x: 800, y: 0 },
            PointerAction::Down { button: MouseButton::Right },
            PointerAction::Up { button: MouseButton::Middle },
            PointerAction::Press { key: "ctrl".into() },
            PointerAction::Release { key: "c".into() },
            PointerAction::Type { text: "héllo wörld".into() },
            PointerAction::Scroll { direction: ScrollDirection::Up },
            PointerAction::Wait { ms: 10_000 },
        ];
        for p in pointer {
            let action = Action::Pointer(p);
            let raw = serde_json::to_value(&action).unwrap();
            assert_eq!(desktop().validate_action(&raw).unwrap(), action);
        }

        let touch = vec![
            TouchAction::Tap { x: 0, y: 1000, pressed: true },
            TouchAction::Hold { x: 10, y: 20, pressed: false, ms: 0 },
            TouchAction::Swipe { start_x: 1, start_y: 2, end_x: 3, end_y: 4, ms: 200 },
            TouchAction::Drag { start_x: 500, start_y: 500, end_x: 0, end_y: 0, ms: 9999 },
            TouchAction::Wait { ms: 5 },
        ];
        for t in touch {
            let action = Action::Touch(t);
            let raw = serde_json::to_value(&action).unwrap();
            assert_eq!(tablet().validate_action(&raw).unwrap(), action);
        }
    }

    #[test]
    fn coordinates_at_bounds_pass_and_beyond_fail() {
        let v = desktop();
        assert!(v.validate_action(&json!({"action": "move", "x": 0, "y": 0})).is_ok());
        assert!(v.validate_action(&json!({"action": "move", "x": 800, "y": 600})).is_ok());

        let err = v
            .validate_action(&json!({"action": "move", "x": 801, "y": 10}))
            .unwrap_err();
        assert_eq!(field_of(err), "action.x");
        let err = v
            .validate_action(&json!({"action": "move", "x": 10, "y": 601}))
            .unwrap_err();
        assert_eq!(field_of(err), "action.y");
        let err = v
            .validate_action(&json!({"action": "move", "x": -1, "y": 10}))
            .unwrap_err();
        assert_eq!(field_of(err), "action.x");

        let t = tablet();
        assert!(t
            .validate_action(&json!({"type": "swipe", "startX": 1000, "startY": 1000, "endX": 0, "endY": 0}))
            .is_ok());
        let err = t
            .validate_action(&json!({"type": "swipe", "startX": 0, "startY": 0, "endX": 1001, "endY": 0}))
            .unwrap_err();
        assert_eq!(field_of(err), "action.endX");
    }

    #[test]
    fn wait_is_bounded() {
        let v = desktop();
        assert!(v.validate_action(&json!({"action": "wait", "ms": 10000})).is_ok());
        let err = v.validate_action(&json!({"action": "wait", "ms": 10001})).unwrap_err();
        assert_eq!(field_of(err), "action.ms");
        let err = v.validate_action(&json!({"action": "wait", "ms": 1.5})).unwrap_err();
        assert_eq!(field_of(err), "action.ms");
    }

    #[test]
    fn defaults_are_filled() {
        let down = desktop().validate_action(&json!({"action": "down"})).unwrap();
        assert_eq!(down, Action::Pointer(PointerAction::Down { button: MouseButton::Left }));

        let hold = tablet()
            .validate_action(&json!({"type": "hold", "x": 1, "y": 2, "pressed": true}))
            .unwrap();
        assert_eq!(
            hold,
            Action::Touch(TouchAction::Hold { x: 1, y: 2, pressed: true, ms: 800 })
        );
        let drag = tablet()
            .validate_action(&json!({"type": "drag", "startX": 1, "startY": 2, "endX": 3, "endY": 4}))
            .unwrap();
        assert!(matches!(drag, Action::Touch(TouchAction::Drag { ms: 500, .. })));
    }

    #[test]
    fn unknown_tags_and_fields_are_named() {
        let err = desktop().validate_action(&json!({"action": "click", "x": 1})).unwrap_err();
        assert_eq!(field_of(err), "action.action");

        let err = desktop()
            .validate_action(&json!({"action": "move", "x": 1, "y": 1, "z": 3}))
            .unwrap_err();
        assert_eq!(field_of(err), "action.z");

        let err = desktop().validate_action(&json!({"action": "down", "button": "side"})).unwrap_err();
        assert_eq!(field_of(err), "action.button");

        let err = desktop().validate_action(&json!({"action": "type", "text": ""})).unwrap_err();
        assert_eq!(field_of(err), "action.text");

        // Touch tags are not part of the pointer vocabulary.
        let err = desktop().validate_action(&json!({"type": "tap", "x": 1, "y": 1, "pressed": true})).unwrap_err();
        assert_eq!(field_of(err), "action.action");
    }

    #[test]
    fn empty_response_is_rejected() {
        let err = desktop().validate_response(&json!({"actions": []})).unwrap_err();
        assert_eq!(field_of(err), "actions");
    }

    #[test]
    fn oversized_response_is_rejected() {
        let actions: Vec<Value> = (0..21).map(|_| json!({"action": "wait", "ms": 1})).collect();
        let err = desktop().validate_response(&json!({ "actions": actions })).unwrap_err();
        assert_eq!(field_of(err), "actions");

        let actions: Vec<Value> = (0..100).map(|_| json!({"type": "wait", "ms": 1})).collect();
        assert_eq!(tablet().validate_response(&json!({ "actions": actions })).unwrap().actions.len(), 100);
    }

    #[test]
    fn response_errors_carry_the_index() {
        let err = desktop()
            .validate_response(&json!({"actions": [
                {"action": "move", "x": 1, "y": 1},
                {"action": "move", "x": 1, "y": 900}
            ]}))
            .unwrap_err();
        assert_eq!(field_of(err), "actions[1].y");
    }

    #[test]
    fn parse_response_accepts_fenced_json_and_keeps_order() {
        let content = "```json\n{\"actions\":[{\"action\":\"move\",\"x\":5,\"y\":6},{\"action\":\"down\"},{\"action\":\"up\"}]}\n```";
        let resp = desktop().parse_response(content).unwrap();
        let names: Vec<&str> = resp.actions.iter().map(Action::name).collect();
        assert_eq!(names, vec!["move", "down", "up"]);

        let err = desktop().parse_response("not json").unwrap_err();
        assert_eq!(field_of(err), "response");
    }
}
