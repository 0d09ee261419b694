use base64::Engine as _;

use crate::actions::{ActionFamily, ActionVocabulary};
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

const USER_TURN_TEXT: &str = "Current screen state. Analyze and respond with your next actions:";
const OMITTED_IMAGE_TEXT: &str = "(earlier screenshot omitted)";

/// System prompt describing the surface, its geometry and the goal.
pub fn system_prompt(vocab: &ActionVocabulary, instruction: &str) -> String {
    let (device, medium, marker, example) = match vocab.family() {
        ActionFamily::Pointer => (
            "a desktop computer",
            "mouse and keyboard inputs",
            "A red dot overlay marks the current mouse position.",
            r#"{"actions":[{"action":"move","x":120,"y":40},{"action":"down"},{"action":"up"}]}"#,
        ),
        ActionFamily::Touch => (
            "an Android tablet",
            "touch inputs",
            "A red dot overlay marks your last touch position.",
            r#"{"actions":[{"type":"tap","x":500,"y":500,"pressed":true},{"type":"tap","x":500,"y":500,"pressed":false}]}"#,
        ),
    };
    let (w, h) = (vocab.width(), vocab.height());
    format!(
        "You are autonomously operating {device} through {medium}. \
         You receive screenshots showing the current screen state. {marker} \
         You respond with JSON containing action sequences to execute.\n\
         \n\
         ## SCREEN GEOMETRY\n\
         - Resolution: {w}x{h} pixels\n\
         - Coordinate system: (0,0) is top-left, ({w},{h}) is bottom-right\n\
         \n\
         ## RESPONSE FORMAT\n\
         - Return between 1 and {max} actions; they run in order.\n\
         - Waits are limited to {max_wait} ms.\n\
         - Example: {example}\n\
         \n\
         ## GOAL\n\
         {instruction}",
        max = vocab.max_actions(),
        max_wait = vocab.max_wait_ms(),
    )
}

pub fn image_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// User turn carrying a screenshot.
pub fn user_turn(png: &[u8]) -> ChatMessage {
    ChatMessage::user(MessageContent::Parts(vec![
        ContentPart::Text {
            text: USER_TURN_TEXT.into(),
        },
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image_data_url(png),
                detail: Some("high".into()),
            },
        },
    ]))
}

/// User turn whose screenshot has aged out of the window.
pub fn placeholder_turn() -> ChatMessage {
    ChatMessage::user(MessageContent::Text(format!(
        "{USER_TURN_TEXT} {OMITTED_IMAGE_TEXT}"
    )))
}
