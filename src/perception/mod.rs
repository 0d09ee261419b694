pub mod compositor;
pub mod frame_cache;
pub mod types;

pub use compositor::Compositor;
pub use frame_cache::{CachedFrame, FrameCache};
pub use types::{EncodedFrame, Frame, FramePixels, IndicatorStyle};
