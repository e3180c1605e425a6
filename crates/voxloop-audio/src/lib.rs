pub mod capture;
pub mod device;
pub mod pcm;
pub mod playback;

pub use capture::CaptureNode;
pub use pcm::{decode_chunk, encode_frame, DecodedBuffer};
pub use playback::{OutputNode, PlaybackScheduler, RenderHandle};
