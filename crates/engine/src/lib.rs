pub mod assets;
pub mod compiler;
pub mod fallback;
pub mod framing;
pub mod normalize;
pub mod render;
pub mod scene;
pub mod subtitles;
pub mod timeline;

pub use compiler::*;
pub use scene::*;
pub use timeline::*;
