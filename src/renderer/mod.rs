pub mod renderer;
pub mod scene;

pub use renderer::Renderer;
pub use scene::{ModelShape, Scene};
