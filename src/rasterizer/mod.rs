pub mod framebuffer;
pub mod perf_counters;
pub mod tile_commands;

mod tile_raster;
mod triangle_setup;

pub use framebuffer::{Attachment, Framebuffer, PixelFormat};
pub use perf_counters::{
	FramebufferPerfCounters, RendererPerfCounters, TilePerfCounters, FRAMEBUFFER_PERFCOUNTER_NAMES,
	PERFCOUNTER_FREQUENCY, RENDERER_PERFCOUNTER_NAMES, TILE_PERFCOUNTER_NAMES,
};
