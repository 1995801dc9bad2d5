// Renderer: transforms scene geometry through the view and projection matrices
// and feeds the triangles to the framebuffer rasterizer.

use super::scene::Scene;
use crate::common::{fixed_math::*, matrix::*};
use crate::rasterizer::{perf_counters::*, Framebuffer};

pub struct Renderer
{
	fb: Framebuffer,
	perf_clock: PerfClock,
	perfcounters: RendererPerfCounters,
	// Reused between frames so the steady-state path doesn't allocate.
	vertex_scratch: Vec<Fixed16>,
}

impl Renderer
{
	pub fn new(width: i32, height: i32) -> Self
	{
		Renderer {
			fb: Framebuffer::new(width, height),
			perf_clock: PerfClock::new(),
			perfcounters: RendererPerfCounters::default(),
			vertex_scratch: Vec::new(),
		}
	}

	pub fn framebuffer(&self) -> &Framebuffer
	{
		&self.fb
	}

	pub fn framebuffer_mut(&mut self) -> &mut Framebuffer
	{
		&mut self.fb
	}

	pub fn perfcounters(&self) -> RendererPerfCounters
	{
		self.perfcounters
	}

	pub fn reset_perfcounters(&mut self)
	{
		self.perfcounters = RendererPerfCounters::default();
	}

	pub fn get_perfcounter_frequency(&self) -> u64
	{
		PERFCOUNTER_FREQUENCY
	}

	// Render all instances of the scene into the framebuffer and resolve it.
	pub fn render_scene(&mut self, scene: &Scene)
	{
		self.fb.clear(0);

		let mut transform_start_pc = self.perf_clock.now();

		// The per-instance world transform is identity for now, so one matrix
		// serves every instance.
		let mvp = fixed16_mat4_mul(&scene.projection_matrix, &scene.view_matrix);

		self.perfcounters.mvptransform += self.perf_clock.now() - transform_start_pc;

		for (_instance_id, instance) in scene.instances.iter()
		{
			let model = scene.model(instance.model_id);

			transform_start_pc = self.perf_clock.now();

			self.vertex_scratch.clear();
			for position in model.positions.chunks_exact(3)
			{
				let transformed =
					fixed16_mat4_transform(&mvp, &[position[0], position[1], position[2], int_to_fixed16(1)]);
				self.vertex_scratch.extend_from_slice(&transformed);
			}

			self.perfcounters.mvptransform += self.perf_clock.now() - transform_start_pc;

			self.fb.draw_indexed(&self.vertex_scratch, &model.indices);
		}

		self.fb.resolve();
	}
}
