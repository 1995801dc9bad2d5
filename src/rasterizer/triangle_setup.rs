// Triangle setup: near/far clipping, window transform, bounding box and
// orientation, edge equation setup and tile binning. This is the producer
// side of the per-tile command buffers; the consumer side lives in tile_raster.

use super::{
	framebuffer::{Framebuffer, Xyzw},
	tile_commands::*,
};
use crate::common::fixed_math::*;

#[derive(Copy, Clone, PartialEq, Eq)]
enum ClipPlane
{
	Near,
	Far,
}

fn vertex_clipped(plane: ClipPlane, v: &Xyzw) -> bool
{
	match plane
	{
		ClipPlane::Near => v.z < 0,
		ClipPlane::Far => v.z >= v.w,
	}
}

// Move the "to" end of an edge onto the clip plane.
// The interpolation factor is the plane distance of "from" over the
// difference of plane distances along the edge.
fn clip_edge(plane: ClipPlane, from: &Xyzw, to: &Xyzw) -> Xyzw
{
	let a = match plane
	{
		ClipPlane::Near => fixed16_div(from.z, from.z.wrapping_sub(to.z)),
		ClipPlane::Far =>
		{
			let from_dist = from.z.wrapping_sub(from.w);
			let to_dist = to.z.wrapping_sub(to.w);
			fixed16_div(from_dist, from_dist.wrapping_sub(to_dist))
		},
	};
	let one_minus_a = int_to_fixed16(1) - a;

	let w = fixed16_add(fixed16_mul(one_minus_a, from.w), fixed16_mul(a, to.w));
	debug_assert!(w != 0);

	Xyzw {
		x: fixed16_add(fixed16_mul(one_minus_a, from.x), fixed16_mul(a, to.x)),
		y: fixed16_add(fixed16_mul(one_minus_a, from.y), fixed16_mul(a, to.y)),
		z: match plane
		{
			ClipPlane::Near => 0,
			ClipPlane::Far => w - 1,
		},
		w,
	}
}

// 1/(2*area) as a pseudo float with an 8-bit mantissa and an exponent biased by 127.
// Avoids a full Q16.16 division in the pixel loop: the consumer applies the
// exponent as a shift to the negated edge values and multiplies by the mantissa.
fn rcp_triarea2_small(triarea2: i32) -> u32
{
	let triarea2_mantissa_rshift = (31 - 8) - triarea2.leading_zeros() as i32;
	let triarea2_mantissa = if triarea2_mantissa_rshift < 0
	{
		triarea2 << -triarea2_mantissa_rshift
	}
	else
	{
		triarea2 >> triarea2_mantissa_rshift
	};

	// The mantissa is normalized as 1.8, and so is the numerator of the division.
	let mut rcp_mantissa = 0xFFFF / triarea2_mantissa;
	debug_assert!(rcp_mantissa != 0);

	// Denormalize the reciprocal mantissa so it fits in 8 bits.
	let rcp_mantissa_rshift = (31 - 7) - rcp_mantissa.leading_zeros() as i32;
	rcp_mantissa = if rcp_mantissa_rshift < 0
	{
		rcp_mantissa << -rcp_mantissa_rshift
	}
	else
	{
		rcp_mantissa >> rcp_mantissa_rshift
	};

	debug_assert!(rcp_mantissa < 0x100);
	let rcp_exponent = (127 + triarea2_mantissa_rshift - rcp_mantissa_rshift) as u32;
	(rcp_exponent << 8) | (rcp_mantissa as u32 & 0xFF)
}

// Same as above with a 16-bit mantissa, for large triangles.
fn rcp_triarea2_large(triarea2: i64) -> u32
{
	let triarea2_mantissa_rshift = (63 - 16) - triarea2.leading_zeros() as i32;
	let triarea2_mantissa = (if triarea2_mantissa_rshift < 0
	{
		triarea2 << -triarea2_mantissa_rshift
	}
	else
	{
		triarea2 >> triarea2_mantissa_rshift
	}) as u32;

	// The mantissa is normalized as 1.16, and so is the numerator of the division.
	let mut rcp_mantissa = (0xFFFFFFFFu32 / triarea2_mantissa) as i32;
	debug_assert!(rcp_mantissa != 0);

	let rcp_mantissa_rshift = (31 - 15) - rcp_mantissa.leading_zeros() as i32;
	rcp_mantissa = if rcp_mantissa_rshift < 0
	{
		rcp_mantissa << -rcp_mantissa_rshift
	}
	else
	{
		rcp_mantissa >> rcp_mantissa_rshift
	};

	debug_assert!(rcp_mantissa < 0x10000);
	let rcp_exponent = (127 + triarea2_mantissa_rshift - rcp_mantissa_rshift) as u32;
	(rcp_exponent << 16) | (rcp_mantissa as u32 & 0xFFFF)
}

// Top-left rule: the edge is a tie-breaking edge if it is horizontal and goes
// right to left, or if it goes strictly downward, in clockwise winding.
fn is_top_left_edge(v: &Xyzw, v1: &Xyzw) -> bool
{
	(v.y == v1.y && v.x < v1.x) || v.y > v1.y
}

impl Framebuffer
{
	pub(super) fn rasterize_triangle(&mut self, mut clip_verts: [Xyzw; 3])
	{
		let mut clipping_start_pc = self.perf_clock.now();

		for &plane in &[ClipPlane::Near, ClipPlane::Far]
		{
			let clipped = [
				vertex_clipped(plane, &clip_verts[0]),
				vertex_clipped(plane, &clip_verts[1]),
				vertex_clipped(plane, &clip_verts[2]),
			];
			let num_clipped = clipped.iter().filter(|&&c| c).count();

			if num_clipped == 3
			{
				self.perfcounters.clipping += self.perf_clock.now() - clipping_start_pc;
				return;
			}

			if num_clipped == 2
			{
				// Two vertices outside: cut both associated edges short.
				let mut unclipped_vert = 0;
				if !clipped[1]
				{
					unclipped_vert = 1;
				}
				else if !clipped[2]
				{
					unclipped_vert = 2;
				}

				let v1 = (unclipped_vert + 1) % 3;
				let v2 = (unclipped_vert + 2) % 3;

				clip_verts[v1] = clip_edge(plane, &clip_verts[unclipped_vert], &clip_verts[v1]);
				clip_verts[v2] = clip_edge(plane, &clip_verts[unclipped_vert], &clip_verts[v2]);
			}

			if num_clipped == 1
			{
				// One vertex outside: split into two triangles along the plane.
				let mut clipped_vert = 0;
				if clipped[1]
				{
					clipped_vert = 1;
				}
				else if clipped[2]
				{
					clipped_vert = 2;
				}

				let v1 = (clipped_vert + 1) % 3;
				let v2 = (clipped_vert + 2) % 3;

				let clipped1 = clip_edge(plane, &clip_verts[clipped_vert], &clip_verts[v1]);
				let clipped2 = clip_edge(plane, &clip_verts[clipped_vert], &clip_verts[v2]);

				// Rasterize the first triangle of the split; this triangle
				// continues as the second one.
				let mut split_verts = clip_verts;
				split_verts[clipped_vert] = clipped1;

				self.perfcounters.clipping += self.perf_clock.now() - clipping_start_pc;
				self.rasterize_triangle(split_verts);
				clipping_start_pc = self.perf_clock.now();

				clip_verts[clipped_vert] = clipped2;
				clip_verts[v1] = clipped1;
			}
		}

		self.perfcounters.clipping += self.perf_clock.now() - clipping_start_pc;

		let commonsetup_start_pc = self.perf_clock.now();

		// Transform from clip space to Q16.8 window coordinates.
		// Window y grows downwards, so the image origin is the top left corner.
		let mut verts = [Xyzw { x: 0, y: 0, z: 0, w: 0 }; 3];
		let mut rcp_ws = [0 as Fixed16; 3];
		for v in 0 .. 3
		{
			let one_over_w = fixed16_div(int_to_fixed16(1), clip_verts[v].w);

			verts[v].x = fixed16_to_fixed8(fixed16_mul(
				fixed16_div(
					fixed16_add(fixed16_mul(clip_verts[v].x, one_over_w), int_to_fixed16(1)),
					int_to_fixed16(2),
				),
				int_to_fixed16(self.width_in_pixels),
			));
			verts[v].y = fixed16_to_fixed8(fixed16_mul(
				fixed16_div(
					fixed16_add(
						fixed16_mul(clip_verts[v].y.wrapping_neg(), one_over_w),
						int_to_fixed16(1),
					),
					int_to_fixed16(2),
				),
				int_to_fixed16(self.height_in_pixels),
			));
			verts[v].z = fixed16_mul(clip_verts[v].z, one_over_w);
			verts[v].w = clip_verts[v].w;
			rcp_ws[v] = one_over_w;
		}

		let mut min_z = verts[0].z as u32;
		let mut max_z = verts[0].z as u32;
		for v in 1 .. 3
		{
			min_z = min_z.min(verts[v].z as u32);
			max_z = max_z.max(verts[v].z as u32);
		}

		let bbox_min_x = verts[0].x.min(verts[1].x).min(verts[2].x);
		let bbox_max_x = verts[0].x.max(verts[1].x).max(verts[2].x);
		let bbox_min_y = verts[0].y.min(verts[1].y).min(verts[2].y);
		let bbox_max_y = verts[0].y.max(verts[1].y).max(verts[2].y);

		// Discard triangles fully outside the scissor rect (the whole window).
		if bbox_max_x < 0 ||
			bbox_max_y < 0 ||
			bbox_min_x >= (self.width_in_pixels << 8) ||
			bbox_min_y >= (self.height_in_pixels << 8)
		{
			self.perfcounters.common_setup += self.perf_clock.now() - commonsetup_start_pc;
			return;
		}

		let clamped_bbox_min_x = bbox_min_x.max(0);
		let clamped_bbox_min_y = bbox_min_y.max(0);
		let clamped_bbox_max_x = bbox_max_x.min((self.width_in_pixels << 8) - 1);
		let clamped_bbox_max_y = bbox_max_y.min((self.height_in_pixels << 8) - 1);

		// "Small" triangles are no wider than a tile.
		let is_large = (bbox_max_x - bbox_min_x) >= (TILE_WIDTH_IN_PIXELS << 8) ||
			(bbox_max_y - bbox_min_y) >= (TILE_WIDTH_IN_PIXELS << 8);

		self.perfcounters.common_setup += self.perf_clock.now() - commonsetup_start_pc;

		if is_large
		{
			self.setup_large_triangle(
				verts,
				rcp_ws,
				min_z,
				max_z,
				clamped_bbox_min_x,
				clamped_bbox_min_y,
				clamped_bbox_max_x,
				clamped_bbox_max_y,
			);
		}
		else
		{
			self.setup_small_triangle(verts, rcp_ws, min_z, max_z, bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y);
		}
	}

	// A small triangle overlaps at most a 2x2 block of tiles. Its vertices are
	// rebased to the last tile of the block so edge values fit in 32 bits.
	#[allow(clippy::too_many_arguments)]
	fn setup_small_triangle(
		&mut self,
		mut verts: [Xyzw; 3],
		mut rcp_ws: [Fixed16; 3],
		min_z: u32,
		max_z: u32,
		bbox_min_x: i32,
		bbox_min_y: i32,
		bbox_max_x: i32,
		bbox_max_y: i32,
	)
	{
		let mut setup_start_pc = self.perf_clock.now();

		let first_tile_x = (bbox_min_x >> 8) / TILE_WIDTH_IN_PIXELS;
		let first_tile_y = (bbox_min_y >> 8) / TILE_WIDTH_IN_PIXELS;
		let last_tile_x = (bbox_max_x >> 8) / TILE_WIDTH_IN_PIXELS;
		let last_tile_y = (bbox_max_y >> 8) / TILE_WIDTH_IN_PIXELS;

		// Window coordinates of the corners of the 2x2 tile block.
		let first_tile_px_x = (first_tile_x << 8) * TILE_WIDTH_IN_PIXELS;
		let first_tile_px_y = (first_tile_y << 8) * TILE_WIDTH_IN_PIXELS;
		let last_tile_px_x = (last_tile_x << 8) * TILE_WIDTH_IN_PIXELS;
		let last_tile_px_y = (last_tile_y << 8) * TILE_WIDTH_IN_PIXELS;

		// Range of overlapped coarse blocks, relative to the top left tile of the block.
		let first_rel_cb_x = ((bbox_min_x - first_tile_px_x) >> 8) / COARSE_BLOCK_WIDTH_IN_PIXELS;
		let first_rel_cb_y = ((bbox_min_y - first_tile_px_y) >> 8) / COARSE_BLOCK_WIDTH_IN_PIXELS;
		let last_rel_cb_x = ((bbox_max_x - first_tile_px_x) >> 8) / COARSE_BLOCK_WIDTH_IN_PIXELS;
		let last_rel_cb_y = ((bbox_max_y - first_tile_px_y) >> 8) / COARSE_BLOCK_WIDTH_IN_PIXELS;

		for v in 0 .. 3
		{
			// Rebasing brings the coordinates down to 4 hex digits of precision.
			debug_assert!(verts[v].x - last_tile_px_x >= -(128 << 8) && verts[v].x - last_tile_px_x <= (128 << 8) - 1);
			debug_assert!(verts[v].y - last_tile_px_y >= -(128 << 8) && verts[v].y - last_tile_px_y <= (128 << 8) - 1);

			verts[v].x -= last_tile_px_x;
			verts[v].y -= last_tile_px_y;
		}

		let triarea2 = (((verts[1].x - verts[0].x) as i64 * (verts[2].y - verts[0].y) as i64 -
			(verts[1].y - verts[0].y) as i64 * (verts[2].x - verts[0].x) as i64) >>
			8) as i32;

		if triarea2 == 0
		{
			// Degenerate triangle.
			self.perfcounters.smalltri_setup += self.perf_clock.now() - setup_start_pc;
			return;
		}

		let triarea2 = if triarea2 < 0
		{
			// Force clockwise orientation.
			verts.swap(1, 2);
			rcp_ws.swap(1, 2);
			-triarea2
		}
		else
		{
			triarea2
		};

		let rcp_triarea2 = rcp_triarea2_small(triarea2);

		// Edge equations, evaluated at (0.5, 0.5) relative to the last tile.
		let mut edges = [0i32; 3];
		let mut edge_dxs = [0i32; 3];
		let mut edge_dys = [0i32; 3];
		for v in 0 .. 3
		{
			let v1 = (v + 1) % 3;

			edge_dxs[v] = verts[v1].y - verts[v].y;
			edge_dys[v] = verts[v].x - verts[v1].x;

			let mut edge = (FIXED8_HALF - verts[v].x) as i64 * edge_dxs[v] as i64 -
				(FIXED8_HALF - verts[v].y) as i64 * (-edge_dys[v]) as i64;

			// Top-left rule: shift tie-breaking edges ever so slightly outward,
			// so adjacent triangles never shade a shared pixel twice.
			if is_top_left_edge(&verts[v], &verts[v1])
			{
				edge -= 1;
			}

			// Truncate. The top-left rule works out as the rounding mode.
			edges[v] = (edge >> 8) as i32;
		}

		// Rotate the triangle so the vertex opposite the steepest edge lands in
		// slot 2; that vertex's barycentric is reconstructed from the other two.
		let mut max_slope_edge = -1i32;
		let mut max_slope = 0i64;
		for i in 0 .. 3
		{
			let slope = edge_dxs[i] as i64 * edge_dxs[i] as i64 + edge_dys[i] as i64 * edge_dys[i] as i64;
			if slope > max_slope
			{
				max_slope_edge = i as i32;
				max_slope = slope;
			}
		}
		if max_slope_edge >= 0
		{
			let opposite_vertex = (max_slope_edge as usize + 2) % 3;
			let num_rotations = (opposite_vertex + 1) % 3;
			for _ in 0 .. num_rotations
			{
				edges.rotate_left(1);
				edge_dxs.rotate_left(1);
				edge_dys.rotate_left(1);
				verts.rotate_left(1);
				rcp_ws.rotate_left(1);
			}
		}

		let mut drawsmalltricmd = DrawSmallTriCmd {
			edges: [0; 3],
			edge_dxs,
			edge_dys,
			vert_zs: [verts[0].z, verts[1].z, verts[2].z],
			max_z,
			min_z,
			rcp_triarea2,
			first_coarse_x: 0,
			last_coarse_x: 0,
			first_coarse_y: 0,
			last_coarse_y: 0,
		};

		let first_tile_id = first_tile_y * self.width_in_tiles + first_tile_x;

		// Top left tile.
		if first_tile_x >= 0 && first_tile_y >= 0
		{
			for v in 0 .. 3
			{
				drawsmalltricmd.edges[v] = edges[v] +
					(edge_dxs[v] * (first_tile_x - last_tile_x) + edge_dys[v] * (first_tile_y - last_tile_y)) *
						TILE_WIDTH_IN_PIXELS;
			}

			drawsmalltricmd.first_coarse_x = first_rel_cb_x.max(0);
			drawsmalltricmd.last_coarse_x = last_rel_cb_x.min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);
			drawsmalltricmd.first_coarse_y = first_rel_cb_y.max(0);
			drawsmalltricmd.last_coarse_y = last_rel_cb_y.min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);

			self.perfcounters.smalltri_setup += self.perf_clock.now() - setup_start_pc;
			self.push_tile_command(first_tile_id, &drawsmalltricmd.encode());
			setup_start_pc = self.perf_clock.now();
		}

		// Top right tile.
		if last_tile_x > first_tile_x && last_tile_x < self.width_in_tiles && first_tile_y >= 0
		{
			for v in 0 .. 3
			{
				drawsmalltricmd.edges[v] =
					edges[v] + edge_dys[v] * (first_tile_y - last_tile_y) * TILE_WIDTH_IN_PIXELS;
			}

			drawsmalltricmd.first_coarse_x = 0;
			drawsmalltricmd.last_coarse_x = (last_rel_cb_x - TILE_WIDTH_IN_COARSE_BLOCKS).min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);
			drawsmalltricmd.first_coarse_y = first_rel_cb_y.max(0);
			drawsmalltricmd.last_coarse_y = last_rel_cb_y.min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);

			self.perfcounters.smalltri_setup += self.perf_clock.now() - setup_start_pc;
			self.push_tile_command(first_tile_id + 1, &drawsmalltricmd.encode());
			setup_start_pc = self.perf_clock.now();
		}

		// Bottom left tile.
		if last_tile_y > first_tile_y && first_tile_x >= 0 && last_tile_y < self.height_in_tiles
		{
			for v in 0 .. 3
			{
				drawsmalltricmd.edges[v] =
					edges[v] + edge_dxs[v] * (first_tile_x - last_tile_x) * TILE_WIDTH_IN_PIXELS;
			}

			drawsmalltricmd.first_coarse_x = first_rel_cb_x.max(0);
			drawsmalltricmd.last_coarse_x = last_rel_cb_x.min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);
			drawsmalltricmd.first_coarse_y = 0;
			drawsmalltricmd.last_coarse_y = (last_rel_cb_y - TILE_WIDTH_IN_COARSE_BLOCKS).min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);

			self.perfcounters.smalltri_setup += self.perf_clock.now() - setup_start_pc;
			self.push_tile_command(first_tile_id + self.width_in_tiles, &drawsmalltricmd.encode());
			setup_start_pc = self.perf_clock.now();
		}

		// Bottom right tile.
		if last_tile_x > first_tile_x &&
			last_tile_y > first_tile_y &&
			last_tile_x < self.width_in_tiles &&
			last_tile_y < self.height_in_tiles
		{
			drawsmalltricmd.edges = edges;

			drawsmalltricmd.first_coarse_x = 0;
			drawsmalltricmd.last_coarse_x = (last_rel_cb_x - TILE_WIDTH_IN_COARSE_BLOCKS).min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);
			drawsmalltricmd.first_coarse_y = 0;
			drawsmalltricmd.last_coarse_y = (last_rel_cb_y - TILE_WIDTH_IN_COARSE_BLOCKS).min(TILE_WIDTH_IN_COARSE_BLOCKS - 1);

			self.perfcounters.smalltri_setup += self.perf_clock.now() - setup_start_pc;
			self.push_tile_command(first_tile_id + 1 + self.width_in_tiles, &drawsmalltricmd.encode());
			setup_start_pc = self.perf_clock.now();
		}

		self.perfcounters.smalltri_setup += self.perf_clock.now() - setup_start_pc;
	}

	// Large triangles are binned by walking every tile in the bounding box and
	// testing the tile corners against each edge: the most inside corner for
	// trivial rejection, the most outside corner for trivial acceptance.
	#[allow(clippy::too_many_arguments)]
	fn setup_large_triangle(
		&mut self,
		mut verts: [Xyzw; 3],
		mut rcp_ws: [Fixed16; 3],
		min_z: u32,
		max_z: u32,
		clamped_bbox_min_x: i32,
		clamped_bbox_min_y: i32,
		clamped_bbox_max_x: i32,
		clamped_bbox_max_y: i32,
	)
	{
		let mut setup_start_pc = self.perf_clock.now();

		let first_tile_x = (clamped_bbox_min_x >> 8) / TILE_WIDTH_IN_PIXELS;
		let first_tile_y = (clamped_bbox_min_y >> 8) / TILE_WIDTH_IN_PIXELS;
		let last_tile_x = (clamped_bbox_max_x >> 8) / TILE_WIDTH_IN_PIXELS;
		let last_tile_y = (clamped_bbox_max_y >> 8) / TILE_WIDTH_IN_PIXELS;

		let first_tile_px_x = (first_tile_x << 8) * TILE_WIDTH_IN_PIXELS;
		let first_tile_px_y = (first_tile_y << 8) * TILE_WIDTH_IN_PIXELS;

		// Multiplying two Q16.8 coordinates takes up to 48 bits, so the edge
		// equations use 64-bit math here. The tens of thousands of pixels a
		// large triangle generates outweigh the more expensive setup.
		let triarea2 = ((verts[1].x - verts[0].x) as i64 * (verts[2].y - verts[0].y) as i64 -
			(verts[1].y - verts[0].y) as i64 * (verts[2].x - verts[0].x) as i64) >>
			8;

		if triarea2 == 0
		{
			// Degenerate triangle.
			self.perfcounters.largetri_setup += self.perf_clock.now() - setup_start_pc;
			return;
		}

		let triarea2 = if triarea2 < 0
		{
			// Force clockwise orientation.
			verts.swap(1, 2);
			rcp_ws.swap(1, 2);
			-triarea2
		}
		else
		{
			triarea2
		};

		let rcp_triarea2 = rcp_triarea2_large(triarea2);

		// Edge equations at the first tile's top left sample point (+0.5, +0.5).
		let mut edges = [0i64; 3];
		let mut edge_dxs = [0i64; 3];
		let mut edge_dys = [0i64; 3];
		for v in 0 .. 3
		{
			let v1 = (v + 1) % 3;

			edge_dxs[v] = (verts[v1].y - verts[v].y) as i64;
			edge_dys[v] = (verts[v].x - verts[v1].x) as i64;

			let mut edge = (first_tile_px_x as i64 + FIXED8_HALF as i64 - verts[v].x as i64) * edge_dxs[v] -
				(first_tile_px_y as i64 + FIXED8_HALF as i64 - verts[v].y as i64) * (-edge_dys[v]);

			if is_top_left_edge(&verts[v], &verts[v1])
			{
				edge -= 1;
			}

			edges[v] = edge >> 8;
		}

		let mut tile_edge_dxs = [0i64; 3];
		let mut tile_edge_dys = [0i64; 3];
		for v in 0 .. 3
		{
			tile_edge_dxs[v] = edge_dxs[v] * TILE_WIDTH_IN_PIXELS as i64;
			tile_edge_dys[v] = edge_dys[v] * TILE_WIDTH_IN_PIXELS as i64;
		}

		let mut edge_trivrejs = [0i64; 3];
		let mut edge_trivaccs = [0i64; 3];
		for v in 0 .. 3
		{
			edge_trivrejs[v] = edges[v];
			edge_trivaccs[v] = edges[v];
			if tile_edge_dxs[v] < 0
			{
				edge_trivrejs[v] += tile_edge_dxs[v];
			}
			if tile_edge_dxs[v] > 0
			{
				edge_trivaccs[v] += tile_edge_dxs[v];
			}
			if tile_edge_dys[v] < 0
			{
				edge_trivrejs[v] += tile_edge_dys[v];
			}
			if tile_edge_dys[v] > 0
			{
				edge_trivaccs[v] += tile_edge_dys[v];
			}
		}

		let mut tile_row_start = first_tile_y * self.width_in_tiles + first_tile_x;
		for _tile_y in first_tile_y ..= last_tile_y
		{
			let mut tile_i_edges = edges;
			let mut tile_i_edge_trivrejs = edge_trivrejs;
			let mut tile_i_edge_trivaccs = edge_trivaccs;

			let mut tile_i = tile_row_start;

			for _tile_x in first_tile_x ..= last_tile_x
			{
				// Trivially rejected if at least one edge doesn't cover the tile at all.
				let trivially_rejected = tile_i_edge_trivrejs[0] >= 0 ||
					tile_i_edge_trivrejs[1] >= 0 ||
					tile_i_edge_trivrejs[2] >= 0;

				if !trivially_rejected
				{
					let edge_needs_test = [
						tile_i_edge_trivaccs[0] >= 0,
						tile_i_edge_trivaccs[1] >= 0,
						tile_i_edge_trivaccs[2] >= 0,
					];
					let num_tests_necessary =
						edge_needs_test.iter().filter(|&&needs_test| needs_test).count();

					// The edges to test come first in the command, so the
					// triangle's edges and vertices are rotated together.
					let mut vertex_rotation = 0;
					if num_tests_necessary == 1
					{
						if edge_needs_test[1]
						{
							vertex_rotation = 1;
						}
						else if edge_needs_test[2]
						{
							vertex_rotation = 2;
						}
					}
					else if num_tests_necessary == 2
					{
						if !edge_needs_test[0]
						{
							vertex_rotation = 1;
						}
						else if !edge_needs_test[1]
						{
							vertex_rotation = 2;
						}
					}

					let mut drawtilecmd = DrawTileCmd {
						num_test_edges: num_tests_necessary as u32,
						edges: [0; 3],
						edge_dxs: [0; 3],
						edge_dys: [0; 3],
						vert_zs: [0; 3],
						max_z,
						min_z,
						rcp_triarea2,
					};

					for v in 0 .. 3
					{
						let rotated_v = (v + vertex_rotation) % 3;

						if v < num_tests_necessary
						{
							// Edges to test must fit in 32 bits; trivial accept and
							// reject only let nearby edges through, so they do.
							debug_assert!(
								tile_i_edges[rotated_v] >= i32::MIN as i64 && tile_i_edges[rotated_v] <= i32::MAX as i64
							);
							debug_assert!(edge_dxs[rotated_v] >= i32::MIN as i64 && edge_dxs[rotated_v] <= i32::MAX as i64);
							debug_assert!(edge_dys[rotated_v] >= i32::MIN as i64 && edge_dys[rotated_v] <= i32::MAX as i64);
						}

						drawtilecmd.edges[v] = tile_i_edges[rotated_v] as i32;
						drawtilecmd.edge_dxs[v] = edge_dxs[rotated_v] as i32;
						drawtilecmd.edge_dys[v] = edge_dys[rotated_v] as i32;
						drawtilecmd.vert_zs[v] = verts[rotated_v].z;
					}

					self.perfcounters.largetri_setup += self.perf_clock.now() - setup_start_pc;
					self.push_tile_command(tile_i, &drawtilecmd.encode());
					setup_start_pc = self.perf_clock.now();
				}

				tile_i += 1;
				for v in 0 .. 3
				{
					tile_i_edges[v] += tile_edge_dxs[v];
					tile_i_edge_trivrejs[v] += tile_edge_dxs[v];
					tile_i_edge_trivaccs[v] += tile_edge_dxs[v];
				}
			}

			tile_row_start += self.width_in_tiles;
			for v in 0 .. 3
			{
				edges[v] += tile_edge_dys[v];
				edge_trivrejs[v] += tile_edge_dys[v];
				edge_trivaccs[v] += tile_edge_dys[v];
			}
		}

		self.perfcounters.largetri_setup += self.perf_clock.now() - setup_start_pc;
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn test_rcp_triarea2_small_inverts()
	{
		for &triarea2 in &[1, 2, 3, 100, 255, 256, 1000, 0x7FFFFF]
		{
			let packed = rcp_triarea2_small(triarea2);
			let mantissa = (packed & 0xFF) as i64;
			let exponent = ((packed >> 8) & 0xFF) as i32;
			let rshift = exponent - 127;

			// Reconstruct 1/triarea2 scaled by 2^16 the way the pixel loop does:
			// shift a value by the exponent, multiply by the mantissa.
			let value = 1i64 << 16;
			let shifted = if rshift < 0 { value << -rshift } else { value >> rshift };
			let product = shifted * mantissa;
			let reconstructed = product as f64 / 2.0;

			let expected = 65536.0 * 32768.0 / triarea2 as f64;
			let relative_error = (reconstructed - expected).abs() / expected;
			assert!(relative_error < 0.02, "triarea2 = {}: error {}", triarea2, relative_error);
		}
	}

	#[test]
	fn test_rcp_triarea2_large_inverts()
	{
		for &triarea2 in &[1i64, 7, 1000, 0xFFFF, 0x123456, 0x7FFFFFFF, 0x123456789]
		{
			let packed = rcp_triarea2_large(triarea2);
			let mantissa = (packed & 0xFFFF) as i64;
			let exponent = ((packed >> 16) & 0xFF) as i32;
			let rshift = exponent - 127;

			let value = 1i128 << 40;
			let shifted = if rshift < 0 { value << -rshift } else { value >> rshift };
			let product = (shifted * mantissa as i128) >> 16;
			let reconstructed = product as f64 / 2.0;

			let expected = (1i64 << 40) as f64 * 32768.0 / triarea2 as f64;
			let relative_error = (reconstructed - expected).abs() / expected;
			assert!(relative_error < 0.001, "triarea2 = {}: error {}", triarea2, relative_error);
		}
	}
}
