// Tile command consumers: the per-tile rasterization that runs when a tile's
// command queue is resolved. Pixels are addressed through the morton swizzle;
// rows advance with the mask-subtract trick instead of recomputing the deposit.

use super::{framebuffer::Framebuffer, tile_commands::*};
use crate::common::bit_ops::*;

// Apply the reciprocal-area exponent to a negated edge value.
fn apply_rcp_shift(value: i32, rshift: i32) -> i32
{
	if rshift < 0
	{
		value << -rshift
	}
	else
	{
		value >> rshift
	}
}

impl Framebuffer
{
	// Rasterize a small triangle over the coarse block range of the command.
	pub(super) fn draw_tile_smalltri(&mut self, tile_id: i32, drawcmd: &DrawSmallTriCmd)
	{
		let mut tile_start_pc = self.perf_clock.now();

		let mut coarse_edge_dxs = [0i32; 3];
		let mut coarse_edge_dys = [0i32; 3];
		for v in 0 .. 3
		{
			coarse_edge_dxs[v] = drawcmd.edge_dxs[v].wrapping_mul(COARSE_BLOCK_WIDTH_IN_PIXELS);
			coarse_edge_dys[v] = drawcmd.edge_dys[v].wrapping_mul(COARSE_BLOCK_WIDTH_IN_PIXELS);
		}

		let mut edges = [0i32; 3];
		for v in 0 .. 3
		{
			edges[v] = drawcmd.edges[v]
				.wrapping_add(coarse_edge_dxs[v].wrapping_mul(drawcmd.first_coarse_x))
				.wrapping_add(coarse_edge_dys[v].wrapping_mul(drawcmd.first_coarse_y));
		}

		let tile_y = tile_id / self.width_in_tiles;
		let tile_x = tile_id - tile_y * self.width_in_tiles;

		for cb_y in drawcmd.first_coarse_y ..= drawcmd.last_coarse_y
		{
			let mut row_edges = edges;

			for cb_x in drawcmd.first_coarse_x ..= drawcmd.last_coarse_x
			{
				let mut coarse_cmd = *drawcmd;
				coarse_cmd.edges = row_edges;

				let coarse_topleft_x = tile_x * TILE_WIDTH_IN_PIXELS + cb_x * COARSE_BLOCK_WIDTH_IN_PIXELS;
				let coarse_topleft_y = tile_y * TILE_WIDTH_IN_PIXELS + cb_y * COARSE_BLOCK_WIDTH_IN_PIXELS;

				self.tile_perfcounters[tile_id as usize].smalltri_tile_raster += self.perf_clock.now() - tile_start_pc;
				self.draw_coarse_block_smalltri(tile_id, coarse_topleft_x, coarse_topleft_y, &coarse_cmd);
				tile_start_pc = self.perf_clock.now();

				for v in 0 .. 3
				{
					row_edges[v] = row_edges[v].wrapping_add(coarse_edge_dxs[v]);
				}
			}

			for v in 0 .. 3
			{
				edges[v] = edges[v].wrapping_add(coarse_edge_dys[v]);
			}
		}

		self.tile_perfcounters[tile_id as usize].smalltri_tile_raster += self.perf_clock.now() - tile_start_pc;
	}

	fn draw_coarse_block_smalltri(
		&mut self,
		tile_id: i32,
		coarse_topleft_x: i32,
		coarse_topleft_y: i32,
		drawcmd: &DrawSmallTriCmd,
	)
	{
		let coarse_start_pc = self.perf_clock.now();

		let mut edges = drawcmd.edges;

		let tile_start_i = PIXELS_PER_TILE * tile_id;

		let mut fineblock_ybits = pdep_u32(coarse_topleft_y as u32, TILE_Y_SWIZZLE_MASK);
		for _fineblock_y in 0 .. COARSE_BLOCK_WIDTH_IN_PIXELS
		{
			let mut row_edges = edges;

			let mut fineblock_xbits = pdep_u32(coarse_topleft_x as u32, TILE_X_SWIZZLE_MASK);
			for _fineblock_x in 0 .. COARSE_BLOCK_WIDTH_IN_PIXELS
			{
				let dst_i = (tile_start_i as u32 + (fineblock_ybits | fineblock_xbits)) as usize;

				// TODO: rasterize whole fine blocks at a time rather than pixels at a time.
				let pixel_discarded = row_edges[0] >= 0 || row_edges[1] >= 0 || row_edges[2] >= 0;

				if !pixel_discarded
				{
					let rcp_triarea2_mantissa = (drawcmd.rcp_triarea2 & 0xFF) as i32;
					let rcp_triarea2_exponent = ((drawcmd.rcp_triarea2 & 0xFF00) >> 8) as i32;
					let rcp_triarea2_rshift = rcp_triarea2_exponent - 127;

					let shifted_e2 = apply_rcp_shift(row_edges[2].wrapping_neg(), rcp_triarea2_rshift);
					let shifted_e0 = apply_rcp_shift(row_edges[0].wrapping_neg(), rcp_triarea2_rshift);

					// Non-perspective-correct barycentrics of vertices 1 and 2,
					// each in [0, 0x8000).
					let u = ((shifted_e2 as i64 * rcp_triarea2_mantissa as i64) >> 1) as i32;
					let v = ((shifted_e0 as i64 * rcp_triarea2_mantissa as i64) >> 1) as i32;
					debug_assert!(u < 0x8000);
					debug_assert!(v < 0x8000);

					// Third barycentric, reconstructed from the other two.
					let w = 0x7FFF - u - v;

					let mut pixel_z = ((drawcmd.vert_zs[0] as i64) << 15)
						+ u as i64 * (drawcmd.vert_zs[1] - drawcmd.vert_zs[0]) as i64
						+ v as i64 * (drawcmd.vert_zs[2] - drawcmd.vert_zs[0]) as i64;

					pixel_z = pixel_z.max((drawcmd.min_z as i64) << 15);
					pixel_z = pixel_z.min((drawcmd.max_z as i64) << 15);
					let pixel_z = pixel_z as u32;

					if pixel_z < self.depthbuffer[dst_i]
					{
						self.depthbuffer[dst_i] = pixel_z;
						self.backbuffer[dst_i] =
							0xFF000000 | (((w / 0x80) as u32) << 16) | (((u / 0x80) as u32) << 8) | ((v / 0x80) as u32);
					}
				}

				for v in 0 .. 3
				{
					row_edges[v] = row_edges[v].wrapping_add(drawcmd.edge_dxs[v]);
				}

				fineblock_xbits = fineblock_xbits.wrapping_sub(TILE_X_SWIZZLE_MASK) & TILE_X_SWIZZLE_MASK;
			}

			for v in 0 .. 3
			{
				edges[v] = edges[v].wrapping_add(drawcmd.edge_dys[v]);
			}

			fineblock_ybits = fineblock_ybits.wrapping_sub(TILE_Y_SWIZZLE_MASK) & TILE_Y_SWIZZLE_MASK;
		}

		self.tile_perfcounters[tile_id as usize].smalltri_coarse_raster += self.perf_clock.now() - coarse_start_pc;
	}

	// Rasterize a large triangle's tile command: walk the coarse blocks of the
	// whole tile, trivially rejecting or accepting per block, and only testing
	// the edges the binning stage left necessary.
	pub(super) fn draw_tile_largetri(&mut self, tile_id: i32, drawcmd: &DrawTileCmd)
	{
		let mut tile_start_pc = self.perf_clock.now();

		let num_test_edges = drawcmd.num_test_edges as usize;

		let mut coarse_edge_dxs = [0i32; 3];
		let mut coarse_edge_dys = [0i32; 3];
		for v in 0 .. num_test_edges
		{
			coarse_edge_dxs[v] = drawcmd.edge_dxs[v].wrapping_mul(COARSE_BLOCK_WIDTH_IN_PIXELS);
			coarse_edge_dys[v] = drawcmd.edge_dys[v].wrapping_mul(COARSE_BLOCK_WIDTH_IN_PIXELS);
		}

		let mut edges = [0i32; 3];
		let mut edge_trivrejs = [0i32; 3];
		let mut edge_trivaccs = [0i32; 3];
		for v in 0 .. num_test_edges
		{
			edges[v] = drawcmd.edges[v];
			edge_trivrejs[v] = drawcmd.edges[v];
			edge_trivaccs[v] = drawcmd.edges[v];
			if coarse_edge_dxs[v] < 0
			{
				edge_trivrejs[v] = edge_trivrejs[v].wrapping_add(coarse_edge_dxs[v]);
			}
			if coarse_edge_dxs[v] > 0
			{
				edge_trivaccs[v] = edge_trivaccs[v].wrapping_add(coarse_edge_dxs[v]);
			}
			if coarse_edge_dys[v] < 0
			{
				edge_trivrejs[v] = edge_trivrejs[v].wrapping_add(coarse_edge_dys[v]);
			}
			if coarse_edge_dys[v] > 0
			{
				edge_trivaccs[v] = edge_trivaccs[v].wrapping_add(coarse_edge_dys[v]);
			}
		}

		let tile_y = tile_id / self.width_in_tiles;
		let tile_x = tile_id - tile_y * self.width_in_tiles;

		for cb_y in 0 .. TILE_WIDTH_IN_COARSE_BLOCKS
		{
			let mut row_edges = edges;
			let mut edge_row_trivrejs = edge_trivrejs;
			let mut edge_row_trivaccs = edge_trivaccs;

			for cb_x in 0 .. TILE_WIDTH_IN_COARSE_BLOCKS
			{
				// Trivially rejected if at least one edge doesn't cover the block at all.
				let mut trivially_rejected = false;
				for v in 0 .. num_test_edges
				{
					if edge_row_trivrejs[v] >= 0
					{
						trivially_rejected = true;
						break;
					}
				}

				if !trivially_rejected
				{
					let mut edge_needs_test = [false; 3];
					let mut num_tests_necessary = 0;
					for v in 0 .. num_test_edges
					{
						edge_needs_test[v] = edge_row_trivaccs[v] >= 0;
						if edge_needs_test[v]
						{
							num_tests_necessary += 1;
						}
					}

					// Rotate so the edges to test come first.
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

					let mut coarse_cmd = *drawcmd;
					coarse_cmd.num_test_edges = num_tests_necessary as u32;
					for v in 0 .. 3
					{
						let rotated_v = (v + vertex_rotation) % 3;
						coarse_cmd.edges[v] = row_edges[rotated_v];
						coarse_cmd.edge_dxs[v] = drawcmd.edge_dxs[rotated_v];
						coarse_cmd.edge_dys[v] = drawcmd.edge_dys[rotated_v];
						coarse_cmd.vert_zs[v] = drawcmd.vert_zs[rotated_v];
					}

					let coarse_topleft_x = tile_x * TILE_WIDTH_IN_PIXELS + cb_x * COARSE_BLOCK_WIDTH_IN_PIXELS;
					let coarse_topleft_y = tile_y * TILE_WIDTH_IN_PIXELS + cb_y * COARSE_BLOCK_WIDTH_IN_PIXELS;

					self.tile_perfcounters[tile_id as usize].largetri_tile_raster +=
						self.perf_clock.now() - tile_start_pc;
					self.draw_coarse_block_largetri(tile_id, coarse_topleft_x, coarse_topleft_y, &coarse_cmd);
					tile_start_pc = self.perf_clock.now();
				}

				for v in 0 .. num_test_edges
				{
					row_edges[v] = row_edges[v].wrapping_add(coarse_edge_dxs[v]);
					edge_row_trivrejs[v] = edge_row_trivrejs[v].wrapping_add(coarse_edge_dxs[v]);
					edge_row_trivaccs[v] = edge_row_trivaccs[v].wrapping_add(coarse_edge_dxs[v]);
				}
			}

			for v in 0 .. num_test_edges
			{
				edges[v] = edges[v].wrapping_add(coarse_edge_dys[v]);
				edge_trivrejs[v] = edge_trivrejs[v].wrapping_add(coarse_edge_dys[v]);
				edge_trivaccs[v] = edge_trivaccs[v].wrapping_add(coarse_edge_dys[v]);
			}
		}

		self.tile_perfcounters[tile_id as usize].largetri_tile_raster += self.perf_clock.now() - tile_start_pc;
	}

	fn draw_coarse_block_largetri(
		&mut self,
		tile_id: i32,
		coarse_topleft_x: i32,
		coarse_topleft_y: i32,
		drawcmd: &DrawTileCmd,
	)
	{
		let coarse_start_pc = self.perf_clock.now();

		let num_test_edges = drawcmd.num_test_edges as usize;

		let mut edges = [0i32; 3];
		for v in 0 .. num_test_edges
		{
			edges[v] = drawcmd.edges[v];
		}

		let tile_start_i = PIXELS_PER_TILE * tile_id;

		let mut fineblock_ybits = pdep_u32(coarse_topleft_y as u32, TILE_Y_SWIZZLE_MASK);
		for _fineblock_y in 0 .. COARSE_BLOCK_WIDTH_IN_PIXELS
		{
			let mut row_edges = edges;

			let mut fineblock_xbits = pdep_u32(coarse_topleft_x as u32, TILE_X_SWIZZLE_MASK);
			for _fineblock_x in 0 .. COARSE_BLOCK_WIDTH_IN_PIXELS
			{
				let dst_i = (tile_start_i as u32 + (fineblock_ybits | fineblock_xbits)) as usize;

				// TODO: rasterize whole fine blocks at a time rather than pixels at a time.
				let mut pixel_discarded = false;
				for v in 0 .. num_test_edges
				{
					if row_edges[v] >= 0
					{
						pixel_discarded = true;
						break;
					}
				}

				if !pixel_discarded
				{
					let rcp_triarea2_mantissa = (drawcmd.rcp_triarea2 & 0xFFFF) as i32;
					let rcp_triarea2_exponent = ((drawcmd.rcp_triarea2 & 0xFF0000) >> 16) as i32;
					let rcp_triarea2_rshift = rcp_triarea2_exponent - 127;

					let shifted_e2 = apply_rcp_shift(row_edges[2].wrapping_neg(), rcp_triarea2_rshift);
					let shifted_e0 = apply_rcp_shift(row_edges[0].wrapping_neg(), rcp_triarea2_rshift);

					// Non-perspective-correct barycentrics of vertices 1 and 2.
					// Contributions of edges that cover the whole tile are taken as zero.
					let mut u = ((shifted_e2 as i64 * rcp_triarea2_mantissa as i64) >> 16 >> 1) as i32;
					if num_test_edges < 3
					{
						u = 0;
					}
					let mut v = ((shifted_e0 as i64 * rcp_triarea2_mantissa as i64) >> 16 >> 1) as i32;
					if num_test_edges < 1
					{
						v = 0;
					}
					debug_assert!(u < 0x8000);
					debug_assert!(v < 0x8000);

					let w = 0x7FFF - u - v;

					let mut pixel_z = ((drawcmd.vert_zs[0] as i64) << 15)
						+ u as i64 * (drawcmd.vert_zs[1] - drawcmd.vert_zs[0]) as i64
						+ v as i64 * (drawcmd.vert_zs[2] - drawcmd.vert_zs[0]) as i64;

					pixel_z = pixel_z.max((drawcmd.min_z as i64) << 15);
					pixel_z = pixel_z.min((drawcmd.max_z as i64) << 15);
					let pixel_z = pixel_z as u32;

					if pixel_z < self.depthbuffer[dst_i]
					{
						self.depthbuffer[dst_i] = pixel_z;
						self.backbuffer[dst_i] =
							0xFF000000 | (((w / 0x80) as u32) << 16) | (((u / 0x80) as u32) << 8) | ((v / 0x80) as u32);
					}
				}

				for v in 0 .. num_test_edges
				{
					row_edges[v] = row_edges[v].wrapping_add(drawcmd.edge_dxs[v]);
				}

				fineblock_xbits = fineblock_xbits.wrapping_sub(TILE_X_SWIZZLE_MASK) & TILE_X_SWIZZLE_MASK;
			}

			for v in 0 .. num_test_edges
			{
				edges[v] = edges[v].wrapping_add(drawcmd.edge_dys[v]);
			}

			fineblock_ybits = fineblock_ybits.wrapping_sub(TILE_Y_SWIZZLE_MASK) & TILE_Y_SWIZZLE_MASK;
		}

		self.tile_perfcounters[tile_id as usize].largetri_coarse_raster += self.perf_clock.now() - coarse_start_pc;
	}

	// Fill the tile's color plane with a solid color and reset its depth to far.
	pub(super) fn clear_tile(&mut self, tile_id: i32, clearcmd: &ClearTileCmd)
	{
		let clear_start_pc = self.perf_clock.now();

		let tile_start_i = (PIXELS_PER_TILE * tile_id) as usize;
		let tile_end_i = tile_start_i + PIXELS_PER_TILE as usize;

		self.backbuffer[tile_start_i .. tile_end_i].fill(clearcmd.color);
		self.depthbuffer[tile_start_i .. tile_end_i].fill(0xFFFFFFFF);

		self.tile_perfcounters[tile_id as usize].clear += self.perf_clock.now() - clear_start_pc;
	}
}
