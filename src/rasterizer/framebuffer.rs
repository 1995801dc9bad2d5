// Tile-binned framebuffer.
//
// Pixel storage is tile-major: tiles are laid out row major over the padded
// image, and pixels within a tile are morton-swizzled. Draw calls run triangle
// setup and enqueue commands into per-tile ring buffers; "resolve" drains the
// buffers and performs the actual rasterization.
//
// This is a Pineda-style rasterizer in the spirit of Larrabee's.
// See "A Parallel Algorithm for Polygon Rasterization", Juan Pineda, SIGGRAPH '88,
// and Michael Abrash's "Rasterization on Larrabee".

use super::{perf_counters::*, tile_commands::*};
use crate::common::{bit_ops::*, fixed_math::*};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Attachment
{
	Color0,
	Depth,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PixelFormat
{
	R8G8B8A8Unorm,
	B8G8R8A8Unorm,
	R32Unorm,
}

// A clip-space vertex and, after the window transform, a window-space vertex.
#[derive(Copy, Clone)]
pub(super) struct Xyzw
{
	pub x: Fixed16,
	pub y: Fixed16,
	pub z: Fixed16,
	pub w: Fixed16,
}

pub struct Framebuffer
{
	// Color is packed BGRA (alpha in bits 24..31, red 16..23, green 8..15, blue 0..7).
	// Depth is unsigned, 0xFFFFFFFF is the far value.
	pub(super) backbuffer: Vec<u32>,
	pub(super) depthbuffer: Vec<u32>,

	pub(super) tile_cmdbufs: Vec<TileCommandBuffer>,

	pub(super) width_in_pixels: i32,
	pub(super) height_in_pixels: i32,

	pub(super) width_in_tiles: i32,
	pub(super) height_in_tiles: i32,
	pub(super) total_num_tiles: i32,

	// num_tiles_per_row * num_pixels_per_tile
	pub(super) pixels_per_row_of_tiles: i32,

	pub(super) perf_clock: PerfClock,
	pub(super) perfcounters: FramebufferPerfCounters,
	pub(super) tile_perfcounters: Vec<TilePerfCounters>,
}

impl Framebuffer
{
	pub fn new(width: i32, height: i32) -> Self
	{
		// Limits of the rasterizer's precision, based on the range of the
		// 2D cross product of two Q16.8 numbers.
		assert!(width > 0 && width < 16384);
		assert!(height > 0 && height < 16384);

		// Pad up to the next tile boundary, so that the rasterization code
		// doesn't have to handle out of bounds access after tile binning.
		let padded_width_in_pixels = (width + (TILE_WIDTH_IN_PIXELS - 1)) & -TILE_WIDTH_IN_PIXELS;
		let padded_height_in_pixels = (height + (TILE_WIDTH_IN_PIXELS - 1)) & -TILE_WIDTH_IN_PIXELS;

		let width_in_tiles = padded_width_in_pixels / TILE_WIDTH_IN_PIXELS;
		let height_in_tiles = padded_height_in_pixels / TILE_WIDTH_IN_PIXELS;
		let total_num_tiles = width_in_tiles * height_in_tiles;

		let pixels_per_row_of_tiles = padded_width_in_pixels * TILE_WIDTH_IN_PIXELS;
		let pixels_per_slice = (height_in_tiles * pixels_per_row_of_tiles) as usize;

		Framebuffer {
			backbuffer: vec![0; pixels_per_slice],
			depthbuffer: vec![0xFFFFFFFF; pixels_per_slice],
			tile_cmdbufs: (0 .. total_num_tiles).map(|_| TileCommandBuffer::new()).collect(),
			width_in_pixels: width,
			height_in_pixels: height,
			width_in_tiles,
			height_in_tiles,
			total_num_tiles,
			pixels_per_row_of_tiles,
			perf_clock: PerfClock::new(),
			perfcounters: FramebufferPerfCounters::default(),
			tile_perfcounters: vec![TilePerfCounters::default(); total_num_tiles as usize],
		}
	}

	pub fn width(&self) -> i32
	{
		self.width_in_pixels
	}

	pub fn height(&self) -> i32
	{
		self.height_in_pixels
	}

	pub fn total_num_tiles(&self) -> i32
	{
		self.total_num_tiles
	}

	pub fn perfcounters(&self) -> FramebufferPerfCounters
	{
		self.perfcounters
	}

	pub fn tile_perfcounters(&self, tile_id: i32) -> TilePerfCounters
	{
		self.tile_perfcounters[tile_id as usize]
	}

	pub fn reset_perfcounters(&mut self)
	{
		self.perfcounters = FramebufferPerfCounters::default();
		for counters in &mut self.tile_perfcounters
		{
			*counters = TilePerfCounters::default();
		}
	}

	pub fn get_perfcounter_frequency(&self) -> u64
	{
		PERFCOUNTER_FREQUENCY
	}

	// Pending command tags of one tile, in consumption order.
	// Reset markers are bookkeeping and not reported.
	pub fn tile_command_tags(&self, tile_id: i32) -> Vec<u32>
	{
		let cmdbuf = &self.tile_cmdbufs[tile_id as usize];
		let mut tags = Vec::new();
		let mut cmd = cmdbuf.read;
		loop
		{
			if cmd == cmdbuf.write
			{
				break;
			}
			let tag = cmdbuf.dwords[cmd];
			if tag == TILECMD_ID_RESETBUF
			{
				cmd = 0;
			}
			else
			{
				let (_, num_dwords) = decode_tile_command(&cmdbuf.dwords[cmd ..]);
				tags.push(tag);
				cmd += num_dwords;
			}
			if cmd == TILE_COMMAND_BUFFER_SIZE_IN_DWORDS
			{
				cmd = 0;
				if cmdbuf.write == TILE_COMMAND_BUFFER_SIZE_IN_DWORDS
				{
					break;
				}
			}
		}
		tags
	}

	pub fn clear(&mut self, color: u32)
	{
		let dwords = ClearTileCmd { color }.encode();
		for tile_id in 0 .. self.total_num_tiles
		{
			self.push_tile_command(tile_id, &dwords);
		}
	}

	pub fn resolve(&mut self)
	{
		let mut tile_id = 0;
		for _tile_y in 0 .. self.height_in_tiles
		{
			for _tile_x in 0 .. self.width_in_tiles
			{
				self.resolve_tile(tile_id);
				tile_id += 1;
			}
		}
	}

	// Drain one tile's command queue, executing every pending command.
	pub(super) fn resolve_tile(&mut self, tile_id: i32)
	{
		let mut resolve_start_pc = self.perf_clock.now();

		let t = tile_id as usize;
		let mut cmd = self.tile_cmdbufs[t].read;
		loop
		{
			if cmd == self.tile_cmdbufs[t].write
			{
				break;
			}

			let tag = self.tile_cmdbufs[t].dwords[cmd];
			if tag == TILECMD_ID_RESETBUF
			{
				// Wrap marker, the rest of the buffer is slop.
				cmd = 0;
			}
			else
			{
				let (command, num_dwords) = decode_tile_command(&self.tile_cmdbufs[t].dwords[cmd ..]);
				self.tile_perfcounters[t].cmdbuf_resolve += self.perf_clock.now() - resolve_start_pc;
				match command
				{
					TileCommand::DrawSmallTri(drawcmd) => self.draw_tile_smalltri(tile_id, &drawcmd),
					TileCommand::DrawTile(drawcmd) => self.draw_tile_largetri(tile_id, &drawcmd),
					TileCommand::ClearTile(clearcmd) => self.clear_tile(tile_id, &clearcmd),
					TileCommand::ResetBuf => unreachable!(),
				}
				resolve_start_pc = self.perf_clock.now();
				cmd += num_dwords;
			}

			if cmd == TILE_COMMAND_BUFFER_SIZE_IN_DWORDS
			{
				cmd = 0;
				if self.tile_cmdbufs[t].write == TILE_COMMAND_BUFFER_SIZE_IN_DWORDS
				{
					break;
				}
			}
		}

		// The read cursor never rests at the past-the-end position.
		debug_assert!(cmd != TILE_COMMAND_BUFFER_SIZE_IN_DWORDS);
		self.tile_cmdbufs[t].read = cmd;

		self.tile_perfcounters[t].cmdbuf_resolve += self.perf_clock.now() - resolve_start_pc;
	}

	// Append a command to a tile's queue. The write cursor is never allowed to
	// catch up to the read cursor from behind; when room runs out the tile is
	// resolved in-line instead.
	pub(super) fn push_tile_command(&mut self, tile_id: i32, cmd_dwords: &[u32])
	{
		assert!(tile_id >= 0 && tile_id < self.total_num_tiles);

		let mut pushcmd_start_pc = self.perf_clock.now();

		let num_dwords = cmd_dwords.len();
		let t = tile_id as usize;
		const END: usize = TILE_COMMAND_BUFFER_SIZE_IN_DWORDS;

		debug_assert!(self.tile_cmdbufs[t].read != END);

		{
			let (read, write) = (self.tile_cmdbufs[t].read, self.tile_cmdbufs[t].write);
			if read > write && read - write < num_dwords + 1
			{
				// The read cursor is ahead of the write cursor without enough room
				// in between, flush so it catches up.
				self.tile_perfcounters[t].cmdbuf_pushcmd += self.perf_clock.now() - pushcmd_start_pc;
				self.resolve_tile(tile_id);
				pushcmd_start_pc = self.perf_clock.now();

				debug_assert!(self.tile_cmdbufs[t].read == self.tile_cmdbufs[t].write);
			}
		}

		// The read cursor can't be in the way now, but the space up to the end
		// of the buffer may still be too small.
		if END - self.tile_cmdbufs[t].write < num_dwords
		{
			debug_assert!(self.tile_cmdbufs[t].write != END);

			// Abandon the slop at the end of the buffer.
			let write = self.tile_cmdbufs[t].write;
			self.tile_cmdbufs[t].dwords[write] = TILECMD_ID_RESETBUF;

			if self.tile_cmdbufs[t].read == 0
			{
				// The write cursor is about to loop back onto the read cursor,
				// make the read cursor catch up first.
				self.tile_perfcounters[t].cmdbuf_pushcmd += self.perf_clock.now() - pushcmd_start_pc;
				self.resolve_tile(tile_id);
				pushcmd_start_pc = self.perf_clock.now();

				self.tile_cmdbufs[t].read = 0;
			}

			self.tile_cmdbufs[t].write = 0;

			// After looping around, the read cursor may be in the way again.
			let (read, write) = (self.tile_cmdbufs[t].read, self.tile_cmdbufs[t].write);
			if read > write && read - write < num_dwords + 1
			{
				self.tile_perfcounters[t].cmdbuf_pushcmd += self.perf_clock.now() - pushcmd_start_pc;
				self.resolve_tile(tile_id);
				pushcmd_start_pc = self.perf_clock.now();

				debug_assert!(self.tile_cmdbufs[t].read == self.tile_cmdbufs[t].write);
			}
		}

		debug_assert!(END - self.tile_cmdbufs[t].write >= num_dwords);

		let write = self.tile_cmdbufs[t].write;
		self.tile_cmdbufs[t].dwords[write .. write + num_dwords].copy_from_slice(cmd_dwords);
		self.tile_cmdbufs[t].write += num_dwords;

		debug_assert!(self.tile_cmdbufs[t].write != self.tile_cmdbufs[t].read);

		if self.tile_cmdbufs[t].write == END
		{
			if self.tile_cmdbufs[t].read == 0
			{
				// The write cursor must loop to the start but the read cursor sits
				// there; consume the whole buffer in one go first.
				self.tile_perfcounters[t].cmdbuf_pushcmd += self.perf_clock.now() - pushcmd_start_pc;
				self.resolve_tile(tile_id);
				pushcmd_start_pc = self.perf_clock.now();
			}

			self.tile_cmdbufs[t].write = 0;
		}

		self.tile_perfcounters[t].cmdbuf_pushcmd += self.perf_clock.now() - pushcmd_start_pc;
	}

	// Copy a rectangle out of the swizzled storage into a row-major buffer.
	pub fn pack_row_major(
		&self,
		attachment: Attachment,
		x: i32,
		y: i32,
		width: i32,
		height: i32,
		format: PixelFormat,
		data: &mut [u8],
	)
	{
		assert!(x >= 0 && x < self.width_in_pixels);
		assert!(y >= 0 && y < self.height_in_pixels);
		assert!(width >= 0 && width <= self.width_in_pixels);
		assert!(height >= 0 && height <= self.height_in_pixels);
		assert!(x + width <= self.width_in_pixels);
		assert!(y + height <= self.height_in_pixels);
		assert!(data.len() >= (width as usize) * (height as usize) * 4);

		match (attachment, format)
		{
			(Attachment::Color0, PixelFormat::R8G8B8A8Unorm) | (Attachment::Color0, PixelFormat::B8G8R8A8Unorm) => {},
			(Attachment::Depth, PixelFormat::R32Unorm) => {},
			_ => panic!("Unsupported attachment/pixel format combination"),
		}

		let topleft_tile_y = y / TILE_WIDTH_IN_PIXELS;
		let topleft_tile_x = x / TILE_WIDTH_IN_PIXELS;
		let bottomright_tile_y = (y + (height - 1)) / TILE_WIDTH_IN_PIXELS;
		let bottomright_tile_x = (x + (width - 1)) / TILE_WIDTH_IN_PIXELS;

		let mut curr_tile_row_start = topleft_tile_y * self.pixels_per_row_of_tiles + topleft_tile_x * PIXELS_PER_TILE;
		for tile_y in topleft_tile_y ..= bottomright_tile_y
		{
			let mut curr_tile_start = curr_tile_row_start;

			for tile_x in topleft_tile_x ..= bottomright_tile_x
			{
				let topleft_y = tile_y * TILE_WIDTH_IN_PIXELS;
				let topleft_x = tile_x * TILE_WIDTH_IN_PIXELS;
				let bottomright_y = topleft_y + TILE_WIDTH_IN_PIXELS;
				let bottomright_x = topleft_x + TILE_WIDTH_IN_PIXELS;
				let pixel_y_min = topleft_y.max(y);
				let pixel_x_min = topleft_x.max(x);
				let pixel_y_max = bottomright_y.min(y + height);
				let pixel_x_max = bottomright_x.min(x + width);

				let mut pixel_y_bits = pdep_u32(pixel_y_min as u32, TILE_Y_SWIZZLE_MASK);
				for pixel_y in pixel_y_min .. pixel_y_max
				{
					let mut pixel_x_bits = pdep_u32(pixel_x_min as u32, TILE_X_SWIZZLE_MASK);
					for pixel_x in pixel_x_min .. pixel_x_max
					{
						let rel_pixel_y = pixel_y - y;
						let rel_pixel_x = pixel_x - x;
						let dst_i = (rel_pixel_y * width + rel_pixel_x) as usize;

						let src_i = (curr_tile_start as u32 + (pixel_y_bits | pixel_x_bits)) as usize;
						match attachment
						{
							Attachment::Color0 =>
							{
								let src = self.backbuffer[src_i];
								let dst = &mut data[dst_i * 4 .. dst_i * 4 + 4];
								match format
								{
									PixelFormat::R8G8B8A8Unorm =>
									{
										dst[0] = ((src & 0x00FF0000) >> 16) as u8;
										dst[1] = ((src & 0x0000FF00) >> 8) as u8;
										dst[2] = (src & 0x000000FF) as u8;
										dst[3] = ((src & 0xFF000000) >> 24) as u8;
									},
									PixelFormat::B8G8R8A8Unorm =>
									{
										dst[0] = (src & 0x000000FF) as u8;
										dst[1] = ((src & 0x0000FF00) >> 8) as u8;
										dst[2] = ((src & 0x00FF0000) >> 16) as u8;
										dst[3] = ((src & 0xFF000000) >> 24) as u8;
									},
									PixelFormat::R32Unorm => unreachable!(),
								}
							},
							Attachment::Depth =>
							{
								let src = self.depthbuffer[src_i];
								data[dst_i * 4 .. dst_i * 4 + 4].copy_from_slice(&src.to_le_bytes());
							},
						}

						pixel_x_bits = pixel_x_bits.wrapping_sub(TILE_X_SWIZZLE_MASK) & TILE_X_SWIZZLE_MASK;
					}

					pixel_y_bits = pixel_y_bits.wrapping_sub(TILE_Y_SWIZZLE_MASK) & TILE_Y_SWIZZLE_MASK;
				}

				curr_tile_start += PIXELS_PER_TILE;
			}

			curr_tile_row_start += self.pixels_per_row_of_tiles;
		}
	}

	// Draw triangles from consecutive vertex triples.
	// Vertices are x, y, z, w clip-space coordinates, Q16.16 each.
	pub fn draw(&mut self, vertices: &[Fixed16])
	{
		assert!(vertices.len() % 12 == 0);

		for triangle in vertices.chunks_exact(12)
		{
			let verts = [
				Xyzw {
					x: triangle[0],
					y: triangle[1],
					z: triangle[2],
					w: triangle[3],
				},
				Xyzw {
					x: triangle[4],
					y: triangle[5],
					z: triangle[6],
					w: triangle[7],
				},
				Xyzw {
					x: triangle[8],
					y: triangle[9],
					z: triangle[10],
					w: triangle[11],
				},
			];
			self.rasterize_triangle(verts);
		}
	}

	// Draw triangles from index triples into the vertex array.
	pub fn draw_indexed(&mut self, vertices: &[Fixed16], indices: &[u32])
	{
		assert!(indices.len() % 3 == 0);

		for triangle in indices.chunks_exact(3)
		{
			let mut verts = [Xyzw { x: 0, y: 0, z: 0, w: 0 }; 3];
			for v in 0 .. 3
			{
				let component_index = (triangle[v] as usize) * 4;
				verts[v] = Xyzw {
					x: vertices[component_index],
					y: vertices[component_index + 1],
					z: vertices[component_index + 2],
					w: vertices[component_index + 3],
				};
			}
			self.rasterize_triangle(verts);
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	// Window-space x to clip-space x on a framebuffer of the given size, exact.
	fn window_to_clip_x(x: i32, size: i32) -> Fixed16
	{
		(((2 * x - size) as i64) * 65536 / (size as i64)) as Fixed16
	}

	// Window-space y to clip-space y (window y grows downwards).
	fn window_to_clip_y(y: i32, size: i32) -> Fixed16
	{
		(((size - 2 * y) as i64) * 65536 / (size as i64)) as Fixed16
	}

	// A triangle in window coordinates, z = 0, w = 1, as a flat vertex array.
	fn window_triangle(size: i32, verts: [[i32; 2]; 3]) -> Vec<Fixed16>
	{
		let mut result = Vec::new();
		for v in verts.iter()
		{
			result.push(window_to_clip_x(v[0], size));
			result.push(window_to_clip_y(v[1], size));
			result.push(0);
			result.push(int_to_fixed16(1));
		}
		result
	}

	#[test]
	fn test_swizzle_round_trip()
	{
		let mut fb = Framebuffer::new(256, 256);

		// Fill the color plane with sequential values in storage order.
		for (i, texel) in fb.backbuffer.iter_mut().enumerate()
		{
			*texel = i as u32;
		}

		let mut packed = vec![0u8; 256 * 256 * 4];
		fb.pack_row_major(Attachment::Color0, 0, 0, 256, 256, PixelFormat::B8G8R8A8Unorm, &mut packed);

		for y in 0 .. 256u32
		{
			for x in 0 .. 256u32
			{
				let tile_x = x / TILE_WIDTH_IN_PIXELS as u32;
				let tile_y = y / TILE_WIDTH_IN_PIXELS as u32;
				let tile_base = (tile_y * fb.width_in_tiles as u32 + tile_x) * PIXELS_PER_TILE as u32;
				let swz = pdep_u32(x, TILE_X_SWIZZLE_MASK) | pdep_u32(y, TILE_Y_SWIZZLE_MASK);
				let expected = tile_base + swz;

				let dst_i = ((y * 256 + x) * 4) as usize;
				let got = u32::from_le_bytes([packed[dst_i], packed[dst_i + 1], packed[dst_i + 2], packed[dst_i + 3]]);
				assert_eq!(got, expected, "mismatch at ({}, {})", x, y);
			}
		}
	}

	#[test]
	fn test_pack_region_unaligned()
	{
		let mut fb = Framebuffer::new(256, 256);
		for (i, texel) in fb.backbuffer.iter_mut().enumerate()
		{
			*texel = i as u32;
		}

		// A region straddling all four tiles, not aligned to any block size.
		let (x0, y0, w, h) = (100, 117, 60, 30);
		let mut packed = vec![0u8; (w * h * 4) as usize];
		fb.pack_row_major(Attachment::Color0, x0, y0, w, h, PixelFormat::B8G8R8A8Unorm, &mut packed);

		for y in 0 .. h as u32
		{
			for x in 0 .. w as u32
			{
				let abs_x = x + x0 as u32;
				let abs_y = y + y0 as u32;
				let tile_x = abs_x / TILE_WIDTH_IN_PIXELS as u32;
				let tile_y = abs_y / TILE_WIDTH_IN_PIXELS as u32;
				let tile_base = (tile_y * fb.width_in_tiles as u32 + tile_x) * PIXELS_PER_TILE as u32;
				let swz = pdep_u32(abs_x, TILE_X_SWIZZLE_MASK) | pdep_u32(abs_y, TILE_Y_SWIZZLE_MASK);
				let expected = tile_base + swz;

				let dst_i = ((y * w as u32 + x) * 4) as usize;
				let got = u32::from_le_bytes([packed[dst_i], packed[dst_i + 1], packed[dst_i + 2], packed[dst_i + 3]]);
				assert_eq!(got, expected, "mismatch at ({}, {})", x, y);
			}
		}
	}

	#[test]
	fn test_clear_idempotence()
	{
		let mut fb = Framebuffer::new(200, 150);
		fb.clear(0x11223344);
		fb.clear(0x11223344);
		fb.resolve();

		let mut color = vec![0u8; 200 * 150 * 4];
		fb.pack_row_major(Attachment::Color0, 0, 0, 200, 150, PixelFormat::B8G8R8A8Unorm, &mut color);
		for texel in color.chunks_exact(4)
		{
			assert_eq!(u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]), 0x11223344);
		}

		let mut depth = vec![0u8; 200 * 150 * 4];
		fb.pack_row_major(Attachment::Depth, 0, 0, 200, 150, PixelFormat::R32Unorm, &mut depth);
		for texel in depth.chunks_exact(4)
		{
			assert_eq!(u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]), 0xFFFFFFFF);
		}
	}

	#[test]
	fn test_command_tags_for_small_triangle()
	{
		let mut fb = Framebuffer::new(256, 256);

		// A small triangle centered on the corner shared by all four tiles.
		let verts = window_triangle(256, [[128, 124], [132, 132], [124, 132]]);
		fb.draw(&verts);

		for tile_id in 0 .. 4
		{
			assert_eq!(fb.tile_command_tags(tile_id), vec![TILECMD_ID_DRAWSMALLTRI]);
		}
	}

	#[test]
	fn test_ring_wrap_equivalence()
	{
		// Drawing through a wrapping command ring must produce the same image
		// as resolving after every draw call (a queue that never fills).
		let mut fb_batched = Framebuffer::new(128, 128);
		let mut fb_flushed = Framebuffer::new(128, 128);

		fb_batched.clear(0);
		fb_flushed.clear(0);
		fb_flushed.resolve();

		// Enough commands to wrap the 128-dword ring several times.
		let mut seed = 0x12345678u32;
		let mut next = || {
			seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
			(seed >> 16) as i32
		};
		for _ in 0 .. 200
		{
			let x = next() % 100;
			let y = next() % 100;
			let verts = window_triangle(128, [[x, y], [x + 20, y + 4], [x + 6, y + 24]]);
			fb_batched.draw(&verts);
			fb_flushed.draw(&verts);
			fb_flushed.resolve();
		}
		fb_batched.resolve();

		assert_eq!(fb_batched.backbuffer, fb_flushed.backbuffer);
		assert_eq!(fb_batched.depthbuffer, fb_flushed.depthbuffer);
	}
}
