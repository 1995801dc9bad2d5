// Shared helpers for the integration tests: exact window-to-clip conversion
// and an independent reference implementation of the fill convention.
#![allow(dead_code)]

use pixel_mill_lib::common::fixed_math::*;
use pixel_mill_lib::rasterizer::{Attachment, Framebuffer, PixelFormat};

// Window-space x to clip-space x on a framebuffer of the given width.
// Exact for power-of-two sizes.
pub fn window_to_clip_x(x: i32, width: i32) -> Fixed16
{
	(((2 * x - width) as i64) * 65536 / (width as i64)) as Fixed16
}

// Window-space y to clip-space y (window y grows downwards).
pub fn window_to_clip_y(y: i32, height: i32) -> Fixed16
{
	(((height - 2 * y) as i64) * 65536 / (height as i64)) as Fixed16
}

// A triangle given in whole-pixel window coordinates, at the given clip z
// (Q16.16) and w = 1, as a flat vertex array for Framebuffer::draw.
pub fn window_triangle_at_z(size: i32, verts: [[i32; 2]; 3], z: Fixed16) -> Vec<Fixed16>
{
	let mut result = Vec::new();
	for v in verts.iter()
	{
		result.push(window_to_clip_x(v[0], size));
		result.push(window_to_clip_y(v[1], size));
		result.push(z);
		result.push(int_to_fixed16(1));
	}
	result
}

pub fn window_triangle(size: i32, verts: [[i32; 2]; 3]) -> Vec<Fixed16>
{
	window_triangle_at_z(size, verts, 0)
}

// Per-pixel coverage, derived from the color plane: a pixel is covered when
// its alpha byte is set (the background clear leaves alpha zero).
pub fn coverage(fb: &Framebuffer) -> Vec<bool>
{
	let width = fb.width();
	let height = fb.height();
	let mut packed = vec![0u8; (width * height * 4) as usize];
	fb.pack_row_major(Attachment::Color0, 0, 0, width, height, PixelFormat::R8G8B8A8Unorm, &mut packed);
	packed.chunks_exact(4).map(|texel| texel[3] != 0).collect()
}

pub fn depth_plane(fb: &Framebuffer) -> Vec<u32>
{
	let width = fb.width();
	let height = fb.height();
	let mut packed = vec![0u8; (width * height * 4) as usize];
	fb.pack_row_major(Attachment::Depth, 0, 0, width, height, PixelFormat::R32Unorm, &mut packed);
	packed
		.chunks_exact(4)
		.map(|texel| u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]))
		.collect()
}

// Reference rasterization of one triangle given in whole-pixel window
// coordinates: evaluates the edge equations exactly at every pixel center,
// with the same clockwise correction and top-left tie-break as the pipeline.
pub fn reference_coverage(width: i32, height: i32, verts: [[i32; 2]; 3]) -> Vec<bool>
{
	let mut covered = vec![false; (width * height) as usize];

	// Q16.8 vertex coordinates.
	let mut v: Vec<[i64; 2]> = verts.iter().map(|p| [(p[0] as i64) << 8, (p[1] as i64) << 8]).collect();

	let area2 = (v[1][0] - v[0][0]) * (v[2][1] - v[0][1]) - (v[1][1] - v[0][1]) * (v[2][0] - v[0][0]);
	if area2 == 0
	{
		return covered;
	}
	if area2 < 0
	{
		v.swap(1, 2);
	}

	for y in 0 .. height
	{
		for x in 0 .. width
		{
			let sample_x = ((x as i64) << 8) + 0x80;
			let sample_y = ((y as i64) << 8) + 0x80;

			let mut inside = true;
			for i in 0 .. 3
			{
				let v0 = v[i];
				let v1 = v[(i + 1) % 3];
				let edge_dx = v1[1] - v0[1];
				let edge_dy = v0[0] - v1[0];

				let edge = (sample_x - v0[0]) * edge_dx + (sample_y - v0[1]) * edge_dy;

				let top_left = (v0[1] == v1[1] && v0[0] < v1[0]) || v0[1] > v1[1];
				let edge_inside = if top_left { edge <= 0 } else { edge < 0 };
				if !edge_inside
				{
					inside = false;
					break;
				}
			}

			if inside
			{
				covered[(y * width + x) as usize] = true;
			}
		}
	}

	covered
}
