// End-to-end scenarios for the scene and renderer layer.

mod common;

use common::*;
use pixel_mill_lib::common::{fixed_math::*, matrix::*};
use pixel_mill_lib::renderer::{Renderer, Scene};

#[test]
fn test_render_scene_with_identity_matrices()
{
	// Clip space passes through untouched with identity view and projection,
	// so this renders the same half-screen triangle as the raw framebuffer test.
	let mut scene = Scene::new();
	let model_id = scene.add_model(
		&[
			-1.0, 1.0, 0.0, // top left
			1.0, 1.0, 0.0, // top right
			-1.0, -1.0, 0.0, // bottom left
		],
		&[0, 1, 2],
	);
	scene.add_instance(model_id);

	let mut renderer = Renderer::new(384, 384);
	renderer.render_scene(&scene);

	let cover = coverage(renderer.framebuffer());
	for y in 0 .. 384
	{
		for x in 0 .. 384
		{
			let expected = x + y <= 382;
			assert_eq!(cover[(y * 384 + x) as usize], expected, "({}, {})", x, y);
		}
	}

	// The transform phase was measured.
	assert!(renderer.perfcounters().mvptransform > 0);
}

#[test]
fn test_removed_instances_stop_rendering()
{
	// Two single-triangle models on opposite sides of the screen.
	let mut scene = Scene::new();
	let left_model = scene.add_model(
		&[-0.9, 0.5, 0.0, -0.5, 0.5, 0.0, -0.9, -0.5, 0.0],
		&[0, 1, 2],
	);
	let right_model = scene.add_model(
		&[0.5, 0.5, 0.0, 0.9, 0.5, 0.0, 0.5, -0.5, 0.0],
		&[0, 1, 2],
	);

	let left_instance = scene.add_instance(left_model);
	let right_instance = scene.add_instance(right_model);

	let size = 256;
	let mut renderer = Renderer::new(size, size);
	renderer.render_scene(&scene);

	let covers_left_half = |cover: &Vec<bool>| {
		(0 .. size * size).any(|i| cover[i as usize] && (i % size) < size / 2)
	};
	let covers_right_half = |cover: &Vec<bool>| {
		(0 .. size * size).any(|i| cover[i as usize] && (i % size) >= size / 2)
	};

	let cover = coverage(renderer.framebuffer());
	assert!(covers_left_half(&cover));
	assert!(covers_right_half(&cover));

	// Remove the right instance; each frame starts from a clear, so its
	// triangle must be gone after the next render.
	scene.remove_instance(right_instance);
	assert!(!scene.has_instance(right_instance));
	assert!(scene.has_instance(left_instance));

	renderer.render_scene(&scene);
	let cover = coverage(renderer.framebuffer());
	assert!(covers_left_half(&cover));
	assert!(!covers_right_half(&cover));
}

#[test]
fn test_projection_matrix_scales_coverage()
{
	// A projection that halves x shrinks the rendered triangle horizontally.
	let mut scene = Scene::new();
	let model_id = scene.add_model(
		&[-1.0, 1.0, 0.0, 1.0, 1.0, 0.0, -1.0, -1.0, 0.0],
		&[0, 1, 2],
	);
	scene.add_instance(model_id);

	let mut half_x = fixed16_mat4_identity();
	half_x[0] = FIXED16_HALF;
	scene.set_projection(&half_x);

	let size = 256;
	let mut renderer = Renderer::new(size, size);
	renderer.render_scene(&scene);

	let cover = coverage(renderer.framebuffer());

	// Nothing reaches the left quarter of the screen...
	for y in 0 .. size
	{
		for x in 0 .. size / 4 - 1
		{
			assert!(!cover[(y * size + x) as usize], "({}, {})", x, y);
		}
	}
	// ...but the middle is covered.
	assert!(cover[(128 * size + 128 - 16) as usize]);
}

#[test]
fn test_instance_world_positions_share_one_mvp()
{
	// Several instances of the same model render identically (the per-instance
	// world transform is identity), so instance count doesn't change coverage.
	let mut scene = Scene::new();
	let model_id = scene.add_model(
		&[-0.5, 0.5, 0.0, 0.5, 0.5, 0.0, -0.5, -0.5, 0.0],
		&[0, 1, 2],
	);
	scene.add_instance(model_id);

	let size = 256;
	let mut renderer_one = Renderer::new(size, size);
	renderer_one.render_scene(&scene);
	let coverage_one = coverage(renderer_one.framebuffer());

	scene.add_instance(model_id);
	scene.add_instance(model_id);
	let mut renderer_many = Renderer::new(size, size);
	renderer_many.render_scene(&scene);
	let coverage_many = coverage(renderer_many.framebuffer());

	assert_eq!(coverage_one, coverage_many);
}
