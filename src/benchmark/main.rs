mod config;

use config::BenchmarkConfig;
use pixel_mill_lib::common::{fixed_math::*, math_types::*, matrix::*};
use pixel_mill_lib::rasterizer::{
	Framebuffer, FRAMEBUFFER_PERFCOUNTER_NAMES, PERFCOUNTER_FREQUENCY, RENDERER_PERFCOUNTER_NAMES,
	TILE_PERFCOUNTER_NAMES,
};
use pixel_mill_lib::renderer::{ModelShape, Renderer, Scene};
use rand::{Rng, SeedableRng};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "benchmark", about = "Software rasterizer benchmark.")]
struct Opt
{
	/// Path to a JSON config file with a "benchmark" section.
	#[structopt(long)]
	config: Option<std::path::PathBuf>,

	/// Number of frames to render (overrides the config).
	#[structopt(long)]
	frames: Option<u32>,

	/// Scene kind, "cube" or "soup" (overrides the config).
	#[structopt(long)]
	scene: Option<String>,
}

// A unit cube around the origin, counter-clockwise winding.
fn cube_shape() -> ModelShape
{
	let positions = vec![
		-0.5, -0.5, -0.5, // 0
		0.5, -0.5, -0.5, // 1
		0.5, 0.5, -0.5, // 2
		-0.5, 0.5, -0.5, // 3
		-0.5, -0.5, 0.5, // 4
		0.5, -0.5, 0.5, // 5
		0.5, 0.5, 0.5, // 6
		-0.5, 0.5, 0.5, // 7
	];

	#[rustfmt::skip]
	let indices = vec![
		0, 2, 1, 0, 3, 2, // front
		4, 5, 6, 4, 6, 7, // back
		0, 4, 7, 0, 7, 3, // left
		1, 2, 6, 1, 6, 5, // right
		3, 7, 6, 3, 6, 2, // top
		0, 1, 5, 0, 5, 4, // bottom
	];

	ModelShape { positions, indices }
}

// Random small triangles in clip space, fed straight to the framebuffer.
fn build_triangle_soup(num_triangles: u32, seed: u64) -> Vec<Fixed16>
{
	let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
	let mut vertices = Vec::with_capacity((num_triangles * 12) as usize);

	for _ in 0 .. num_triangles
	{
		let center_x: f32 = rng.gen_range(-0.9 .. 0.9);
		let center_y: f32 = rng.gen_range(-0.9 .. 0.9);
		let z: f32 = rng.gen_range(0.1 .. 0.9);
		for _ in 0 .. 3
		{
			let x = center_x + rng.gen_range(-0.05 .. 0.05);
			let y = center_y + rng.gen_range(-0.05 .. 0.05);
			vertices.push(f32_to_fixed16(x));
			vertices.push(f32_to_fixed16(y));
			vertices.push(f32_to_fixed16(z));
			vertices.push(int_to_fixed16(1));
		}
	}

	vertices
}

fn setup_camera(scene: &mut Scene, width: i32, height: i32)
{
	let projection = build_projection_matrix(
		70.0f32.to_radians(),
		width as f32 / height as f32,
		0.01,
		10.0,
	);
	scene.set_projection(&mat4f_to_fixed16(&projection));

	let view = build_look_to_matrix(
		Vec3f::new(0.0, 0.0, 3.0),
		Vec3f::new(0.0, 0.0, -1.0),
		Vec3f::new(0.0, 1.0, 0.0),
	);
	scene.set_view(&mat4f_to_fixed16(&view));
}

fn ticks_to_ms(ticks: u64) -> f64
{
	ticks as f64 * 1000.0 / PERFCOUNTER_FREQUENCY as f64
}

fn print_report(renderer: &Renderer, num_frames: u32)
{
	let fb = renderer.framebuffer();

	println!("=== framebuffer counters ===");
	let fb_counters = fb.perfcounters().values();
	for (name, value) in FRAMEBUFFER_PERFCOUNTER_NAMES.iter().zip(fb_counters.iter())
	{
		println!(
			"{:24} {:>14} ticks  {:>10.3} ms  {:>8.4} ms/frame",
			name,
			value,
			ticks_to_ms(*value),
			ticks_to_ms(*value) / num_frames as f64
		);
	}

	println!("=== tile counters (all tiles) ===");
	let mut tile_totals = pixel_mill_lib::rasterizer::TilePerfCounters::default();
	for tile_id in 0 .. fb.total_num_tiles()
	{
		let tile_counters = fb.tile_perfcounters(tile_id);
		tile_totals.accumulate(&tile_counters);
	}
	for (name, value) in TILE_PERFCOUNTER_NAMES.iter().zip(tile_totals.values().iter())
	{
		println!(
			"{:24} {:>14} ticks  {:>10.3} ms  {:>8.4} ms/frame",
			name,
			value,
			ticks_to_ms(*value),
			ticks_to_ms(*value) / num_frames as f64
		);
	}

	println!("=== renderer counters ===");
	let renderer_counters = renderer.perfcounters().values();
	for (name, value) in RENDERER_PERFCOUNTER_NAMES.iter().zip(renderer_counters.iter())
	{
		println!(
			"{:24} {:>14} ticks  {:>10.3} ms  {:>8.4} ms/frame",
			name,
			value,
			ticks_to_ms(*value),
			ticks_to_ms(*value) / num_frames as f64
		);
	}
}

fn run_cube_scene(renderer: &mut Renderer, benchmark_config: &BenchmarkConfig)
{
	let mut scene = Scene::new();

	let (first_model_id, num_added_models) = scene.add_models(&[cube_shape()]);
	for model_id in first_model_id .. first_model_id + num_added_models
	{
		for _ in 0 .. benchmark_config.num_instances
		{
			scene.add_instance(model_id);
		}
	}

	setup_camera(&mut scene, benchmark_config.width, benchmark_config.height);

	for _ in 0 .. benchmark_config.num_frames
	{
		renderer.render_scene(&scene);
	}
}

fn run_triangle_soup(fb: &mut Framebuffer, benchmark_config: &BenchmarkConfig)
{
	let vertices = build_triangle_soup(benchmark_config.num_soup_triangles, benchmark_config.seed);

	for _ in 0 .. benchmark_config.num_frames
	{
		fb.clear(0);
		fb.draw(&vertices);
		fb.resolve();
	}
}

pub fn main()
{
	let opt = Opt::from_args();

	let app_config = opt
		.config
		.as_ref()
		.and_then(|path| config::load(path))
		.unwrap_or(serde_json::Value::Null);
	let mut benchmark_config = BenchmarkConfig::from_app_config(&app_config);

	if let Some(frames) = opt.frames
	{
		benchmark_config.num_frames = frames;
	}
	if let Some(scene) = opt.scene
	{
		benchmark_config.scene = scene;
	}

	println!(
		"{}x{}, {} frames, scene \"{}\"",
		benchmark_config.width, benchmark_config.height, benchmark_config.num_frames, benchmark_config.scene
	);

	let mut renderer = Renderer::new(benchmark_config.width, benchmark_config.height);

	let start_time = std::time::Instant::now();
	match benchmark_config.scene.as_str()
	{
		"cube" => run_cube_scene(&mut renderer, &benchmark_config),
		"soup" => run_triangle_soup(renderer.framebuffer_mut(), &benchmark_config),
		other => panic!("Unknown scene \"{}\"", other),
	}
	let elapsed_s = start_time.elapsed().as_secs_f64();

	println!(
		"rendered {} frames in {:.3} s ({:.2} frames/s)",
		benchmark_config.num_frames,
		elapsed_s,
		benchmark_config.num_frames as f64 / elapsed_s
	);

	print_report(&renderer, benchmark_config.num_frames);
}
