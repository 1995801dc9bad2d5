use serde::{Deserialize, Serialize};

pub fn load(file_path: &std::path::Path) -> Option<serde_json::Value>
{
	if let Ok(file_contents) = std::fs::read_to_string(file_path)
	{
		return serde_json::from_str(&file_contents).ok();
	}

	None
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BenchmarkConfig
{
	#[serde(default = "default_width")]
	pub width: i32,

	#[serde(default = "default_height")]
	pub height: i32,

	#[serde(default = "default_num_frames")]
	pub num_frames: u32,

	// "cube" renders instanced cubes through the scene path,
	// "soup" feeds random small triangles straight to the framebuffer.
	#[serde(default = "default_scene")]
	pub scene: String,

	#[serde(default = "default_num_instances")]
	pub num_instances: u32,

	#[serde(default = "default_num_soup_triangles")]
	pub num_soup_triangles: u32,

	#[serde(default)]
	pub seed: u64,
}

impl BenchmarkConfig
{
	pub fn from_app_config(app_config: &serde_json::Value) -> Self
	{
		serde_json::from_value(app_config["benchmark"].clone()).unwrap_or_default()
	}
}

impl Default for BenchmarkConfig
{
	fn default() -> Self
	{
		BenchmarkConfig {
			width: default_width(),
			height: default_height(),
			num_frames: default_num_frames(),
			scene: default_scene(),
			num_instances: default_num_instances(),
			num_soup_triangles: default_num_soup_triangles(),
			seed: 0,
		}
	}
}

fn default_width() -> i32
{
	1024
}

fn default_height() -> i32
{
	768
}

fn default_num_frames() -> u32
{
	1000
}

fn default_scene() -> String
{
	"cube".to_string()
}

fn default_num_instances() -> u32
{
	1
}

fn default_num_soup_triangles() -> u32
{
	512
}
