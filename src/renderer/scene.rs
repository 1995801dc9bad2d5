// Scene storage: models and their instances, plus the camera matrices.
// Models are owned by the scene for its whole lifetime; instances come and go
// through a generational freelist, so stale instance ids are detectable.

use crate::common::{fixed_math::*, freelist::*, matrix::*};

pub const SCENE_MAX_NUM_MODELS: usize = 256;
pub const SCENE_MAX_NUM_INSTANCES: usize = 512;

// Mesh data as produced by an external loader: positions as xyz triples,
// indices as counter-clockwise triangle triples.
pub struct ModelShape
{
	pub positions: Vec<f32>,
	pub indices: Vec<u32>,
}

pub struct Model
{
	// xyz position triples, Q16.16.
	pub(crate) positions: Vec<Fixed16>,
	// Triangle index triples, stored clockwise.
	pub(crate) indices: Vec<u32>,
}

impl Model
{
	pub fn num_vertices(&self) -> usize
	{
		self.positions.len() / 3
	}

	pub fn num_triangles(&self) -> usize
	{
		self.indices.len() / 3
	}
}

pub(crate) struct Instance
{
	pub model_id: u32,
}

pub struct Scene
{
	pub(crate) models: Vec<Model>,
	pub(crate) instances: FreeList<Instance>,
	pub(crate) view_matrix: [Fixed16; 16],
	pub(crate) projection_matrix: [Fixed16; 16],
}

impl Scene
{
	pub fn new() -> Self
	{
		Scene {
			models: Vec::new(),
			instances: FreeList::with_capacity(SCENE_MAX_NUM_INSTANCES),
			view_matrix: fixed16_mat4_identity(),
			projection_matrix: fixed16_mat4_identity(),
		}
	}

	// Add one model. Source winding is counter-clockwise; the rasterizer wants
	// clockwise, so the second and third index of every triangle are swapped.
	pub fn add_model(&mut self, positions: &[f32], indices: &[u32]) -> u32
	{
		assert!(positions.len() % 3 == 0);
		assert!(indices.len() % 3 == 0);
		assert!(self.models.len() < SCENE_MAX_NUM_MODELS);

		let positions_fixed = positions
			.iter()
			.map(|&p| (p * (FIXED16_ONE as f32)) as Fixed16)
			.collect();

		let mut cw_indices = indices.to_vec();
		for triangle in cw_indices.chunks_exact_mut(3)
		{
			triangle.swap(1, 2);
		}

		let model_id = self.models.len() as u32;
		self.models.push(Model {
			positions: positions_fixed,
			indices: cw_indices,
		});
		model_id
	}

	// Add several models at once. Returns the first model id and the number added.
	pub fn add_models(&mut self, shapes: &[ModelShape]) -> (u32, u32)
	{
		let first_model_id = self.models.len() as u32;
		for shape in shapes
		{
			self.add_model(&shape.positions, &shape.indices);
		}
		(first_model_id, shapes.len() as u32)
	}

	pub fn num_models(&self) -> usize
	{
		self.models.len()
	}

	pub fn model(&self, model_id: u32) -> &Model
	{
		&self.models[model_id as usize]
	}

	pub fn add_instance(&mut self, model_id: u32) -> u32
	{
		assert!((model_id as usize) < self.models.len());
		self.instances.insert(Instance { model_id })
	}

	pub fn remove_instance(&mut self, instance_id: u32)
	{
		self.instances.erase(instance_id);
	}

	pub fn has_instance(&self, instance_id: u32) -> bool
	{
		self.instances.contains(instance_id)
	}

	pub fn num_instances(&self) -> usize
	{
		self.instances.len()
	}

	pub fn set_view(&mut self, matrix: &[Fixed16; 16])
	{
		self.view_matrix = *matrix;
	}

	pub fn set_projection(&mut self, matrix: &[Fixed16; 16])
	{
		self.projection_matrix = *matrix;
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn test_winding_flip()
	{
		let mut scene = Scene::new();
		let model_id = scene.add_model(
			&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
			&[0, 1, 2],
		);
		assert_eq!(scene.model(model_id).indices, vec![0, 2, 1]);
		assert_eq!(scene.model(model_id).positions[3], FIXED16_ONE);
	}

	#[test]
	fn test_instance_ids_are_generational()
	{
		let mut scene = Scene::new();
		let model_id = scene.add_model(&[0.0, 0.0, 0.0], &[]);

		let instance = scene.add_instance(model_id);
		assert!(scene.has_instance(instance));

		scene.remove_instance(instance);
		assert!(!scene.has_instance(instance));

		let new_instance = scene.add_instance(model_id);
		assert_ne!(instance, new_instance);
		assert!(!scene.has_instance(instance));
		assert!(scene.has_instance(new_instance));
	}
}
