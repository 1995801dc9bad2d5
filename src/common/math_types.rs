pub type Vec3f = cgmath::Vector3<f32>;
pub type Mat4f = cgmath::Matrix4<f32>;

pub use cgmath::InnerSpace;
