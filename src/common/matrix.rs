use super::{fixed_math::*, math_types::*};

// Matrices are 16 values with the element at (row, column) stored at index row + column * 4,
// applied to column vectors as "matrix * vector".

pub fn fixed16_mat4_identity() -> [Fixed16; 16]
{
	let mut result = [0; 16];
	for i in 0 .. 4
	{
		result[i * 4 + i] = int_to_fixed16(1);
	}
	result
}

pub fn fixed16_mat4_mul(a: &[Fixed16; 16], b: &[Fixed16; 16]) -> [Fixed16; 16]
{
	let mut result = [0; 16];
	for column in 0 .. 4
	{
		let b_column = [b[column * 4], b[column * 4 + 1], b[column * 4 + 2], b[column * 4 + 3]];
		let transformed = fixed16_mat4_transform(a, &b_column);
		result[column * 4 .. column * 4 + 4].copy_from_slice(&transformed);
	}
	result
}

pub fn fixed16_mat4_transform(m: &[Fixed16; 16], v: &[Fixed16; 4]) -> [Fixed16; 4]
{
	let mut result = [0; 4];
	for row in 0 .. 4
	{
		result[row] = fixed16_fma(
			m[row],
			v[0],
			fixed16_fma(m[row + 4], v[1], fixed16_fma(m[row + 8], v[2], fixed16_mul(m[row + 12], v[3]))),
		);
	}
	result
}

// Left-handed perspective projection. Maps view-space z in [z_near, z_far]
// to clip z in [0, w], which is what the rasterizer's near/far clipper expects.
pub fn build_projection_matrix(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4f
{
	let h = 1.0 / (fov_y * 0.5).tan();
	let w = h / aspect;
	let q = z_far / (z_far - z_near);

	#[rustfmt::skip]
	let result = Mat4f::new(
		w, 0.0, 0.0, 0.0,
		0.0, h, 0.0, 0.0,
		0.0, 0.0, q, 1.0,
		0.0, 0.0, -q * z_near, 0.0,
	);
	result
}

// Left-handed look-to view matrix.
pub fn build_look_to_matrix(eye: Vec3f, look: Vec3f, up: Vec3f) -> Mat4f
{
	let z_axis = look.normalize();
	let x_axis = up.cross(z_axis).normalize();
	let y_axis = z_axis.cross(x_axis);

	#[rustfmt::skip]
	let result = Mat4f::new(
		x_axis.x, y_axis.x, z_axis.x, 0.0,
		x_axis.y, y_axis.y, z_axis.y, 0.0,
		x_axis.z, y_axis.z, z_axis.z, 0.0,
		-x_axis.dot(eye), -y_axis.dot(eye), -z_axis.dot(eye), 1.0,
	);
	result
}

pub fn mat4f_to_fixed16(m: &Mat4f) -> [Fixed16; 16]
{
	let columns: [[f32; 4]; 4] = (*m).into();
	let mut result = [0; 16];
	for column in 0 .. 4
	{
		for row in 0 .. 4
		{
			result[column * 4 + row] = f32_to_fixed16(columns[column][row]);
		}
	}
	result
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn test_identity_transform()
	{
		let m = fixed16_mat4_identity();
		let v = [int_to_fixed16(3), int_to_fixed16(-5), int_to_fixed16(7), int_to_fixed16(1)];
		assert_eq!(fixed16_mat4_transform(&m, &v), v);
	}

	#[test]
	fn test_mul_identity()
	{
		let identity = fixed16_mat4_identity();
		let mut m = fixed16_mat4_identity();
		m[12] = int_to_fixed16(2);
		m[13] = int_to_fixed16(-3);
		assert_eq!(fixed16_mat4_mul(&identity, &m), m);
		assert_eq!(fixed16_mat4_mul(&m, &identity), m);
	}

	#[test]
	fn test_translation_transform()
	{
		let mut m = fixed16_mat4_identity();
		m[12] = int_to_fixed16(10);
		m[13] = int_to_fixed16(20);
		m[14] = int_to_fixed16(30);
		let v = [int_to_fixed16(1), int_to_fixed16(2), int_to_fixed16(3), int_to_fixed16(1)];
		assert_eq!(
			fixed16_mat4_transform(&m, &v),
			[int_to_fixed16(11), int_to_fixed16(22), int_to_fixed16(33), int_to_fixed16(1)]
		);
	}

	#[test]
	fn test_projection_depth_range()
	{
		let m = build_projection_matrix(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 10.0);
		let fixed = mat4f_to_fixed16(&m);

		// A point on the near plane lands on clip z = 0.
		let near_point = [0, 0, f32_to_fixed16(1.0), f32_to_fixed16(1.0)];
		let near_result = fixed16_mat4_transform(&fixed, &near_point);
		assert!(near_result[2].abs() < 16);

		// A point on the far plane lands on clip z = w.
		let far_point = [0, 0, f32_to_fixed16(10.0), f32_to_fixed16(1.0)];
		let far_result = fixed16_mat4_transform(&fixed, &far_point);
		assert!((far_result[2] - far_result[3]).abs() < 16);
	}

	#[test]
	fn test_look_to_forward_is_identity_rotation()
	{
		let m = build_look_to_matrix(
			Vec3f::new(0.0, 0.0, 0.0),
			Vec3f::new(0.0, 0.0, 1.0),
			Vec3f::new(0.0, 1.0, 0.0),
		);
		let columns: [[f32; 4]; 4] = m.into();
		for column in 0 .. 4
		{
			for row in 0 .. 4
			{
				let expected = if row == column { 1.0 } else { 0.0 };
				assert!((columns[column][row] - expected).abs() < 1.0e-6);
			}
		}
	}
}
