// Fixed-point math used across the rasterizer.
// "Fixed16" is a signed Q16.16 value, "Fixed8" is a signed Q16.8 value.
// Q16.16 is used for clip-space coordinates and matrices, Q16.8 for window coordinates.

pub type Fixed16 = i32;
pub const FIXED16_BASE: i64 = 16;
pub const FIXED16_ONE: Fixed16 = 1 << FIXED16_BASE;
pub const FIXED16_HALF: Fixed16 = FIXED16_ONE >> 1;

pub type Fixed8 = i32;
pub const FIXED8_BASE: i64 = 8;
pub const FIXED8_ONE: Fixed8 = 1 << FIXED8_BASE;
pub const FIXED8_HALF: Fixed8 = FIXED8_ONE >> 1;

pub fn int_to_fixed16(x: i32) -> Fixed16
{
	x << FIXED16_BASE
}

// Conversion used for matrices. The multiplier is 0xFFFF rather than 0x10000,
// which introduces a relative bias of about 1.5e-5.
pub fn f32_to_fixed16(x: f32) -> Fixed16
{
	(x * (0xFFFF as f32)) as Fixed16
}

pub fn fixed16_to_f32(x: Fixed16) -> f32
{
	(x as f32) / (FIXED16_ONE as f32)
}

// Saturate a 64-bit intermediate to the Fixed16 range.
pub fn fixed16_sat(x: i64) -> Fixed16
{
	if x > i32::MAX as i64
	{
		i32::MAX
	}
	else if x < i32::MIN as i64
	{
		i32::MIN
	}
	else
	{
		x as Fixed16
	}
}

pub fn fixed16_add(a: Fixed16, b: Fixed16) -> Fixed16
{
	a.wrapping_add(b)
}

pub fn fixed16_add_sat(a: Fixed16, b: Fixed16) -> Fixed16
{
	fixed16_sat((a as i64) + (b as i64))
}

// Mid values are rounded up.
pub fn fixed16_mul(a: Fixed16, b: Fixed16) -> Fixed16
{
	let temp = (a as i64) * (b as i64) + (1 << (FIXED16_BASE - 1));
	fixed16_sat(temp >> FIXED16_BASE)
}

// Mid values are rounded away from zero. Caller must ensure b != 0.
pub fn fixed16_div(a: Fixed16, b: Fixed16) -> Fixed16
{
	let mut temp = (a as i64) << FIXED16_BASE;
	if (temp >= 0) == (b >= 0)
	{
		temp += (b / 2) as i64;
	}
	else
	{
		temp -= (b / 2) as i64;
	}
	fixed16_sat(temp / (b as i64))
}

// a * b + c with a single rounding at the end.
pub fn fixed16_fma(a: Fixed16, b: Fixed16, c: Fixed16) -> Fixed16
{
	let temp = (a as i64) * (b as i64) + ((c as i64) << FIXED16_BASE) + (1 << (FIXED16_BASE - 1));
	fixed16_sat(temp >> FIXED16_BASE)
}

pub fn fixed16_to_fixed8(x: Fixed16) -> Fixed8
{
	fixed16_div(x, int_to_fixed16(256))
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn test_mul()
	{
		assert_eq!(fixed16_mul(int_to_fixed16(3), int_to_fixed16(5)), int_to_fixed16(15));
		assert_eq!(fixed16_mul(FIXED16_HALF, FIXED16_HALF), FIXED16_ONE / 4);
		assert_eq!(fixed16_mul(int_to_fixed16(-3), int_to_fixed16(5)), int_to_fixed16(-15));
		// Mid value rounds up.
		assert_eq!(fixed16_mul(1, FIXED16_HALF), 1);
		// Saturation.
		assert_eq!(fixed16_mul(int_to_fixed16(30000), int_to_fixed16(30000)), i32::MAX);
		assert_eq!(fixed16_mul(int_to_fixed16(-30000), int_to_fixed16(30000)), i32::MIN);
	}

	#[test]
	fn test_div()
	{
		assert_eq!(fixed16_div(int_to_fixed16(15), int_to_fixed16(3)), int_to_fixed16(5));
		assert_eq!(fixed16_div(int_to_fixed16(1), int_to_fixed16(2)), FIXED16_HALF);
		assert_eq!(fixed16_div(int_to_fixed16(-15), int_to_fixed16(3)), int_to_fixed16(-5));
		// 1/3 rounds to the nearest representable value.
		assert_eq!(fixed16_div(int_to_fixed16(1), int_to_fixed16(3)), 0x5555);
		assert_eq!(fixed16_div(int_to_fixed16(-1), int_to_fixed16(3)), -0x5555);
	}

	#[test]
	fn test_add()
	{
		assert_eq!(fixed16_add(int_to_fixed16(2), int_to_fixed16(3)), int_to_fixed16(5));
		// Plain add wraps, saturating add clamps.
		assert_eq!(fixed16_add(i32::MAX, 1), i32::MIN);
		assert_eq!(fixed16_add_sat(i32::MAX, 1), i32::MAX);
		assert_eq!(fixed16_add_sat(i32::MIN, -1), i32::MIN);
	}

	#[test]
	fn test_fma()
	{
		assert_eq!(
			fixed16_fma(int_to_fixed16(3), int_to_fixed16(5), int_to_fixed16(7)),
			int_to_fixed16(22)
		);
		assert_eq!(fixed16_fma(0, 0, int_to_fixed16(-4)), int_to_fixed16(-4));
		// Single rounding at the end.
		assert_eq!(fixed16_fma(1, FIXED16_HALF, 0), 1);
	}

	#[test]
	fn test_conversions()
	{
		assert_eq!(int_to_fixed16(7), 7 << 16);
		assert_eq!(f32_to_fixed16(1.0), 0xFFFF);
		assert_eq!(f32_to_fixed16(0.0), 0);
		assert_eq!(fixed16_to_fixed8(int_to_fixed16(1)), FIXED8_ONE);
		assert_eq!(fixed16_to_fixed8(int_to_fixed16(128) + FIXED16_HALF), (128 << 8) + FIXED8_HALF);
	}
}
