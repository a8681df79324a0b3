use serde::{ Deserialize, Serialize };

/// Summary of a series of duration samples, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
	pub min: u64,
	pub max: u64,
	pub avg: f64,
	/// Element at `floor(n / 2)` of the sorted samples: the lower median for even `n`.
	pub median: u64,
}

/// Reduce samples to min/max/avg/median. Returns `None` for an empty slice.
pub fn calculate_stats(samples: &[u64]) -> Option<DurationStats> {
	if samples.is_empty() {
		return None;
	}

	let mut sorted = samples.to_vec();
	sorted.sort_unstable();
	let sum: u64 = sorted.iter().sum();

	Some(DurationStats {
		min: sorted[0],
		max: sorted[sorted.len() - 1],
		avg: round2((sum as f64) / (sorted.len() as f64)),
		median: sorted[sorted.len() / 2],
	})
}

pub fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn empty_samples_have_no_stats() {
		assert_eq!(calculate_stats(&[]), None);
	}

	#[test]
	fn even_length_uses_lower_median_index() {
		let stats = calculate_stats(&[40, 10, 30, 20]).unwrap();
		// sorted: [10, 20, 30, 40], index 2
		assert_eq!(stats.median, 30);
		assert_eq!(stats.min, 10);
		assert_eq!(stats.max, 40);
		assert_eq!(stats.avg, 25.0);
	}

	#[test]
	fn average_is_rounded_to_two_decimals() {
		let stats = calculate_stats(&[1, 1, 2]).unwrap();
		assert_eq!(stats.avg, 1.33);
	}

	#[test]
	fn single_sample() {
		let stats = calculate_stats(&[7]).unwrap();
		assert_eq!((stats.min, stats.max, stats.median), (7, 7, 7));
		assert_eq!(stats.avg, 7.0);
	}

	proptest! {
		#[test]
		fn median_lies_between_extrema(samples in prop::collection::vec(0u64..100_000, 1..200)) {
			let stats = calculate_stats(&samples).unwrap();
			prop_assert!(stats.min <= stats.median);
			prop_assert!(stats.median <= stats.max);
			prop_assert_eq!(stats.min, *samples.iter().min().unwrap());
			prop_assert_eq!(stats.max, *samples.iter().max().unwrap());
		}

		#[test]
		fn average_tracks_true_mean(samples in prop::collection::vec(0u64..100_000, 1..200)) {
			let stats = calculate_stats(&samples).unwrap();
			let mean = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
			prop_assert!((stats.avg - mean).abs() <= 0.005 + 1e-9);
			prop_assert!(stats.min as f64 <= stats.avg && stats.avg <= stats.max as f64);
		}
	}
}
