use anyhow::{ anyhow, Result };
use serde::{ Deserialize, Serialize };
use sysinfo::{ ProcessRefreshKind, System };

use crate::stats::round2;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Point-in-time memory figures in megabytes, rounded to two decimals.
///
/// `heap_used` is the resident set of the process and `heap_total` its virtual size;
/// `external` is whatever the backend reports about memory it manages itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
	pub heap_used: f64,
	pub heap_total: f64,
	pub external: f64,
}

impl MemorySnapshot {
	pub fn current_process() -> Result<Self> {
		let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("cannot resolve own pid: {}", e))?;
		let mut system = System::new();
		system.refresh_process_specifics(pid, ProcessRefreshKind::new().with_memory());
		let process = system
			.process(pid)
			.ok_or_else(|| anyhow!("process {} is not visible to sysinfo", pid))?;

		Ok(Self {
			heap_used: megabytes(process.memory()),
			heap_total: megabytes(process.virtual_memory()),
			external: 0.0,
		})
	}

	pub fn with_external(mut self, bytes: u64) -> Self {
		self.external = megabytes(bytes);
		self
	}

	/// Growth of `heap_used` from `earlier` to `self`.
	pub fn heap_used_since(&self, earlier: &MemorySnapshot) -> f64 {
		round2(self.heap_used - earlier.heap_used)
	}
}

pub fn megabytes(bytes: u64) -> f64 {
	round2((bytes as f64) / BYTES_PER_MEGABYTE)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn converts_bytes_to_rounded_megabytes() {
		assert_eq!(megabytes(0), 0.0);
		assert_eq!(megabytes(1024 * 1024), 1.0);
		assert_eq!(megabytes(1_572_864), 1.5);
		assert_eq!(megabytes(1_000_000), 0.95);
	}

	#[test]
	fn reads_own_process() {
		let snapshot = MemorySnapshot::current_process().unwrap();
		assert!(snapshot.heap_used > 0.0);
		assert!(snapshot.heap_total >= snapshot.heap_used);
		assert_eq!(snapshot.external, 0.0);
	}

	#[test]
	fn delta_is_rounded() {
		let before = MemorySnapshot { heap_used: 10.25, ..Default::default() };
		let after = MemorySnapshot { heap_used: 12.5, ..Default::default() };
		assert_eq!(after.heap_used_since(&before), 2.25);
	}
}
