//! Small shared helpers.

/// Truncates an id for log display.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_ids_pass_through() {
		assert_eq!(truncate_id("abc"), "abc");
	}

	#[test]
	fn long_ids_are_truncated() {
		assert_eq!(truncate_id("0123456789abcdef"), "01234567..");
	}

	#[test]
	fn truncation_respects_char_boundaries() {
		assert_eq!(truncate_id("éééééééééé"), "éééééééé..");
		assert_eq!(truncate_id("éééééééé"), "éééééééé");
	}
}
