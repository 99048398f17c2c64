use crate::cjk;

/// Rough token count for budget decisions: wide characters weigh 1.5 tokens, everything else
/// that is not whitespace weighs a quarter token. Never decreases as text is appended.
pub fn estimate_tokens(text: &str) -> u32 {
	let mut wide = 0_u64;
	let mut narrow = 0_u64;

	for ch in text.chars() {
		if ch.is_whitespace() {
			continue;
		}
		if cjk::is_wide(ch) {
			wide += 1;
		} else {
			narrow += 1;
		}
	}

	// Hundredths keep the arithmetic integral.
	let hundredths = wide * 150 + narrow * 25;

	hundredths.div_ceil(100).min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_and_whitespace_cost_nothing() {
		assert_eq!(estimate_tokens(""), 0);
		assert_eq!(estimate_tokens(" \n\t "), 0);
	}

	#[test]
	fn wide_characters_weigh_more() {
		assert_eq!(estimate_tokens("你好"), 3);
		assert_eq!(estimate_tokens("abcd"), 1);
		assert!(estimate_tokens("热可可") > estimate_tokens("abc"));
	}

	#[test]
	fn appending_never_lowers_the_estimate() {
		let mut text = String::new();
		let mut last = 0;

		for piece in ["a", "b", "你", " ", "cd", "。", "efgh", "好"] {
			text.push_str(piece);

			let next = estimate_tokens(&text);

			assert!(next >= last, "{text:?} dropped from {last} to {next}");

			last = next;
		}
	}
}
