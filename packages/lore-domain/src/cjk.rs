use unicode_script::{Script, UnicodeScript};

/// Characters that render double-width and tokenize densely: CJK ideographs, kana, hangul and
/// full-width punctuation.
pub fn is_wide(ch: char) -> bool {
	if matches!(ch as u32, 0x3000..=0x303F | 0xFF00..=0xFFEF) {
		return true;
	}

	matches!(
		ch.script(),
		Script::Han | Script::Hiragana | Script::Katakana | Script::Hangul | Script::Bopomofo
	)
}

pub fn contains_cjk(text: &str) -> bool {
	text.chars().any(is_wide)
}

pub fn is_cjk_punctuation(ch: char) -> bool {
	matches!(
		ch as u32,
		0x3000..=0x303F | 0xFF01..=0xFF0F | 0xFF1A..=0xFF20 | 0xFF3B..=0xFF40 | 0xFF5B..=0xFF65
	) || matches!(ch, '“' | '”' | '‘' | '’' | '…' | '—' | '–' | '·' | '「' | '」' | '『' | '』')
}
