use std::{collections::HashMap, sync::LazyLock};

use regex::{Captures, Regex};

use crate::cjk;

pub const USER_SYMBOL: char = '\u{E000}';
pub const CHAR_SYMBOL: char = '\u{E001}';
pub const INTENSITY_SYMBOL: char = '\u{E010}';

const CONCEPT_BASE: u32 = 0xE100;
const CONCEPT_LIMIT: u32 = 0xF8FF;

struct Cluster {
	symbol: char,
	zh: &'static [&'static str],
	en: &'static [&'static str],
}

const CLUSTERS: [Cluster; 6] = [
	Cluster {
		symbol: INTENSITY_SYMBOL,
		zh: &["非常", "十分", "特别", "超级", "极其", "相当", "格外", "很", "挺"],
		en: &[
			"very much", "so much", "a lot", "very", "really", "extremely", "quite", "super",
			"deeply", "truly", "so",
		],
	},
	Cluster {
		symbol: '\u{E011}',
		zh: &["喜欢", "喜爱", "热爱", "钟爱", "中意", "爱上", "爱吃", "爱喝"],
		en: &[
			"is fond of", "fond of", "likes", "liked", "liking", "like", "loves", "loved",
			"loving", "love", "enjoys", "enjoyed", "enjoy", "adores", "adored", "adore",
		],
	},
	Cluster {
		symbol: '\u{E012}',
		zh: &["不喜欢", "害怕", "恐惧", "畏惧", "讨厌", "厌恶", "反感", "怕"],
		en: &[
			"does not like", "doesn't like", "don't like", "is afraid of", "afraid of",
			"scared of", "frightened of", "terrified of", "fears", "feared", "fear", "hates",
			"hated", "hate", "dislikes", "disliked", "dislike", "dreads", "dread",
		],
	},
	Cluster {
		symbol: '\u{E013}',
		zh: &["感兴趣", "好奇", "着迷", "兴趣"],
		en: &["interested in", "interest in", "curious about", "fascinated by", "interested"],
	},
	Cluster {
		symbol: '\u{E014}',
		zh: &["拥抱", "抱住", "搂住", "搂抱", "抱抱", "抱紧"],
		en: &[
			"hugs", "hugged", "hugging", "hug", "embraces", "embraced", "embrace", "cuddles",
			"cuddled", "cuddle",
		],
	},
	Cluster {
		symbol: '\u{E015}',
		zh: &["询问", "问道", "提问", "请求", "打听", "追问"],
		en: &[
			"asks", "asked", "asking", "ask", "inquires", "inquired", "inquire", "requests",
			"requested", "request",
		],
	},
];

const BUILTIN_ROWS: &[(&[&str], &[&str])] = &[
	(&["你", "您"], &["you", "your", "yours"]),
	(&["我"], &["i", "me", "my", "mine"]),
	(&["他", "她"], &["he", "she", "him", "his", "her"]),
	(&["热可可", "可可"], &["hot cocoa", "hot chocolate", "cocoa"]),
	(&["咖啡"], &["coffee"]),
	(&["茶"], &["tea"]),
	(&["牛奶"], &["milk"]),
	(&["蛋糕"], &["cake"]),
	(&["甜食", "甜点"], &["sweets", "dessert"]),
	(&["猫咪", "猫"], &["cat", "kitten"]),
	(&["小狗", "狗"], &["dog", "puppy"]),
	(&["雷声", "打雷", "雷雨"], &["thunder", "thunderstorm"]),
	(&["黑暗"], &["dark", "darkness"]),
	(&["音乐"], &["music"]),
	(&["阅读", "读书", "书"], &["book", "reading"]),
	(&["下雨", "雨"], &["rain"]),
	(&["花"], &["flower"]),
	(&["名叫", "名字"], &["named", "name"]),
	(&["生日"], &["birthday"]),
	(&["家"], &["home", "house"]),
	(&["朋友"], &["friend"]),
	(&["姐姐", "妹妹"], &["sister"]),
	(&["哥哥", "弟弟"], &["brother"]),
	(&["学校"], &["school"]),
	(&["工作"], &["work", "job"]),
	(&["唱歌"], &["sing", "singing"]),
	(&["跳舞"], &["dance", "dancing"]),
	(&["游泳"], &["swim", "swimming"]),
	(&["吃"], &["eat", "ate", "eating"]),
	(&["喝"], &["drink", "drank", "drinking"]),
];

const ZH_STOPWORDS: &[&str] = &[
	"一直", "总是", "有点", "比较", "一个", "非常", "最", "的", "了", "是", "也", "都", "着",
	"过", "在", "和", "与", "及", "把", "被", "给", "对", "吗", "呢", "吧", "啊", "呀", "就",
	"还", "个",
];
const EN_STOPWORDS: &[&str] = &[
	"a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "am", "to", "of", "and",
	"or", "with", "at", "in", "on", "for", "by", "from", "as", "that", "this", "it", "its",
	"does", "do", "did", "has", "have", "had", "just", "also", "always",
];

static PLACEHOLDERS: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"(?i)\{\{\s*(user|char)\s*\}\}|<\s*(user|char)\s*>").ok()
});
static CLUSTER_PATTERN: LazyLock<Option<(Regex, HashMap<String, char>)>> = LazyLock::new(|| {
	let mut lookup = HashMap::new();

	for cluster in &CLUSTERS {
		for term in cluster.en {
			lookup.insert((*term).to_string(), cluster.symbol);
		}
	}

	alternation(lookup.keys().cloned()).map(|re| (re, lookup))
});
static CLUSTER_ZH: LazyLock<Vec<(&'static str, char)>> = LazyLock::new(|| {
	let mut terms = CLUSTERS
		.iter()
		.flat_map(|cluster| cluster.zh.iter().map(|term| (*term, cluster.symbol)))
		.collect::<Vec<_>>();

	terms.sort_by_key(|(term, _)| std::cmp::Reverse(term.chars().count()));

	terms
});

/// Replaces `{{user}}`/`<user>` and `{{char}}`/`<char>` with their symbols.
pub fn replace_placeholders(text: &str) -> String {
	let Some(re) = PLACEHOLDERS.as_ref() else {
		return text.to_string();
	};

	re.replace_all(text, |caps: &Captures<'_>| {
		let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_ascii_lowercase());

		if name.as_deref() == Some("user") {
			USER_SYMBOL.to_string()
		} else {
			CHAR_SYMBOL.to_string()
		}
	})
	.into_owned()
}

/// Folds every synonym cluster member into the cluster's symbol. Expects lowercase input.
pub fn collapse_clusters(text: &str) -> String {
	let mut out = text.to_string();

	for (term, symbol) in CLUSTER_ZH.iter() {
		if out.contains(term) {
			out = out.replace(term, &symbol.to_string());
		}
	}

	if let Some((re, lookup)) = CLUSTER_PATTERN.as_ref() {
		out = replace_words(re, lookup, &out);
	}

	out
}

/// Puts a space between a latin word character and anything that is not one, so `\b` anchors
/// work inside mixed-script text.
pub fn space_between_scripts(text: &str) -> String {
	let mut out = String::with_capacity(text.len() + 8);
	let mut prev: Option<char> = None;

	for ch in text.chars() {
		if let Some(last) = prev
			&& !last.is_whitespace()
			&& !ch.is_whitespace()
			&& is_latin_word(last) != is_latin_word(ch)
			&& !matches!(last, '\'' | '-')
			&& !matches!(ch, '\'' | '-')
		{
			out.push(' ');
		}

		out.push(ch);

		prev = Some(ch);
	}

	out
}

pub fn is_latin_word(ch: char) -> bool {
	ch.is_alphanumeric() && !cjk::is_wide(ch)
}

pub fn is_symbol(ch: char) -> bool {
	matches!(ch as u32, 0xE000..=0xF8FF)
}

/// Concept vocabulary: built-in rows plus configured equivalents.
pub struct Glossary {
	zh: Vec<(String, char)>,
	en: Option<(Regex, HashMap<String, char>)>,
}
impl Glossary {
	pub fn new(extra: &[lore_config::Equivalent]) -> Self {
		let rows = BUILTIN_ROWS
			.iter()
			.map(|(zh, en)| {
				(
					zh.iter().map(|term| term.to_string()).collect::<Vec<_>>(),
					en.iter().map(|term| term.to_string()).collect::<Vec<_>>(),
				)
			})
			.chain(extra.iter().map(|row| (row.zh.clone(), row.en.clone())));
		let mut zh = Vec::new();
		let mut en = HashMap::new();

		for (offset, (zh_terms, en_terms)) in rows.enumerate() {
			let Some(symbol) = u32::try_from(offset)
				.ok()
				.and_then(|offset| CONCEPT_BASE.checked_add(offset))
				.filter(|code| *code <= CONCEPT_LIMIT)
				.and_then(char::from_u32)
			else {
				break;
			};

			for term in zh_terms {
				let term = term.trim().to_lowercase();

				if !term.is_empty() {
					zh.push((term, symbol));
				}
			}
			for term in en_terms {
				let term = term.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

				if term.is_empty() {
					continue;
				}
				if term.chars().count() >= 3 && !term.ends_with('s') {
					en.entry(format!("{term}s")).or_insert(symbol);
				}

				en.entry(term).or_insert(symbol);
			}
		}

		zh.sort_by_key(|(term, _)| std::cmp::Reverse(term.chars().count()));

		let en = alternation(en.keys().cloned()).map(|re| (re, en));

		Self { zh, en }
	}

	/// Splits normalized text into concept symbols in reading order, adjacent repeats folded.
	/// Returns `None` when some content word is outside the vocabulary.
	pub fn concepts(&self, normalized: &str) -> Option<Vec<char>> {
		let mut text = space_between_scripts(normalized);

		for (term, symbol) in &self.zh {
			if text.contains(term.as_str()) {
				text = text.replace(term.as_str(), &format!(" {symbol} "));
			}
		}

		if let Some((re, lookup)) = self.en.as_ref() {
			text = replace_words(re, lookup, &text);
		}

		let mut concepts = Vec::new();
		let mut rest = text.as_str();

		while let Some(ch) = rest.chars().next() {
			if ch.is_whitespace() {
				rest = &rest[ch.len_utf8()..];

				continue;
			}
			if is_symbol(ch) {
				if ch != INTENSITY_SYMBOL && concepts.last() != Some(&ch) {
					concepts.push(ch);
				}

				rest = &rest[ch.len_utf8()..];

				continue;
			}
			if cjk::is_wide(ch) {
				let stop = ZH_STOPWORDS.iter().copied().find(|stop| rest.starts_with(*stop))?;

				rest = &rest[stop.len()..];

				continue;
			}
			if is_latin_word(ch) {
				let end = rest
					.char_indices()
					.find(|(_, c)| !(is_latin_word(*c) || *c == '\''))
					.map(|(idx, _)| idx)
					.unwrap_or(rest.len());
				let word = &rest[..end];

				if !EN_STOPWORDS.contains(&word) {
					return None;
				}

				rest = &rest[end..];

				continue;
			}

			rest = &rest[ch.len_utf8()..];
		}

		Some(concepts)
	}
}
impl Default for Glossary {
	fn default() -> Self {
		Self::new(&[])
	}
}

fn alternation<I>(terms: I) -> Option<Regex>
where
	I: IntoIterator<Item = String>,
{
	let mut terms = terms.into_iter().collect::<Vec<_>>();

	if terms.is_empty() {
		return None;
	}

	terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

	let body = terms.iter().map(|term| regex::escape(term)).collect::<Vec<_>>().join("|");

	Regex::new(&format!(r"\b(?:{body})\b")).ok()
}

fn replace_words(re: &Regex, lookup: &HashMap<String, char>, text: &str) -> String {
	re.replace_all(text, |caps: &Captures<'_>| match lookup.get(&caps[0]) {
		Some(symbol) => format!(" {symbol} "),
		None => caps[0].to_string(),
	})
	.into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn placeholders_fold_case_insensitively() {
		assert_eq!(
			replace_placeholders("{{User}} hugs <char>"),
			format!("{USER_SYMBOL} hugs {CHAR_SYMBOL}")
		);
		assert_eq!(replace_placeholders("{{ user }}"), USER_SYMBOL.to_string());
	}

	#[test]
	fn negated_like_is_not_like() {
		let like = collapse_clusters("喜欢");
		let dislike = collapse_clusters("不喜欢");

		assert_ne!(like, dislike);
		assert_eq!(collapse_clusters("害怕"), dislike);
	}

	#[test]
	fn english_clusters_match_whole_words_only() {
		assert_eq!(collapse_clusters("likes").trim(), collapse_clusters("喜欢"));
		assert_eq!(collapse_clusters("likeness"), "likeness");
	}

	#[test]
	fn concepts_cross_languages() {
		let glossary = Glossary::default();
		let zh = glossary.concepts(&collapse_clusters("喜欢热可可")).expect("known words");
		let en = glossary.concepts(&collapse_clusters("likes hot cocoa")).expect("known words");

		assert_eq!(zh, en);
	}

	#[test]
	fn concepts_keep_who_does_what_to_whom() {
		let glossary = Glossary::default();
		let forward = glossary.concepts(&collapse_clusters("我喜欢你")).expect("known words");
		let reversed = glossary.concepts(&collapse_clusters("你喜欢我")).expect("known words");

		assert_eq!(forward.len(), 3);
		assert_eq!(forward.iter().rev().copied().collect::<Vec<_>>(), reversed);
	}

	#[test]
	fn unknown_words_leave_residue() {
		let glossary = Glossary::default();

		assert!(glossary.concepts("likes quantum physics").is_none());
		assert!(glossary.concepts("量子").is_none());
	}

	#[test]
	fn configured_rows_extend_the_vocabulary() {
		let glossary = Glossary::new(&[lore_config::Equivalent {
			zh: vec!["棉花糖".to_string()],
			en: vec!["marshmallow".to_string()],
		}]);

		assert_eq!(glossary.concepts("棉花糖"), glossary.concepts("marshmallows"));
		assert!(glossary.concepts("棉花糖").is_some());
	}
}
