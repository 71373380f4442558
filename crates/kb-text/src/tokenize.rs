use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{
	LowerCaser, RemoveLongFilter, StopWordFilter, TextAnalyzer, Token, TokenStream, Tokenizer,
};
use tantivy::Index;

use kb_core::language::is_cjk;

pub const ANALYZER_NAME: &str = "kb_mixed_script";

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_text_field("id", STRING | STORED);
	let _source_field = schema_builder.add_text_field("source", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(ANALYZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	let _text_field = schema_builder.add_text_field("text", text_options.clone());
	let _headings_field = schema_builder.add_text_field("headings", text_options);
	schema_builder.build()
}

pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(MixedScriptTokenizer)
		.filter(RemoveLongFilter::limit(64))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(ANALYZER_NAME, build_analyzer());
}

/// Terms the index would store for `text`, in order, duplicates included.
pub fn analyze(text: &str) -> Vec<String> {
	let mut analyzer = build_analyzer();
	let mut stream = analyzer.token_stream(text);
	let mut terms = Vec::new();
	while stream.advance() {
		terms.push(stream.token().text.clone());
	}
	terms
}

/// Scripts written without spaces between words.
fn is_unsegmented(c: char) -> bool {
	is_cjk(c) || matches!(c as u32, 0x3040..=0x30FF | 0xAC00..=0xD7AF)
}

/// Word tokenizer for mixed Latin/CJK text.
///
/// Alphanumeric runs become one token each; runs of unsegmented script become
/// overlapping character bigrams (a lone character stays a unigram).
#[derive(Clone, Default)]
pub struct MixedScriptTokenizer;

pub struct MixedScriptTokenStream {
	tokens: Vec<Token>,
	cursor: usize,
}

impl Tokenizer for MixedScriptTokenizer {
	type TokenStream<'a> = MixedScriptTokenStream;

	fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
		MixedScriptTokenStream { tokens: segment(text), cursor: 0 }
	}
}

impl TokenStream for MixedScriptTokenStream {
	fn advance(&mut self) -> bool {
		if self.cursor < self.tokens.len() {
			self.cursor += 1;
			true
		} else {
			false
		}
	}

	fn token(&self) -> &Token {
		&self.tokens[self.cursor.saturating_sub(1)]
	}

	fn token_mut(&mut self) -> &mut Token {
		let i = self.cursor.saturating_sub(1);
		&mut self.tokens[i]
	}
}

#[derive(PartialEq)]
enum Run {
	None,
	Word(usize),
	Cjk,
}

fn segment(text: &str) -> Vec<Token> {
	let mut tokens = Vec::new();
	let mut cjk_run: Vec<(usize, char)> = Vec::new();
	let mut run = Run::None;

	for (offset, c) in text.char_indices() {
		if is_unsegmented(c) {
			if let Run::Word(start) = run {
				push_token(&mut tokens, start, offset, &text[start..offset]);
			}
			cjk_run.push((offset, c));
			run = Run::Cjk;
		} else if c.is_alphanumeric() {
			if run == Run::Cjk {
				flush_cjk(&mut tokens, &mut cjk_run);
			}
			if !matches!(run, Run::Word(_)) {
				run = Run::Word(offset);
			}
		} else {
			match run {
				Run::Word(start) => push_token(&mut tokens, start, offset, &text[start..offset]),
				Run::Cjk => flush_cjk(&mut tokens, &mut cjk_run),
				Run::None => {}
			}
			run = Run::None;
		}
	}
	match run {
		Run::Word(start) => push_token(&mut tokens, start, text.len(), &text[start..]),
		Run::Cjk => flush_cjk(&mut tokens, &mut cjk_run),
		Run::None => {}
	}
	tokens
}

fn flush_cjk(tokens: &mut Vec<Token>, run: &mut Vec<(usize, char)>) {
	if run.len() == 1 {
		let (offset, c) = run[0];
		let end = offset + c.len_utf8();
		push_token(tokens, offset, end, &c.to_string());
	} else {
		for pair in run.windows(2) {
			let (start, a) = pair[0];
			let (offset_b, b) = pair[1];
			let end = offset_b + b.len_utf8();
			let mut text = String::with_capacity(a.len_utf8() + b.len_utf8());
			text.push(a);
			text.push(b);
			push_token(tokens, start, end, &text);
		}
	}
	run.clear();
}

fn push_token(tokens: &mut Vec<Token>, from: usize, to: usize, text: &str) {
	let position = tokens.len();
	tokens.push(Token { offset_from: from, offset_to: to, position, text: text.to_string(), position_length: 1 });
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn latin_words_lowercased_without_stop_words() {
		assert_eq!(analyze("How do I request Leave?"), vec!["i", "request", "leave"]);
	}

	#[test]
	fn codes_split_on_punctuation() {
		assert_eq!(analyze("XJ-4471"), vec!["xj", "4471"]);
		assert_eq!(analyze("hr@corp.example"), vec!["hr", "corp", "example"]);
	}

	#[test]
	fn cjk_runs_become_bigrams() {
		assert_eq!(analyze("年假申请"), vec!["年假", "假申", "申请"]);
		assert_eq!(analyze("假"), vec!["假"]);
	}

	#[test]
	fn mixed_script_boundaries() {
		assert_eq!(analyze("请假policy流程"), vec!["请假", "policy", "流程"]);
	}

	#[test]
	fn offsets_point_into_source() {
		let text = "ab 年假";
		let tokens = segment(text);
		assert_eq!(&text[tokens[0].offset_from..tokens[0].offset_to], "ab");
		assert_eq!(&text[tokens[1].offset_from..tokens[1].offset_to], "年假");
		assert_eq!(tokens[1].position, 1);
	}
}
