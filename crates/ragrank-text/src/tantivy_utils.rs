use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, Token, TokenStream};

pub const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Lower-casing word analyzer shared by index build and query parsing.
pub fn build_analyzer(remove_stopwords: bool) -> TextAnalyzer {
	if remove_stopwords {
		TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build()
	} else {
		TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build()
	}
}

/// Runs `text` through the analyzer and returns its terms in order.
pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut terms = Vec::new();
	let mut stream = analyzer.token_stream(text);
	stream.process(&mut |token: &Token| terms.push(token.text.clone()));
	terms
}
