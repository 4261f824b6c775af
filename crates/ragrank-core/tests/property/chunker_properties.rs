use proptest::prelude::*;
use ragrank_core::{chunk, Chunker, ChunkingConfig};

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,8}", 1..30).prop_map(|words| {
        let mut s = words.join(" ");
        s.push('.');
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => s,
        }
    })
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(sentence(), 0..25).prop_map(|sentences| sentences.join(" "))
}

fn config() -> impl Strategy<Value = ChunkingConfig> {
    (2usize..60).prop_flat_map(|max| {
        (Just(max), 1..max).prop_flat_map(|(max, min)| {
            (Just(max), Just(min), 0..max)
                .prop_map(|(max, min, overlap)| ChunkingConfig::new(max, min, overlap))
        })
    })
}

proptest! {
    #[test]
    fn chunking_is_deterministic(text in document(), cfg in config()) {
        let first = chunk(&text, cfg.max_tokens, cfg.min_tokens, cfg.overlap_tokens).unwrap();
        let second = chunk(&text, cfg.max_tokens, cfg.min_tokens, cfg.overlap_tokens).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn chunks_are_never_empty(text in document(), cfg in config()) {
        let chunker = Chunker::new(cfg).unwrap();
        for c in chunker.chunk(&text) {
            prop_assert!(c.split_whitespace().count() >= 1);
        }
    }

    #[test]
    fn without_overlap_every_word_is_kept_in_order(text in document(), cfg in config()) {
        let cfg = ChunkingConfig::new(cfg.max_tokens, cfg.min_tokens, 0);
        let chunks = Chunker::new(cfg).unwrap().chunk(&text);
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        prop_assert_eq!(rejoined, original);
    }

    #[test]
    fn only_the_first_chunk_may_fall_below_min(text in document(), cfg in config()) {
        let cfg = ChunkingConfig::new(cfg.max_tokens, cfg.min_tokens, 0);
        let chunks = Chunker::new(cfg).unwrap().chunk(&text);
        for c in chunks.iter().skip(1) {
            prop_assert!(c.split_whitespace().count() >= cfg.min_tokens);
        }
    }
}
