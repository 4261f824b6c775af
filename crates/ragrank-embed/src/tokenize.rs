use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Model inputs for one padded batch of (query, passage) pairs.
pub struct PairBatch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Encodes every (query, passage) pair, truncating each to `max_len` tokens and
/// right-padding the batch to its longest member.
pub fn encode_pairs(
    tokenizer: &Tokenizer,
    query: &str,
    passages: &[String],
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> Result<PairBatch> {
    let inputs: Vec<(String, String)> = passages.iter().map(|p| (query.to_string(), p.clone())).collect();
    let encodings = tokenizer
        .encode_batch(inputs, true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

    let seq_len = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);
    let batch = encodings.len();
    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut types = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    for enc in &encodings {
        let len = enc.get_ids().len().min(seq_len);
        ids.extend(enc.get_ids()[..len].iter().copied());
        types.extend(enc.get_type_ids()[..len].iter().copied());
        mask.extend(enc.get_attention_mask()[..len].iter().copied());
        let pad = seq_len - len;
        ids.extend(std::iter::repeat(pad_id).take(pad));
        types.extend(std::iter::repeat(0).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
    }

    Ok(PairBatch {
        input_ids: Tensor::from_vec(ids, (batch, seq_len), device)?,
        token_type_ids: Tensor::from_vec(types, (batch, seq_len), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, seq_len), device)?,
    })
}
