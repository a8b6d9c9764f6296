use std::path::Path;

use anyhow::{Result, anyhow};
use tokenizers::Tokenizer;

/// CLIP 文本编码器的最大长度
pub const MAX_POSITION_EMBEDDINGS: usize = 77;

const END_OF_TEXT: &str = "<|endoftext|>";

/// 将文本转换为定长的 token 序列
pub struct ClipTokenizer {
    tokenizer: Tokenizer,
    eot_id: u32,
}

impl ClipTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("无法加载分词器 {}: {}", path.display(), e))?;
        Self::new(tokenizer)
    }

    pub fn new(tokenizer: Tokenizer) -> Result<Self> {
        let eot_id = tokenizer
            .token_to_id(END_OF_TEXT)
            .ok_or_else(|| anyhow!("分词器中没有 {END_OF_TEXT}"))?;
        Ok(Self { tokenizer, eot_id })
    }

    /// 编码文本，结果长度固定为 77
    ///
    /// 过长的文本会被截断，但最后一个 token 始终是 `<|endoftext|>`，不足的部分同样用它填充
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding =
            self.tokenizer.encode(text, true).map_err(|e| anyhow!("文本分词失败: {}", e))?;
        let mut ids = encoding.get_ids().to_vec();
        if ids.len() >= MAX_POSITION_EMBEDDINGS {
            ids.truncate(MAX_POSITION_EMBEDDINGS - 1);
            ids.push(self.eot_id);
        }
        ids.resize(MAX_POSITION_EMBEDDINGS, self.eot_id);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use tokenizers::models::wordlevel::WordLevel;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;

    use super::*;

    fn tokenizer() -> ClipTokenizer {
        let vocab = [("<unk>", 0), ("a", 1), ("cat", 2), (END_OF_TEXT, 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let model = WordLevel::builder().vocab(vocab).unk_token("<unk>".into()).build().unwrap();
        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_pre_tokenizer(Some(Whitespace::default()));
        ClipTokenizer::new(tokenizer).unwrap()
    }

    #[test]
    fn pads_to_fixed_length() {
        let ids = tokenizer().encode("a cat").unwrap();
        assert_eq!(ids.len(), MAX_POSITION_EMBEDDINGS);
        assert_eq!(&ids[..3], &[1, 2, 3]);
        assert!(ids[2..].iter().all(|&id| id == 3));
    }

    #[test]
    fn empty_text() {
        let ids = tokenizer().encode("").unwrap();
        assert_eq!(ids, vec![3; MAX_POSITION_EMBEDDINGS]);
    }

    #[test]
    fn truncates_long_text() {
        let text = vec!["cat"; 200].join(" ");
        let ids = tokenizer().encode(&text).unwrap();
        assert_eq!(ids.len(), MAX_POSITION_EMBEDDINGS);
        assert_eq!(ids[MAX_POSITION_EMBEDDINGS - 2], 2);
        assert_eq!(ids[MAX_POSITION_EMBEDDINGS - 1], 3);
    }
}
