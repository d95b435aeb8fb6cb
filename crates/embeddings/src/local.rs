//! Local sentence embeddings: a BERT encoder run on the CPU.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML) with
//! attention-masked mean pooling and L2 normalization, the recipe
//! sentence-transformers models such as
//! `paraphrase-multilingual-MiniLM-L12-v2` are trained for.
//!
//! Model directory resolution:
//! 1. `MINDCHAT_EMBEDDING_MODEL_PATH` / `embedding.model_path` (applied by the config loader)
//! 2. `<config dir>/models/embedding/<model_dirname>`
//! 3. Download through the Hugging Face hub cache when `allow_download` is set,
//!    then copy the files into the directory from step 2 for offline reuse.

use crate::normalize::l2_normalize;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::api::sync::Api;
use mindchat_config::AppConfig;
use mindchat_core::{Embedder, EmbeddingError};
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PYTORCH_FILE: &str = "pytorch_model.bin";

/// Longest input, in tokens, fed to the encoder.
const MAX_SEQUENCE_TOKENS: usize = 256;

/// A BERT sentence encoder loaded from disk.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
}

/// Files that make up a model directory.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    /// Files in `dir`, if all are present.
    fn in_dir(dir: &Path) -> Option<Self> {
        let config = dir.join(CONFIG_FILE);
        let tokenizer = dir.join(TOKENIZER_FILE);
        let weights = [SAFETENSORS_FILE, PYTORCH_FILE]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())?;
        (config.exists() && tokenizer.exists()).then_some(Self {
            config,
            tokenizer,
            weights,
        })
    }

    /// Fetch from the Hugging Face hub (served from its cache when present).
    fn download(model_id: &str) -> Result<Self, EmbeddingError> {
        info!(model = model_id, "Downloading embedding model");
        let api = Api::new().map_err(|e| {
            EmbeddingError::Unavailable(format!("Failed to initialize HuggingFace Hub API: {e}"))
        })?;
        let repo = api.model(model_id.to_string());
        let fetch = |name: &str| {
            repo.get(name).map_err(|e| {
                EmbeddingError::Unavailable(format!(
                    "Failed to download '{name}' from '{model_id}': {e}"
                ))
            })
        };
        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: fetch(SAFETENSORS_FILE)?,
        })
    }

    /// Copy into `dir` so the next start works offline. Failures only warn.
    fn persist_to(&self, dir: &Path) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "Failed to cache embedding model");
            return;
        }
        for (src, name) in [
            (&self.config, CONFIG_FILE),
            (&self.tokenizer, TOKENIZER_FILE),
            (&self.weights, SAFETENSORS_FILE),
        ] {
            if let Err(e) = std::fs::copy(src, dir.join(name)) {
                warn!(file = name, error = %e, "Failed to cache embedding model file");
            }
        }
    }
}

impl BertEmbedder {
    /// Resolve, optionally download, and load the configured model.
    pub fn load(config: &AppConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.embedding_model_dir();
        let model_id = config.embedding.model_id.clone();

        let files = match ModelFiles::in_dir(&model_dir) {
            Some(files) => {
                info!(path = %model_dir.display(), "Loading embedding model from disk");
                files
            }
            None if config.embedding.allow_download => {
                let files = ModelFiles::download(&model_id)?;
                files.persist_to(&model_dir);
                files
            }
            None => {
                return Err(EmbeddingError::Unavailable(format!(
                    "no embedding model at {} and downloads are disabled",
                    model_dir.display()
                )));
            }
        };

        Self::load_files(&files, model_id, &Device::Cpu)
    }

    /// Load from an explicit directory holding config, tokenizer and weights.
    pub fn load_from_dir(dir: &Path, model_id: impl Into<String>) -> Result<Self, EmbeddingError> {
        let files = ModelFiles::in_dir(dir).ok_or_else(|| {
            EmbeddingError::Unavailable(format!("incomplete model directory {}", dir.display()))
        })?;
        Self::load_files(&files, model_id.into(), &Device::Cpu)
    }

    fn load_files(
        files: &ModelFiles,
        model_id: String,
        device: &Device,
    ) -> Result<Self, EmbeddingError> {
        let raw_config = std::fs::read_to_string(&files.config).map_err(|e| {
            EmbeddingError::Unavailable(format!("Failed to read model config: {e}"))
        })?;
        let bert_config: Config = serde_json::from_str(&raw_config).map_err(|e| {
            EmbeddingError::Unavailable(format!("Failed to parse model config: {e}"))
        })?;
        let dimension = serde_json::from_str::<serde_json::Value>(&raw_config)
            .ok()
            .and_then(|v| v.get("hidden_size").and_then(|h| h.as_u64()))
            .ok_or_else(|| {
                EmbeddingError::Unavailable("model config has no hidden_size".into())
            })? as usize;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            EmbeddingError::Unavailable(format!("Failed to load tokenizer: {e}"))
        })?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| {
                EmbeddingError::Unavailable(format!("Failed to configure tokenizer: {e}"))
            })?;

        let vb = if files.weights.extension().is_some_and(|ext| ext == "bin") {
            VarBuilder::from_pth(&files.weights, DTYPE, device).map_err(map_load_err)?
        } else {
            let bytes = std::fs::read(&files.weights).map_err(|e| {
                EmbeddingError::Unavailable(format!("Failed to read model weights: {e}"))
            })?;
            VarBuilder::from_buffered_safetensors(bytes, DTYPE, device).map_err(map_load_err)?
        };

        let model = BertModel::load(vb, &bert_config).map_err(map_load_err)?;

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            model_id,
            dimension,
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, candle_core::Error> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| candle_core::Error::Msg(format!("Tokenization failed: {e}")))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        // [1, seq, hidden]
        let hidden = self.model.forward(&input_ids, &type_ids, Some(&mask))?;

        // Mean over real tokens only.
        let mask = mask.to_dtype(DTYPE)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = summed.broadcast_div(&counts)?.squeeze(0)?;

        debug!(tokens = encoding.get_ids().len(), "Encoded text");
        pooled.to_vec1::<f32>()
    }
}

impl Embedder for BertEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = self
            .encode(text)
            .map_err(|e| EmbeddingError::Inference(format!("Candle inference error: {e}")))?;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

fn map_load_err(e: candle_core::Error) -> EmbeddingError {
    EmbeddingError::Unavailable(format!("Failed to load model weights: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_directory_is_not_a_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        assert!(ModelFiles::in_dir(dir.path()).is_none());

        let err = BertEmbedder::load_from_dir(dir.path(), "test").err().unwrap();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));
    }

    #[test]
    fn weights_prefer_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, TOKENIZER_FILE, SAFETENSORS_FILE, PYTORCH_FILE] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let files = ModelFiles::in_dir(dir.path()).unwrap();
        assert!(files.weights.ends_with(SAFETENSORS_FILE));
    }

    #[test]
    fn missing_model_without_download_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.embedding.model_path = Some(dir.path().join("absent").display().to_string());
        config.embedding.allow_download = false;

        let err = BertEmbedder::load(&config).err().unwrap();
        assert!(err.to_string().contains("downloads are disabled"));
    }
}
