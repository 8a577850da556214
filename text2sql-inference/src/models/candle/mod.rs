use std::{collections::BTreeSet, path::PathBuf};

use candle::{
    utils::{cuda_is_available, metal_is_available},
    Device,
};
use tracing::{debug, info};

use crate::{apis::ApiTrait, bail};

use super::{types::WeightFiles, ModelError};

pub mod t5;

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const SAFETENSORS_FILE: &str = "model.safetensors";
pub const SAFETENSORS_INDEX_FILE: &str = "model.safetensors.index.json";
pub const PTH_FILE: &str = "pytorch_model.bin";

pub fn device(device_id: usize) -> Result<Device, candle::Error> {
    if cuda_is_available() {
        info!("Using CUDA");
        Device::new_cuda(device_id)
    } else if metal_is_available() {
        info!("Using Metal");
        Device::new_metal(device_id)
    } else {
        info!("Using Cpu");
        Ok(Device::Cpu)
    }
}

/// Resolves the weight files of `repo_id`.
///
/// A configured GGUF file wins. Otherwise a single `model.safetensors` is
/// preferred, then a sharded safetensors index, then `pytorch_model.bin`.
pub fn fetch_weights<A: ApiTrait>(
    api: &A,
    repo_id: &str,
    revision: &str,
    quantized_weights_file: Option<&str>,
) -> Result<WeightFiles, ModelError> {
    if let Some(filename) = quantized_weights_file {
        return Ok(WeightFiles::Gguf(api.get(repo_id, revision, filename)?));
    }

    match api.get(repo_id, revision, SAFETENSORS_FILE) {
        Ok(path) => return Ok(WeightFiles::Safetensors(vec![path])),
        Err(e) => debug!("No {SAFETENSORS_FILE} in {repo_id}: {e}"),
    }
    match hub_load_safetensors(api, repo_id, revision, SAFETENSORS_INDEX_FILE) {
        Ok(paths) => return Ok(WeightFiles::Safetensors(paths)),
        Err(e) => debug!("No sharded safetensors in {repo_id}: {e}"),
    }

    Ok(WeightFiles::Pth(api.get(repo_id, revision, PTH_FILE)?))
}

/// Fetches every shard listed in the `weight_map` of a safetensors index file.
pub fn hub_load_safetensors<A: ApiTrait>(
    api: &A,
    repo_id: &str,
    revision: &str,
    json_file: &str,
) -> Result<Vec<PathBuf>, ModelError> {
    let json_file = api.get(repo_id, revision, json_file)?;
    let json: serde_json::Value = serde_json::from_reader(std::fs::File::open(&json_file)?)?;
    let weight_map = match json.get("weight_map") {
        None => bail!("no weight map in {json_file:?}"),
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => bail!("weight map in {json_file:?} is not a map"),
    };
    let safetensors_files = weight_map
        .values()
        .filter_map(|value| value.as_str())
        .collect::<BTreeSet<_>>();
    if safetensors_files.is_empty() {
        bail!("weight map in {json_file:?} is empty");
    }
    safetensors_files
        .into_iter()
        .map(|file| api.get(repo_id, revision, file).map_err(ModelError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::apis::ApiError;

    /// Serves files from a local directory, laid out as `<repo_id>/<filename>`.
    struct LocalApi {
        root: PathBuf,
    }

    impl ApiTrait for LocalApi {
        fn create(_: Option<String>, cache_dir: Option<PathBuf>) -> Result<Self, ApiError> {
            Ok(Self {
                root: cache_dir.unwrap_or_default(),
            })
        }

        fn get(&self, repo_id: &str, _: &str, filename: &str) -> Result<PathBuf, ApiError> {
            let path = self.root.join(repo_id).join(filename);
            if path.exists() {
                Ok(path)
            } else {
                Err(ApiError::FileNotFound {
                    repo_id: repo_id.to_string(),
                    filename: filename.to_string(),
                })
            }
        }
    }

    fn setup_repo(files: &[(&str, &str)]) -> (TempDir, LocalApi) {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("tscholak/cxmefzzi");
        std::fs::create_dir_all(&repo).unwrap();
        for (name, contents) in files {
            std::fs::write(repo.join(name), contents).unwrap();
        }
        let api = LocalApi::create(None, Some(dir.path().to_path_buf())).unwrap();
        (dir, api)
    }

    fn file_name(path: &Path) -> &str {
        path.file_name().unwrap().to_str().unwrap()
    }

    #[test]
    fn test_fetch_weights_prefers_single_safetensors() {
        let (_dir, api) = setup_repo(&[(SAFETENSORS_FILE, ""), (PTH_FILE, "")]);
        let weights = fetch_weights(&api, "tscholak/cxmefzzi", "main", None).unwrap();
        match weights {
            WeightFiles::Safetensors(paths) => {
                assert_eq!(paths.len(), 1);
                assert_eq!(file_name(&paths[0]), SAFETENSORS_FILE);
            }
            other => panic!("unexpected weights {other:?}"),
        }
    }

    #[test]
    fn test_fetch_weights_sharded_safetensors() {
        let index = r#"{
            "metadata": {"total_size": 0},
            "weight_map": {
                "encoder.block.0.layer.0.SelfAttention.q.weight": "model-00001-of-00002.safetensors",
                "encoder.block.0.layer.0.SelfAttention.k.weight": "model-00001-of-00002.safetensors",
                "decoder.block.0.layer.0.SelfAttention.q.weight": "model-00002-of-00002.safetensors"
            }
        }"#;
        let (_dir, api) = setup_repo(&[
            (SAFETENSORS_INDEX_FILE, index),
            ("model-00001-of-00002.safetensors", ""),
            ("model-00002-of-00002.safetensors", ""),
        ]);
        let weights = fetch_weights(&api, "tscholak/cxmefzzi", "main", None).unwrap();
        match weights {
            WeightFiles::Safetensors(paths) => {
                let names = paths.iter().map(|p| file_name(p)).collect::<Vec<_>>();
                assert_eq!(
                    names,
                    vec![
                        "model-00001-of-00002.safetensors",
                        "model-00002-of-00002.safetensors"
                    ]
                );
            }
            other => panic!("unexpected weights {other:?}"),
        }
    }

    #[test]
    fn test_fetch_weights_falls_back_to_pth() {
        let (_dir, api) = setup_repo(&[(PTH_FILE, "")]);
        let weights = fetch_weights(&api, "tscholak/cxmefzzi", "main", None).unwrap();
        assert!(matches!(weights, WeightFiles::Pth(path) if file_name(&path) == PTH_FILE));
    }

    #[test]
    fn test_fetch_weights_quantized() {
        let (_dir, api) = setup_repo(&[("t5-3b.q8_0.gguf", ""), (SAFETENSORS_FILE, "")]);
        let weights =
            fetch_weights(&api, "tscholak/cxmefzzi", "main", Some("t5-3b.q8_0.gguf")).unwrap();
        assert!(matches!(weights, WeightFiles::Gguf(path) if file_name(&path) == "t5-3b.q8_0.gguf"));
    }

    #[test]
    fn test_fetch_weights_missing_everything() {
        let (_dir, api) = setup_repo(&[]);
        let result = fetch_weights(&api, "tscholak/cxmefzzi", "main", None);
        assert!(matches!(
            result,
            Err(ModelError::ApiError(ApiError::FileNotFound { filename, .. })) if filename == PTH_FILE
        ));
    }

    #[test]
    fn test_hub_load_safetensors_rejects_missing_weight_map() {
        let (_dir, api) = setup_repo(&[(SAFETENSORS_INDEX_FILE, r#"{"metadata": {}}"#)]);
        let result = hub_load_safetensors(&api, "tscholak/cxmefzzi", "main", SAFETENSORS_INDEX_FILE);
        assert!(matches!(result, Err(ModelError::Msg(msg)) if msg.contains("no weight map")));
    }
}
