use std::path::PathBuf;

use hf_hub::{
    api::sync::{Api, ApiBuilder},
    Repo, RepoType,
};
use tracing::debug;

use super::{ApiError, ApiTrait};

impl ApiTrait for Api {
    fn create(api_key: Option<String>, cache_dir: Option<PathBuf>) -> Result<Self, ApiError>
    where
        Self: Sized,
    {
        let mut builder = ApiBuilder::new().with_progress(true).with_token(api_key);
        if let Some(cache_dir) = cache_dir {
            builder = builder.with_cache_dir(cache_dir);
        }
        Ok(builder.build()?)
    }

    fn get(&self, repo_id: &str, revision: &str, filename: &str) -> Result<PathBuf, ApiError> {
        debug!(
            target = "text2sql-inference",
            event = "hub_fetch",
            repo_id,
            revision,
            filename,
            "Fetching file from the Hugging Face Hub"
        );
        let repo = self.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        Ok(repo.get(filename)?)
    }
}
