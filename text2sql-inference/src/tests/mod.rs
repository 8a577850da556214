use std::{path::PathBuf, time::Duration};

use crate::{
    apis::{ApiError, ApiTrait},
    model_thread::{ModelThreadDispatcher, ModelThreadError},
    models::{
        config::ModelConfig,
        types::{Text2SqlInput, Text2SqlOutput},
        ModelError, ModelId, ModelTrait,
    },
    prompt::linearize_schema,
};

struct MockApi;

impl ApiTrait for MockApi {
    fn create(_: Option<String>, _: Option<PathBuf>) -> Result<Self, ApiError> {
        Ok(Self)
    }

    fn get(&self, repo_id: &str, _: &str, filename: &str) -> Result<PathBuf, ApiError> {
        Ok(PathBuf::from(repo_id).join(filename))
    }
}

/// Answers every prompt with a fixed query, and fails on empty prompts.
struct TestModel {
    model_id: ModelId,
    delay: Duration,
}

impl ModelTrait for TestModel {
    type Input = Text2SqlInput;
    type Output = Text2SqlOutput;
    type LoadData = ModelId;

    fn fetch<A: ApiTrait>(api: &A, config: &ModelConfig) -> Result<Self::LoadData, ModelError> {
        if config.model_id == "missing/model" {
            return Err(ApiError::FileNotFound {
                repo_id: config.model_id.clone(),
                filename: "config.json".to_string(),
            }
            .into());
        }
        api.get(&config.model_id, &config.revision, "config.json")?;
        Ok(config.model_id.clone())
    }

    fn load(model_id: Self::LoadData) -> Result<Self, ModelError> {
        if model_id == "corrupted/model" {
            panic!("corrupted weights");
        }
        Ok(Self {
            model_id,
            delay: Duration::from_millis(10),
        })
    }

    fn model_id(&self) -> ModelId {
        self.model_id.clone()
    }

    fn run(&mut self, input: Self::Input) -> Result<Self::Output, ModelError> {
        std::thread::sleep(self.delay);
        if input.prompt.is_empty() {
            crate::bail!("empty prompt");
        }
        Ok(Text2SqlOutput {
            text: format!("SELECT count(*) FROM singer -- {}", input.prompt.len()),
            input_tokens: input.prompt.split_whitespace().count(),
            output_tokens: 6,
            time: self.delay.as_secs_f64(),
        })
    }
}

async fn start_test_model(
    model_id: &str,
) -> Result<
    (
        ModelThreadDispatcher<Text2SqlInput, Text2SqlOutput>,
        crate::model_thread::ModelThreadHandle,
    ),
    ModelThreadError,
> {
    let config = ModelConfig {
        model_id: model_id.to_string(),
        ..Default::default()
    };
    ModelThreadDispatcher::start::<TestModel, _>(MockApi, config).await
}

#[tokio::test]
async fn test_model_thread_runs_inference() {
    let (dispatcher, handle) = start_test_model("tscholak/cxmefzzi").await.unwrap();
    assert_eq!(dispatcher.model_id(), "tscholak/cxmefzzi");

    let prompt = linearize_schema(
        "How many singers do we have?",
        "concert_singer",
        &["singer"],
        &[vec!["singer_id", "name"]],
    )
    .unwrap();
    let prompt_len = prompt.len();
    let output = dispatcher
        .run_inference(Text2SqlInput::new(prompt))
        .await
        .unwrap();
    assert_eq!(
        output.text,
        format!("SELECT count(*) FROM singer -- {prompt_len}")
    );

    drop(dispatcher);
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_model_thread_load_error() {
    let result = start_test_model("missing/model").await;
    assert!(matches!(
        result,
        Err(ModelThreadError::LoadError(ModelError::ApiError(
            ApiError::FileNotFound { .. }
        )))
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn test_model_thread_load_error_on_current_thread_runtime() {
    let ticker = tokio::spawn(async {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    });
    let result = start_test_model("missing/model").await;
    assert!(matches!(result, Err(ModelThreadError::LoadError(_))));
    ticker.await.unwrap();
}

#[tokio::test]
async fn test_model_thread_panic_during_load() {
    let result = start_test_model("corrupted/model").await;
    assert!(matches!(result, Err(ModelThreadError::ResponseDropped(_))));
}

#[tokio::test]
async fn test_model_thread_survives_model_errors() {
    let (dispatcher, handle) = start_test_model("tscholak/cxmefzzi").await.unwrap();

    let result = dispatcher
        .run_inference(Text2SqlInput::new(String::new()))
        .await;
    assert!(matches!(
        result,
        Err(ModelThreadError::ModelError(ModelError::Msg(msg))) if msg == "empty prompt"
    ));

    let output = dispatcher
        .run_inference(Text2SqlInput::new("q | db".to_string()))
        .await
        .unwrap();
    assert_eq!(output.input_tokens, 3);

    drop(dispatcher);
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_model_thread_serves_concurrent_requests() {
    let (dispatcher, handle) = start_test_model("tscholak/cxmefzzi").await.unwrap();

    let tasks = (0..8)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .run_inference(Text2SqlInput::new("x".repeat(i + 1)))
                    .await
            })
        })
        .collect::<Vec<_>>();

    for (i, task) in tasks.into_iter().enumerate() {
        let output = task.await.unwrap().unwrap();
        assert_eq!(output.text, format!("SELECT count(*) FROM singer -- {}", i + 1));
    }

    drop(dispatcher);
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .unwrap();
}
