use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(
        "the frozen pretrained model {path} has no training script (train_attr/training_script); \
         multi-task initialization needs a model frozen with the training script embedded"
    )]
    MissingTrainingScript { path: String },

    #[error(
        "multi-task initialization only supports models trained in multi-task mode and frozen \
         into a united model; freeze the pretrained model with the united-model mode"
    )]
    NotMultiTaskModel,

    #[error("{types:?} type(s) not contained in the pretrained model; choose another suitable one")]
    UnsupportedTypeMap { types: Vec<String> },

    #[error("malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
