use crate::claude::get_model::types::ModelInfo;

pub type GetModelResponse = ModelInfo;
