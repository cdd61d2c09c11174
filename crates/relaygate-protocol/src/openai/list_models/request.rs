#[derive(Debug, Clone, Copy)]
pub struct ListModelsRequest;
