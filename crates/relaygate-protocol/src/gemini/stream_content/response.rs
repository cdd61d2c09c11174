use crate::gemini::generate_content::response::GenerateContentResponse;

pub type StreamGenerateContentResponse = GenerateContentResponse;
