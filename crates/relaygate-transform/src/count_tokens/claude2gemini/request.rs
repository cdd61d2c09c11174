use relaygate_protocol::claude::count_tokens::request::CountTokensRequest as ClaudeCountTokensRequest;
use relaygate_protocol::claude::create_message::request::{
    CreateMessageRequest as ClaudeCreateMessageRequest,
    CreateMessageRequestBody as ClaudeCreateMessageRequestBody,
};
use relaygate_protocol::gemini::count_tokens::request::{
    CountTokensPath as GeminiCountTokensPath, CountTokensRequest as GeminiCountTokensRequest,
    CountTokensRequestBody as GeminiCountTokensRequestBody,
};

use crate::generate_content::claude2gemini::request::transform_request as transform_generate_content_request;

/// Convert a Claude count-tokens request into a Gemini count-tokens request by routing
/// through the create-message -> generate-content transform and embedding the result.
pub fn transform_request(request: ClaudeCountTokensRequest) -> GeminiCountTokensRequest {
    let synthetic = ClaudeCreateMessageRequest {
        headers: request.headers,
        body: ClaudeCreateMessageRequestBody {
            // Irrelevant to token counting; generateContentRequest.generationConfig is not
            // consulted when Gemini only needs to count input tokens.
            max_tokens: 1,
            messages: request.body.messages,
            model: request.body.model,
            container: None,
            context_management: request.body.context_management,
            mcp_servers: request.body.mcp_servers,
            metadata: None,
            output_config: request.body.output_config,
            output_format: request.body.output_format,
            service_tier: None,
            stop_sequences: None,
            stream: None,
            system: request.body.system,
            temperature: None,
            thinking: request.body.thinking,
            tool_choice: request.body.tool_choice,
            tools: request.body.tools,
            top_k: None,
            top_p: None,
        },
    };

    let generate_content_request = transform_generate_content_request(synthetic);
    let model = generate_content_request.path.model.clone();
    let generate_content_request_json = serde_json::to_value(&generate_content_request.body)
        .expect("generate-content request body always serializes");

    GeminiCountTokensRequest {
        path: GeminiCountTokensPath { model },
        body: GeminiCountTokensRequestBody {
            contents: None,
            generate_content_request: Some(generate_content_request_json),
        },
    }
}
