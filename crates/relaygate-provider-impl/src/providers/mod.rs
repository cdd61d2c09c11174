pub mod aistudio;
pub mod antigravity;
pub mod claude;
pub mod claudecode;
pub mod codex;
pub mod custom;
pub mod deepseek;
pub mod geminicli;
mod http_client;
pub mod nvidia;
mod oauth_common;
pub mod openai;
pub mod vertex;
pub mod vertexexpress;
