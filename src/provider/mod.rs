mod traits;
mod anthropic;
mod openai;

pub use traits::*;
pub use anthropic::{AnthropicProvider, ANTHROPIC_BASE_URL};
pub use openai::OpenAIProvider;
