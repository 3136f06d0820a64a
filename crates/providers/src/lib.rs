pub mod openai_compat;
pub mod traits;
pub(crate) mod util;

pub use openai_compat::OpenAiCompatGateway;
pub use traits::CompletionGateway;
pub use util::resolve_api_key;
