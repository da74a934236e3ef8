pub mod anthropic;
pub mod google;
pub mod openai;
