pub mod anthropic;
pub mod error;
pub mod json;

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}
