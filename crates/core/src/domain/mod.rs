pub mod article;
pub mod company;
pub mod score;
