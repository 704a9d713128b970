pub mod extract;
pub mod score;
pub mod status;
