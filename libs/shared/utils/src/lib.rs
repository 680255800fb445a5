pub mod extractor;
pub mod token;
