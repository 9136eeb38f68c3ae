pub mod form;
pub mod prompt;
pub mod types;
