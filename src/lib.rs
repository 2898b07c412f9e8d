pub mod env;
pub mod search;
pub mod tools;
pub mod utils;
