pub mod db;
pub mod model;
pub mod ops;
pub mod output;
pub mod paths;
pub mod streak;
pub mod validate;
