pub mod convert;
pub mod db;
pub mod insights;
pub mod prompts;
pub mod queries;
pub mod tools;

pub use db::MongoDatabase;
pub use insights::InsightLedger;
pub use tools::MongoServer;
