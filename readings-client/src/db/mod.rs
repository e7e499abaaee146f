pub mod reading_queries;
pub mod schema;
