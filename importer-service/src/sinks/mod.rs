pub mod postgres;

pub use postgres::PostgresDaySink;
