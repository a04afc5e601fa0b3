pub mod reconciled_queries;
