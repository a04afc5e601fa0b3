pub mod alphaess_api;
pub mod export_file;
pub mod power_csv_file;

pub use alphaess_api::{AlphaEssApiSource, AlphaEssClient};
pub use export_file::ExportFileSource;
pub use power_csv_file::PowerCsvFileSource;
