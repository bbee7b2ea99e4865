pub mod archiver;
pub mod collector;
pub mod columns;
pub mod filename;
pub mod slots;
pub mod writer;

pub use archiver::Archiver;
pub use collector::StaleSeriesCollector;
pub use writer::ExportPaths;
