//! Trade journal adapters.

mod csv_journal;
mod in_memory;

pub use csv_journal::CsvTradeJournal;
pub use in_memory::InMemoryTradeJournal;
